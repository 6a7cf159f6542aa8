// ── Subscriber registry ──
//
// Maps a message type to an ordered list of handlers. Each registration
// gets its own id so removal never depends on closure identity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::Value;

use crate::frame::EventFrame;

/// Callback invoked with a frame's payload.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// What part of a frame a handler is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// `data` when present, otherwise the whole frame.
    Payload,
    /// Always the whole frame.
    Frame,
}

struct Entry {
    id: u64,
    delivery: Delivery,
    handler: Handler,
}

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<String, Vec<Entry>>>,
}

impl HandlerRegistry {
    pub(crate) fn insert(self: &Arc<Self>, kind: &str, handler: Handler) -> Subscription {
        self.insert_with(kind, Delivery::Payload, handler)
    }

    pub(crate) fn insert_with(
        self: &Arc<Self>,
        kind: &str,
        delivery: Delivery,
        handler: Handler,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .write()
            .entry(kind.to_owned())
            .or_default()
            .push(Entry {
                id,
                delivery,
                handler,
            });

        Subscription {
            id,
            kind: kind.to_owned(),
            registry: Arc::downgrade(self),
        }
    }

    fn remove(&self, kind: &str, id: u64) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|entry| entry.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(kind);
        }
        removed
    }

    /// Invoke every handler registered for the frame's type, in
    /// registration order. Returns the number of handlers called.
    pub(crate) fn dispatch(&self, frame: &EventFrame) -> usize {
        // Snapshot so handlers may (un)subscribe without deadlocking.
        let targets: Vec<(Delivery, Handler)> = match self.handlers.read().get(&frame.kind) {
            Some(list) => list
                .iter()
                .map(|entry| (entry.delivery, Arc::clone(&entry.handler)))
                .collect(),
            None => return 0,
        };

        for (delivery, handler) in &targets {
            match delivery {
                Delivery::Payload => handler(frame.payload()),
                Delivery::Frame => handler(frame.raw()),
            }
        }
        targets.len()
    }

    pub(crate) fn count(&self, kind: &str) -> usize {
        self.handlers.read().get(kind).map_or(0, Vec::len)
    }
}

/// Handle for one registered handler.
///
/// Dropping it does not unsubscribe; call [`unsubscribe`](Self::unsubscribe).
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    kind: String,
    registry: Weak<HandlerRegistry>,
}

impl Subscription {
    /// Remove exactly this handler. Repeated calls are no-ops.
    pub fn unsubscribe(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.remove(&self.kind, self.id))
    }

    /// Message type this handler is registered for.
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        f.debug_map()
            .entries(handlers.iter().map(|(k, v)| (k, v.len())))
            .finish()
    }
}
