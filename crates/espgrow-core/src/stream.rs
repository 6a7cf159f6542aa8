// ── Collection subscriptions ──
//
// What the stores hand out to front ends: the mirrored collection as an
// immutable snapshot plus a way to wait for the next controller push.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::store::Keyed;

/// One published state of a mirrored collection, in controller order.
pub type Snapshot<T> = Arc<Vec<Arc<T>>>;

/// Live view of one mirrored collection.
///
/// Cheap to hold; every push republishes a whole new snapshot, so a view
/// never observes a half-applied update.
pub struct EntityStream<T: Keyed + Clone + Send + Sync + 'static> {
    seen: Snapshot<T>,
    rx: watch::Receiver<Snapshot<T>>,
}

impl<T: Keyed + Clone + Send + Sync + 'static> EntityStream<T> {
    pub(crate) fn new(rx: watch::Receiver<Snapshot<T>>) -> Self {
        let seen = rx.borrow().clone();
        Self { seen, rx }
    }

    /// Snapshot as of subscription or the last [`changed`](Self::changed).
    pub fn current(&self) -> &Snapshot<T> {
        &self.seen
    }

    /// Newest published snapshot, without marking it seen.
    pub fn latest(&self) -> Snapshot<T> {
        self.rx.borrow().clone()
    }

    /// Look up an entity by id in the newest snapshot.
    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.rx.borrow().iter().find(|e| e.key() == id).cloned()
    }

    /// Wait for the next push. `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Snapshot<T>> {
        self.rx.changed().await.ok()?;
        self.seen = self.rx.borrow_and_update().clone();
        Some(self.seen.clone())
    }

    /// Resolve with the first snapshot, current or future, that satisfies
    /// `pred`. `None` once the store is gone.
    pub async fn wait_until(&mut self, pred: impl Fn(&[Arc<T>]) -> bool) -> Option<Snapshot<T>> {
        let latest = self.latest();
        if pred(&latest) {
            self.seen = latest.clone();
            return Some(latest);
        }
        loop {
            let snap = self.changed().await?;
            if pred(&snap) {
                return Some(snap);
            }
        }
    }

    /// Consume into a `Stream` that yields the newest snapshot first.
    pub fn into_stream(self) -> SnapshotStream<T> {
        SnapshotStream {
            inner: WatchStream::new(self.rx),
        }
    }
}

/// [`EntityStream`] as a `futures` `Stream`.
pub struct SnapshotStream<T: Keyed + Clone + Send + Sync + 'static> {
    inner: WatchStream<Snapshot<T>>,
}

impl<T: Keyed + Clone + Send + Sync + 'static> Stream for SnapshotStream<T> {
    type Item = Snapshot<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
