// ── Entity sync stores ──
//
// One store per mirrored controller collection. Each store owns its
// mirror, registers push handlers on the shared channel, and sends its
// mutations as commands. Handlers hold only weak references to their
// store, so detaching never leaks.

mod collection;
mod devices;
mod rules;
mod sensors;
mod settings;
mod system;

pub use collection::Keyed;
pub use devices::DeviceStore;
pub use rules::RuleStore;
pub use sensors::SensorStore;
pub use settings::SettingsStore;
pub use system::SystemStore;

use std::sync::{Arc, Weak};

use espgrow_api::{Channel, Subscription};
use serde_json::Value;

use crate::command::Command;
use crate::error::CoreError;
use crate::model::{AutomationRule, Device, Sensor};

impl Keyed for Device {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Sensor {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for AutomationRule {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Encode and send (or queue) one command.
pub(crate) fn send_command(channel: &Channel, command: &Command) -> Result<(), CoreError> {
    let data = command.data()?;
    channel.send(command.kind(), data.as_ref())?;
    tracing::debug!(kind = command.kind(), "command sent");
    Ok(())
}

/// Register `handler` for `kind`, holding the store weakly.
pub(crate) fn subscribe_weak<S, F>(
    channel: &Channel,
    store: &Arc<S>,
    kind: &str,
    handler: F,
) -> Subscription
where
    S: Send + Sync + 'static,
    F: Fn(&S, &Value) + Send + Sync + 'static,
{
    let weak: Weak<S> = Arc::downgrade(store);
    channel.subscribe(kind, move |payload| {
        if let Some(store) = weak.upgrade() {
            handler(&store, payload);
        }
    })
}

/// [`subscribe_weak`] for handlers that need the whole frame.
pub(crate) fn subscribe_frame_weak<S, F>(
    channel: &Channel,
    store: &Arc<S>,
    kind: &str,
    handler: F,
) -> Subscription
where
    S: Send + Sync + 'static,
    F: Fn(&S, &Value) + Send + Sync + 'static,
{
    let weak: Weak<S> = Arc::downgrade(store);
    channel.subscribe_frame(kind, move |frame| {
        if let Some(store) = weak.upgrade() {
            handler(&store, frame);
        }
    })
}

/// A channel that is never connected: every send lands in its queue.
#[cfg(test)]
pub(crate) fn offline_channel() -> Channel {
    use espgrow_api::{ChannelConfig, Connector, Error, Transport};
    use futures_util::future::{self, BoxFuture};

    struct Offline;

    impl Connector for Offline {
        fn connect<'a>(&'a self, _url: &'a url::Url) -> BoxFuture<'a, Result<Transport, Error>> {
            Box::pin(future::pending())
        }
    }

    Channel::new(Offline, ChannelConfig::default())
}
