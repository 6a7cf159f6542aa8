// ── Settings store ──

use std::sync::Arc;

use espgrow_api::{Channel, Subscription};
use serde_json::Value;
use tokio::sync::watch;

use super::{send_command, subscribe_weak};
use crate::command::Command;
use crate::error::CoreError;
use crate::model::{self, ControllerSettings};

/// Largest timezone offset the controller accepts, in minutes.
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<SettingsStoreInner>,
}

struct SettingsStoreInner {
    channel: Channel,
    settings: watch::Sender<Option<ControllerSettings>>,
}

impl SettingsStore {
    pub fn new(channel: Channel) -> Self {
        let (settings, _) = watch::channel(None);
        Self {
            inner: Arc::new(SettingsStoreInner { channel, settings }),
        }
    }

    pub fn attach(&self) -> Vec<Subscription> {
        vec![subscribe_weak(
            &self.inner.channel,
            &self.inner,
            "settings",
            SettingsStoreInner::on_settings,
        )]
    }

    pub fn settings(&self) -> Option<ControllerSettings> {
        *self.inner.settings.borrow()
    }

    pub fn watch_settings(&self) -> watch::Receiver<Option<ControllerSettings>> {
        self.inner.settings.subscribe()
    }

    pub async fn wait_synced(&self) {
        let mut rx = self.inner.settings.subscribe();
        let _ = rx.wait_for(Option::is_some).await;
    }

    pub fn request(&self) -> Result<(), CoreError> {
        send_command(&self.inner.channel, &Command::GetSettings)
    }

    /// Set the controller's clock offset, minutes east of UTC.
    pub fn set_timezone(&self, offset_minutes: i32) -> Result<(), CoreError> {
        if !(-MAX_OFFSET_MINUTES..=MAX_OFFSET_MINUTES).contains(&offset_minutes) {
            return Err(CoreError::ValidationFailed {
                message: format!("timezone offset {offset_minutes} min is outside ±14h"),
            });
        }
        send_command(&self.inner.channel, &Command::SetTimezone { offset_minutes })
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("settings", &*self.inner.settings.borrow())
            .finish_non_exhaustive()
    }
}

impl SettingsStoreInner {
    fn on_settings(&self, payload: &Value) {
        if let Some(settings) = model::decode_payload::<ControllerSettings>(payload, "settings") {
            tracing::debug!(offset_minutes = settings.timezone_offset_minutes, "settings updated");
            self.settings.send_replace(Some(settings));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::offline_channel;
    use serde_json::json;

    #[test]
    fn settings_push_and_timezone_validation() {
        let channel = offline_channel();
        let store = SettingsStore::new(channel.clone());
        assert!(store.settings().is_none());

        store
            .inner
            .on_settings(&json!({ "type": "settings", "timezoneOffsetMinutes": -300 }));
        assert_eq!(store.settings().unwrap().timezone_offset_minutes, -300);

        assert!(store.set_timezone(15 * 60).is_err());
        assert_eq!(channel.queued_len(), 0);
        store.set_timezone(330).unwrap();
        assert_eq!(channel.queued_len(), 1);
    }

    #[test]
    fn extreme_offsets_are_rejected_without_queueing() {
        let channel = offline_channel();
        let store = SettingsStore::new(channel.clone());
        for offset in [i32::MIN, i32::MAX, -841, 841] {
            assert!(store.set_timezone(offset).is_err(), "{offset}");
        }
        assert_eq!(channel.queued_len(), 0);
        store.set_timezone(-MAX_OFFSET_MINUTES).unwrap();
        store.set_timezone(MAX_OFFSET_MINUTES).unwrap();
        assert_eq!(channel.queued_len(), 2);
    }
}
