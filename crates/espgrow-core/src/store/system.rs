// ── System store ──
//
// Controller health (`system_info`), firmware update progress
// (`ota_status`) and link latency measured with `ping`/`pong`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use espgrow_api::{Channel, Subscription};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;

use super::{send_command, subscribe_weak};
use crate::command::Command;
use crate::error::CoreError;
use crate::model::{self, OtaState, OtaStatus, SystemInfo};

#[derive(Clone)]
pub struct SystemStore {
    inner: Arc<SystemStoreInner>,
}

struct SystemStoreInner {
    channel: Channel,
    info: watch::Sender<Option<SystemInfo>>,
    ota: watch::Sender<Option<OtaStatus>>,
    ping_sent: Mutex<Option<Instant>>,
    rtt: watch::Sender<Option<Duration>>,
    /// Controller clock from the most recent `pong`.
    last_pong: Mutex<Option<DateTime<Utc>>>,
}

impl SystemStore {
    pub fn new(channel: Channel) -> Self {
        let (info, _) = watch::channel(None);
        let (ota, _) = watch::channel(None);
        let (rtt, _) = watch::channel(None);

        Self {
            inner: Arc::new(SystemStoreInner {
                channel,
                info,
                ota,
                ping_sent: Mutex::new(None),
                rtt,
                last_pong: Mutex::new(None),
            }),
        }
    }

    pub fn attach(&self) -> Vec<Subscription> {
        let channel = &self.inner.channel;
        vec![
            subscribe_weak(channel, &self.inner, "system_info", SystemStoreInner::on_info),
            subscribe_weak(channel, &self.inner, "ota_status", SystemStoreInner::on_ota),
            subscribe_weak(channel, &self.inner, "pong", SystemStoreInner::on_pong),
        ]
    }

    pub fn info(&self) -> Option<SystemInfo> {
        self.inner.info.borrow().clone()
    }

    pub fn watch_info(&self) -> watch::Receiver<Option<SystemInfo>> {
        self.inner.info.subscribe()
    }

    pub async fn wait_synced(&self) {
        let mut rx = self.inner.info.subscribe();
        let _ = rx.wait_for(Option::is_some).await;
    }

    pub fn request_info(&self) -> Result<(), CoreError> {
        send_command(&self.inner.channel, &Command::GetSystemInfo)
    }

    pub fn ota_status(&self) -> Option<OtaStatus> {
        self.inner.ota.borrow().clone()
    }

    pub fn watch_ota_status(&self) -> watch::Receiver<Option<OtaStatus>> {
        self.inner.ota.subscribe()
    }

    /// Send a `ping`. The round trip is measured from this call.
    pub fn ping(&self) -> Result<(), CoreError> {
        *self.inner.ping_sent.lock() = Some(Instant::now());
        send_command(&self.inner.channel, &Command::Ping)
    }

    /// Most recent ping round trip.
    pub fn latency(&self) -> Option<Duration> {
        *self.inner.rtt.borrow()
    }

    pub fn watch_latency(&self) -> watch::Receiver<Option<Duration>> {
        self.inner.rtt.subscribe()
    }

    /// Controller clock reported by the last `pong`.
    pub fn controller_time(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_pong.lock()
    }
}

impl std::fmt::Debug for SystemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemStore")
            .field("info", &self.inner.info.borrow().is_some())
            .field("latency", &*self.inner.rtt.borrow())
            .finish_non_exhaustive()
    }
}

impl SystemStoreInner {
    fn on_info(&self, payload: &Value) {
        if let Some(info) = model::decode_payload::<SystemInfo>(payload, "system_info") {
            tracing::debug!(uptime = info.uptime, free_heap = info.free_heap, "system info updated");
            self.info.send_replace(Some(info));
        }
    }

    fn on_ota(&self, payload: &Value) {
        let Some(status) = model::decode_payload::<OtaStatus>(payload, "ota_status") else {
            return;
        };
        match status.status {
            OtaState::Error => {
                tracing::warn!(error = ?status.error, "firmware update failed");
            }
            state => tracing::info!(%state, progress = ?status.progress, "firmware update"),
        }
        self.ota.send_replace(Some(status));
    }

    fn on_pong(&self, payload: &Value) {
        if let Some(sent) = self.ping_sent.lock().take() {
            let rtt = sent.elapsed();
            tracing::trace!(rtt_ms = rtt.as_millis(), "pong");
            self.rtt.send_replace(Some(rtt));
        }

        // Seconds on the device; millisecond values are accepted too.
        let stamp = payload.get("timestamp").and_then(Value::as_i64).and_then(|ts| {
            if ts > 100_000_000_000 {
                DateTime::from_timestamp_millis(ts)
            } else {
                DateTime::from_timestamp(ts, 0)
            }
        });
        if stamp.is_some() {
            *self.last_pong.lock() = stamp;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::offline_channel;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn pong_measures_round_trip() {
        let store = SystemStore::new(offline_channel());
        store.ping().unwrap();
        tokio::time::sleep(Duration::from_millis(42)).await;
        store.inner.on_pong(&json!({ "type": "pong", "timestamp": 1_700_000_000 }));

        assert_eq!(store.latency(), Some(Duration::from_millis(42)));
        assert_eq!(store.controller_time().unwrap().timestamp(), 1_700_000_000);

        // Unsolicited pong leaves the measurement alone.
        store.inner.on_pong(&json!({ "type": "pong" }));
        assert_eq!(store.latency(), Some(Duration::from_millis(42)));
    }

    #[test]
    fn system_info_and_ota_status() {
        let store = SystemStore::new(offline_channel());
        store.inner.on_info(&json!({
            "type": "system_info",
            "uptime": 3600, "freeHeap": 182_000, "chipModel": "ESP32-S3",
            "wifiRssi": -61, "ipAddress": "192.168.1.40", "firmwareVersion": "1.4.2"
        }));
        let info = store.info().unwrap();
        assert_eq!(info.chip_model, "ESP32-S3");
        assert_eq!(info.wifi_rssi, -61);

        store.inner.on_ota(&json!({ "type": "ota_status", "status": "downloading", "progress": 40 }));
        assert_eq!(store.ota_status().unwrap().progress, Some(40));
        store.inner.on_ota(&json!({ "type": "ota_status", "status": "error", "error": "checksum" }));
        let ota = store.ota_status().unwrap();
        assert_eq!(ota.status, OtaState::Error);
        assert_eq!(ota.error.as_deref(), Some("checksum"));
    }
}
