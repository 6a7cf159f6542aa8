// ── Device store ──
//
// Mirrors the controller's device list and runs the optimistic control
// state machine. A toggle never flips `is_on` locally: the device is
// marked pending until a `device_status` confirms or rejects it, or the
// safety timeout clears it. Confirmation and timeout may race in either
// order; both only ever remove the pending mark.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use espgrow_api::{Channel, Subscription};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::collection::EntityCollection;
use super::{send_command, subscribe_weak};
use crate::command::Command;
use crate::command::requests::{DeviceUpdate, NewDevice};
use crate::error::CoreError;
use crate::model::{self, Device};
use crate::stream::EntityStream;

/// Mirror of the controller's devices plus pending/override bookkeeping.
///
/// Cheaply cloneable; clones share one mirror.
#[derive(Clone)]
pub struct DeviceStore {
    inner: Arc<DeviceStoreInner>,
}

struct DeviceStoreInner {
    channel: Channel,
    devices: EntityCollection<Device>,
    /// Devices with an unconfirmed toggle in flight.
    pending: watch::Sender<BTreeSet<String>>,
    /// Safety timers, one per pending device, tagged with a generation
    /// so a stale timer can never clear a newer toggle.
    timers: Mutex<HashMap<String, PendingTimer>>,
    next_generation: AtomicU64,
    toggle_timeout: Duration,
    /// Manual override expiry per device.
    overrides: DashMap<String, Instant>,
    last_error: watch::Sender<Option<String>>,
}

struct PendingTimer {
    generation: u64,
    handle: AbortHandle,
}

/// `device_status` push.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceStatus {
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    on: Option<bool>,
    #[serde(default = "confirmed")]
    success: bool,
    #[serde(default)]
    override_active: Option<bool>,
    #[serde(default)]
    override_remaining_ms: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

fn confirmed() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverrideCleared {
    device_id: String,
}

impl DeviceStore {
    pub fn new(channel: Channel, toggle_timeout: Duration) -> Self {
        let (pending, _) = watch::channel(BTreeSet::new());
        let (last_error, _) = watch::channel(None);

        Self {
            inner: Arc::new(DeviceStoreInner {
                channel,
                devices: EntityCollection::new(),
                pending,
                timers: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                toggle_timeout,
                overrides: DashMap::new(),
                last_error,
            }),
        }
    }

    /// Register push handlers. The returned subscriptions detach the store.
    pub fn attach(&self) -> Vec<Subscription> {
        let channel = &self.inner.channel;
        vec![
            subscribe_weak(channel, &self.inner, "devices", DeviceStoreInner::on_devices),
            subscribe_weak(channel, &self.inner, "device_status", DeviceStoreInner::on_status),
            subscribe_weak(
                channel,
                &self.inner,
                "override_cleared",
                DeviceStoreInner::on_override_cleared,
            ),
        ]
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.inner.devices.snapshot()
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<Device>> {
        self.inner.devices.get(device_id)
    }

    pub fn subscribe(&self) -> EntityStream<Device> {
        EntityStream::new(self.inner.devices.subscribe())
    }

    /// `true` once at least one `devices` push has been applied.
    pub fn is_synced(&self) -> bool {
        self.inner.devices.version() > 0
    }

    /// Resolve once the first `devices` push has been applied.
    pub async fn wait_synced(&self) {
        let mut rx = self.inner.devices.subscribe_version();
        let _ = rx.wait_for(|v| *v > 0).await;
    }

    pub fn is_pending(&self, device_id: &str) -> bool {
        self.inner.pending.borrow().contains(device_id)
    }

    pub fn pending(&self) -> BTreeSet<String> {
        self.inner.pending.borrow().clone()
    }

    pub fn watch_pending(&self) -> watch::Receiver<BTreeSet<String>> {
        self.inner.pending.subscribe()
    }

    /// Absolute expiry of an active manual override.
    pub fn override_expiry(&self, device_id: &str) -> Option<Instant> {
        let expiry = *self.inner.overrides.get(device_id)?;
        if expiry <= Instant::now() {
            self.inner.overrides.remove(device_id);
            return None;
        }
        Some(expiry)
    }

    /// Time left on an active manual override.
    pub fn override_remaining(&self, device_id: &str) -> Option<Duration> {
        self.override_expiry(device_id)
            .map(|expiry| expiry.saturating_duration_since(Instant::now()))
    }

    /// Most recent rejected toggle, if any.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.borrow().clone()
    }

    // ── Control ──────────────────────────────────────────────────────

    /// Request the opposite of the device's confirmed state.
    ///
    /// Returns `Ok(false)` without sending anything when the device is
    /// unknown, has no address, or already has a toggle in flight. Must
    /// be called from within a Tokio runtime (it arms a timer).
    pub fn toggle(&self, device_id: &str) -> Result<bool, CoreError> {
        let inner = &self.inner;

        let Some(device) = inner.devices.get(device_id) else {
            tracing::debug!(device_id, "toggle ignored, unknown device");
            return Ok(false);
        };
        let Some(target) = device.target() else {
            tracing::debug!(device_id, "toggle ignored, device has no address");
            return Ok(false);
        };

        if !inner.pending.send_if_modified(|set| set.insert(device_id.to_owned())) {
            tracing::debug!(device_id, "toggle ignored, one already pending");
            return Ok(false);
        }

        inner.arm_timer(device_id);

        let command = Command::DeviceControl {
            method: device.control_method,
            target,
            on: !device.is_on,
        };
        if let Err(e) = send_command(&inner.channel, &command) {
            inner.clear_pending(device_id);
            return Err(e);
        }

        tracing::info!(device_id, on = !device.is_on, "toggle requested");
        Ok(true)
    }

    // ── Mutations (confirmed by the next `devices` push) ─────────────

    pub fn request(&self) -> Result<(), CoreError> {
        send_command(&self.inner.channel, &Command::GetDevices)
    }

    pub fn add(&self, device: NewDevice) -> Result<(), CoreError> {
        validate_new_device(&device)?;
        send_command(&self.inner.channel, &Command::AddDevice(device))
    }

    pub fn update(&self, device_id: &str, update: DeviceUpdate) -> Result<(), CoreError> {
        send_command(
            &self.inner.channel,
            &Command::UpdateDevice {
                id: device_id.to_owned(),
                update,
            },
        )
    }

    pub fn remove(&self, device_id: &str) -> Result<(), CoreError> {
        send_command(
            &self.inner.channel,
            &Command::RemoveDevice {
                id: device_id.to_owned(),
            },
        )
    }
}

impl std::fmt::Debug for DeviceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceStore")
            .field("devices", &self.inner.devices.len())
            .field("pending", &*self.inner.pending.borrow())
            .field("overrides", &self.inner.overrides.len())
            .finish_non_exhaustive()
    }
}

fn validate_new_device(device: &NewDevice) -> Result<(), CoreError> {
    if device.id.trim().is_empty() || device.name.trim().is_empty() {
        return Err(CoreError::ValidationFailed {
            message: "device id and name must not be empty".into(),
        });
    }
    let has_ip = device.ip_address.as_deref().is_some_and(|ip| !ip.trim().is_empty());
    if device.control_method.is_networked() && !has_ip {
        return Err(CoreError::ValidationFailed {
            message: format!("{} devices need an IP address", device.control_method),
        });
    }
    if !device.control_method.is_networked() && !has_ip && device.gpio_pin.is_none() {
        return Err(CoreError::ValidationFailed {
            message: "relay devices need a GPIO pin".into(),
        });
    }
    Ok(())
}

impl DeviceStoreInner {
    fn on_devices(&self, payload: &Value) {
        let Some(devices) = model::decode_collection::<Device>(payload, "devices") else {
            return;
        };

        let present: HashSet<&str> = devices.iter().map(|d| d.id.as_str()).collect();
        let gone: Vec<String> = self
            .pending
            .borrow()
            .iter()
            .filter(|id| !present.contains(id.as_str()))
            .cloned()
            .collect();
        for id in &gone {
            self.clear_pending(id);
        }
        self.overrides.retain(|id, _| present.contains(id.as_str()));

        tracing::debug!(count = devices.len(), "devices replaced");
        self.devices.replace_all(devices);
    }

    fn on_status(&self, payload: &Value) {
        let Some(status) = model::decode_payload::<DeviceStatus>(payload, "device_status") else {
            return;
        };

        let resolved = status
            .device_id
            .as_deref()
            .and_then(|id| self.devices.get(id))
            .or_else(|| {
                let target = status.target.as_deref()?;
                self.devices.find(|d| d.target().as_deref() == Some(target))
            });

        let Some(device_id) = resolved.map(|d| d.id.clone()).or(status.device_id) else {
            tracing::debug!(device_target = ?status.target, "device_status for unknown device");
            return;
        };

        self.clear_pending(&device_id);

        if status.success {
            if let Some(on) = status.on {
                self.devices.modify(&device_id, |d| d.is_on = on);
            }
            self.last_error.send_replace(None);
        } else {
            let reason = status.error.unwrap_or_else(|| "rejected".into());
            tracing::warn!(device_id = %device_id, reason = %reason, "controller rejected device control");
            self.last_error
                .send_replace(Some(format!("{device_id}: {reason}")));
        }

        match (status.override_active, status.override_remaining_ms) {
            (Some(true), Some(ms)) if ms > 0 => {
                let expiry = Instant::now() + Duration::from_millis(ms);
                tracing::debug!(device_id = %device_id, remaining_ms = ms, "manual override active");
                self.overrides.insert(device_id, expiry);
            }
            (Some(false), _) => {
                self.overrides.remove(&device_id);
            }
            _ => {}
        }
    }

    fn on_override_cleared(&self, payload: &Value) {
        if let Some(cleared) = model::decode_payload::<OverrideCleared>(payload, "override_cleared")
        {
            tracing::debug!(device_id = %cleared.device_id, "manual override cleared");
            self.overrides.remove(&cleared.device_id);
        }
    }

    fn arm_timer(self: &Arc<Self>, device_id: &str) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let weak = Arc::downgrade(self);
        let id = device_id.to_owned();
        let timeout = self.toggle_timeout;

        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire_pending(&id, generation);
            }
        });

        let timer = PendingTimer {
            generation,
            handle: task.abort_handle(),
        };
        if let Some(previous) = self.timers.lock().insert(device_id.to_owned(), timer) {
            previous.handle.abort();
        }
    }

    fn expire_pending(&self, device_id: &str, generation: u64) {
        {
            let mut timers = self.timers.lock();
            if !timers.get(device_id).is_some_and(|t| t.generation == generation) {
                return;
            }
            timers.remove(device_id);
        }

        if self.pending.send_if_modified(|set| set.remove(device_id)) {
            tracing::warn!(device_id, "no confirmation for toggle, clearing pending state");
        }
    }

    /// End the pending window for `device_id`. Idempotent.
    fn clear_pending(&self, device_id: &str) -> bool {
        if let Some(timer) = self.timers.lock().remove(device_id) {
            timer.handle.abort();
        }
        self.pending.send_if_modified(|set| set.remove(device_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::ControlMethod;
    use crate::store::offline_channel;
    use serde_json::json;

    fn store() -> DeviceStore {
        let store = DeviceStore::new(offline_channel(), Duration::from_secs(5));
        store.inner.on_devices(&json!([
            { "id": "fan_exhaust", "name": "Exhaust Fan", "type": "fan",
              "controlMethod": "shelly_gen2", "ipAddress": "192.168.1.100", "isOn": true },
            { "id": "pump", "name": "Pump", "type": "pump", "controlMethod": "relay", "gpioPin": 17 },
            { "id": "orphan", "name": "No Address", "type": "light", "controlMethod": "relay" }
        ]));
        store
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_marks_pending_without_touching_state() {
        let store = store();
        assert!(store.toggle("fan_exhaust").unwrap());

        assert!(store.is_pending("fan_exhaust"));
        assert!(store.get("fan_exhaust").unwrap().is_on);
        assert_eq!(store.inner.channel.queued_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_toggle_while_pending_is_ignored() {
        let store = store();
        assert!(store.toggle("pump").unwrap());
        assert!(!store.toggle("pump").unwrap());
        assert_eq!(store.inner.channel.queued_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_or_unaddressed_devices_are_ignored() {
        let store = store();
        assert!(!store.toggle("nope").unwrap());
        assert!(!store.toggle("orphan").unwrap());
        assert!(store.pending().is_empty());
        assert_eq!(store.inner.channel.queued_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_by_target_applies_state() {
        let store = store();
        store.toggle("fan_exhaust").unwrap();

        store.inner.on_status(&json!({
            "type": "device_status", "target": "192.168.1.100", "on": false, "success": true
        }));

        assert!(!store.is_pending("fan_exhaust"));
        assert!(!store.get("fan_exhaust").unwrap().is_on);
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_clears_pending_and_keeps_state() {
        let store = store();
        store.toggle("pump").unwrap();

        store.inner.on_status(&json!({
            "type": "device_status", "deviceId": "pump", "target": "17", "on": true, "success": false
        }));

        assert!(!store.is_pending("pump"));
        assert!(!store.get("pump").unwrap().is_on);
        assert!(store.last_error().unwrap().contains("pump"));
    }

    #[tokio::test(start_paused = true)]
    async fn safety_timeout_clears_stale_pending() {
        let store = store();
        store.toggle("pump").unwrap();

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert!(store.is_pending("pump"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!store.is_pending("pump"));

        // A late confirmation still applies and is harmless.
        store.inner.on_status(&json!({ "deviceId": "pump", "on": true, "success": true }));
        assert!(store.get("pump").unwrap().is_on);
        assert!(store.toggle("pump").unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_timer_does_not_clear_a_newer_toggle() {
        let store = store();
        store.toggle("pump").unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        store.inner.on_status(&json!({ "deviceId": "pump", "on": true, "success": true }));
        store.toggle("pump").unwrap();

        // First timer would have fired here.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(store.is_pending("pump"));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!store.is_pending("pump"));
    }

    #[tokio::test(start_paused = true)]
    async fn override_window_is_recorded_and_cleared() {
        let store = store();
        store.inner.on_status(&json!({
            "deviceId": "fan_exhaust", "target": "192.168.1.100", "on": true, "success": true,
            "overrideActive": true, "overrideRemainingMs": 120_000
        }));

        let remaining = store.override_remaining("fan_exhaust").unwrap();
        assert_eq!(remaining, Duration::from_millis(120_000));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(
            store.override_remaining("fan_exhaust").unwrap(),
            Duration::from_secs(60)
        );

        store.inner.on_override_cleared(&json!({ "type": "override_cleared", "deviceId": "fan_exhaust" }));
        assert!(store.override_expiry("fan_exhaust").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn override_expires_on_its_own() {
        let store = store();
        store.inner.on_status(&json!({
            "deviceId": "pump", "on": true, "success": true,
            "overrideActive": true, "overrideRemainingMs": 1_000
        }));
        tokio::time::sleep(Duration::from_millis(1_001)).await;
        assert!(store.override_remaining("pump").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn bulk_push_replaces_and_prunes_bookkeeping() {
        let store = store();
        store.toggle("pump").unwrap();

        store.inner.on_devices(&json!([
            { "id": "heater", "name": "Heater", "type": "heater", "controlMethod": "tasmota",
              "ipAddress": "192.168.1.51" }
        ]));

        let ids: Vec<String> = store.snapshot().iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec!["heater".to_string()]);
        assert!(store.get("fan_exhaust").is_none());
        assert!(!store.is_pending("pump"));
    }

    #[test]
    fn new_device_validation() {
        let mut device = NewDevice {
            id: "light".into(),
            name: "Light".into(),
            device_type: crate::model::DeviceType::Light,
            control_method: ControlMethod::ShellyGen1,
            ip_address: None,
            gpio_pin: None,
        };
        assert!(validate_new_device(&device).is_err());

        device.ip_address = Some("192.168.1.60".into());
        assert!(validate_new_device(&device).is_ok());

        device.control_method = ControlMethod::Relay;
        device.ip_address = None;
        assert!(validate_new_device(&device).is_err());
        device.gpio_pin = Some(16);
        assert!(validate_new_device(&device).is_ok());
    }
}
