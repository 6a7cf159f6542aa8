// ── Sensor store ──
//
// Sensor configuration (bulk `sensor_config` pushes), latest readings
// (`sensors` pushes, overwritten each time), history series (`history`
// frames, replaced wholesale per sensor and range) and the PPFD
// calibration factor of the light sensor.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use espgrow_api::telemetry::{self, POINT_SIZE};
use espgrow_api::{Channel, Subscription};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;

use super::collection::EntityCollection;
use super::{send_command, subscribe_frame_weak, subscribe_weak};
use crate::command::Command;
use crate::command::requests::{NewSensor, SensorUpdate};
use crate::error::CoreError;
use crate::model::{self, HistoryRange, HistorySeries, PpfdCalibration, Sensor, SensorReading};
use crate::stream::EntityStream;

type HistoryKey = (String, HistoryRange);

#[derive(Clone)]
pub struct SensorStore {
    inner: Arc<SensorStoreInner>,
}

struct SensorStoreInner {
    channel: Channel,
    sensors: EntityCollection<Sensor>,
    readings: DashMap<String, SensorReading>,
    last_reading_at: watch::Sender<Option<DateTime<Utc>>>,
    history: DashMap<HistoryKey, Arc<HistorySeries>>,
    /// Key of the most recently replaced history series.
    history_updates: watch::Sender<Option<HistoryKey>>,
    ppfd: watch::Sender<Option<PpfdCalibration>>,
    last_error: watch::Sender<Option<String>>,
}

/// One element of a `sensors` push.
#[derive(Debug, Deserialize)]
struct LiveValue {
    id: String,
    value: f64,
}

/// `history` frame as a whole. The series is base64 under `payload`,
/// or under `data` beside the top-level `sensorId` and `range`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryFrame {
    sensor_id: String,
    range: String,
    #[serde(alias = "data")]
    payload: String,
    #[serde(default)]
    count: Option<usize>,
    #[serde(default)]
    point_size: Option<usize>,
}

/// `ppfd_calibration` push.
#[derive(Debug, Deserialize)]
struct PpfdFrame {
    #[serde(default)]
    factor: Option<f64>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

impl SensorStore {
    pub fn new(channel: Channel) -> Self {
        let (last_reading_at, _) = watch::channel(None);
        let (history_updates, _) = watch::channel(None);
        let (ppfd, _) = watch::channel(None);
        let (last_error, _) = watch::channel(None);

        Self {
            inner: Arc::new(SensorStoreInner {
                channel,
                sensors: EntityCollection::new(),
                readings: DashMap::new(),
                last_reading_at,
                history: DashMap::new(),
                history_updates,
                ppfd,
                last_error,
            }),
        }
    }

    pub fn attach(&self) -> Vec<Subscription> {
        let channel = &self.inner.channel;
        vec![
            subscribe_weak(channel, &self.inner, "sensor_config", SensorStoreInner::on_config),
            subscribe_weak(channel, &self.inner, "sensors", SensorStoreInner::on_readings),
            subscribe_frame_weak(channel, &self.inner, "history", SensorStoreInner::on_history),
            subscribe_weak(channel, &self.inner, "ppfd_calibration", SensorStoreInner::on_ppfd),
        ]
    }

    // ── Configuration ────────────────────────────────────────────────

    pub fn snapshot(&self) -> Arc<Vec<Arc<Sensor>>> {
        self.inner.sensors.snapshot()
    }

    pub fn get(&self, sensor_id: &str) -> Option<Arc<Sensor>> {
        self.inner.sensors.get(sensor_id)
    }

    pub fn subscribe(&self) -> EntityStream<Sensor> {
        EntityStream::new(self.inner.sensors.subscribe())
    }

    pub fn is_synced(&self) -> bool {
        self.inner.sensors.version() > 0
    }

    pub async fn wait_synced(&self) {
        let mut rx = self.inner.sensors.subscribe_version();
        let _ = rx.wait_for(|v| *v > 0).await;
    }

    pub fn request(&self) -> Result<(), CoreError> {
        send_command(&self.inner.channel, &Command::GetSensors)
    }

    pub fn add(&self, sensor: NewSensor) -> Result<(), CoreError> {
        if sensor.id.trim().is_empty() || sensor.name.trim().is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "sensor id and name must not be empty".into(),
            });
        }
        send_command(&self.inner.channel, &Command::AddSensor(sensor))
    }

    pub fn update(&self, sensor_id: &str, update: SensorUpdate) -> Result<(), CoreError> {
        send_command(
            &self.inner.channel,
            &Command::UpdateSensor {
                id: sensor_id.to_owned(),
                update,
            },
        )
    }

    /// Ask the controller to drop a sensor. Local readings and history
    /// stay until the resulting `sensor_config` push prunes them.
    pub fn remove(&self, sensor_id: &str) -> Result<(), CoreError> {
        send_command(
            &self.inner.channel,
            &Command::RemoveSensor {
                id: sensor_id.to_owned(),
            },
        )
    }

    // ── Readings ─────────────────────────────────────────────────────

    pub fn reading(&self, sensor_id: &str) -> Option<SensorReading> {
        self.inner.readings.get(sensor_id).map(|r| r.value().clone())
    }

    /// All latest readings, in sensor configuration order first.
    pub fn readings(&self) -> Vec<SensorReading> {
        let mut out: Vec<SensorReading> = self
            .snapshot()
            .iter()
            .filter_map(|s| self.reading(&s.id))
            .collect();
        let known: HashSet<String> = out.iter().map(|r| r.sensor_id.clone()).collect();
        let mut extra: Vec<SensorReading> = self
            .inner
            .readings
            .iter()
            .filter(|r| !known.contains(r.key()))
            .map(|r| r.value().clone())
            .collect();
        extra.sort_by(|a, b| a.sensor_id.cmp(&b.sensor_id));
        out.extend(extra);
        out
    }

    /// Changes whenever a `sensors` push is applied.
    pub fn watch_readings(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.inner.last_reading_at.subscribe()
    }

    // ── History ──────────────────────────────────────────────────────

    pub fn request_history(&self, sensor_id: &str, range: HistoryRange) -> Result<(), CoreError> {
        send_command(
            &self.inner.channel,
            &Command::GetHistory {
                sensor_id: sensor_id.to_owned(),
                range,
            },
        )
    }

    pub fn history(&self, sensor_id: &str, range: HistoryRange) -> Option<Arc<HistorySeries>> {
        self.inner
            .history
            .get(&(sensor_id.to_owned(), range))
            .map(|r| Arc::clone(r.value()))
    }

    /// Yields the `(sensor id, range)` of each series as it is replaced.
    pub fn watch_history(&self) -> watch::Receiver<Option<(String, HistoryRange)>> {
        self.inner.history_updates.subscribe()
    }

    // ── PPFD calibration ─────────────────────────────────────────────

    pub fn ppfd_calibration(&self) -> Option<PpfdCalibration> {
        *self.inner.ppfd.borrow()
    }

    pub fn watch_ppfd_calibration(&self) -> watch::Receiver<Option<PpfdCalibration>> {
        self.inner.ppfd.subscribe()
    }

    pub fn request_ppfd_calibration(&self) -> Result<(), CoreError> {
        send_command(&self.inner.channel, &Command::GetPpfdCalibration)
    }

    /// Calibrate against a reference meter reading.
    pub fn calibrate_ppfd(&self, known_ppfd: f64) -> Result<(), CoreError> {
        if !known_ppfd.is_finite() {
            return Err(CoreError::ValidationFailed {
                message: "reference PPFD must be a finite number".into(),
            });
        }
        send_command(&self.inner.channel, &Command::CalibratePpfd { known_ppfd })
    }

    pub fn reset_ppfd_calibration(&self) -> Result<(), CoreError> {
        send_command(&self.inner.channel, &Command::ResetPpfdCalibration)
    }

    /// Most recent rejected calibration, if any.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.borrow().clone()
    }

    pub fn watch_last_error(&self) -> watch::Receiver<Option<String>> {
        self.inner.last_error.subscribe()
    }
}

impl std::fmt::Debug for SensorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorStore")
            .field("sensors", &self.inner.sensors.len())
            .field("readings", &self.inner.readings.len())
            .field("history", &self.inner.history.len())
            .finish_non_exhaustive()
    }
}

impl SensorStoreInner {
    fn on_config(&self, payload: &Value) {
        let Some(sensors) = model::decode_collection::<Sensor>(payload, "sensor_config") else {
            return;
        };

        let present: HashSet<String> = sensors.iter().map(|s| s.id.clone()).collect();
        let before = self.sensors.keys();
        self.readings
            .retain(|id, _| present.contains(id) || !before.contains(id));
        self.history.retain(|(id, _), _| present.contains(id));

        tracing::debug!(count = sensors.len(), "sensor config replaced");
        self.sensors.replace_all(sensors);
    }

    fn on_readings(&self, payload: &Value) {
        let Some(items) = payload.as_array() else {
            tracing::debug!("sensors push is not an array, ignoring");
            return;
        };

        let now = Utc::now();
        let mut applied = 0usize;
        for item in items {
            let Ok(live) = LiveValue::deserialize(item) else {
                continue;
            };
            if !live.value.is_finite() {
                continue;
            }
            self.readings.insert(
                live.id.clone(),
                SensorReading {
                    sensor_id: live.id,
                    value: live.value,
                    captured_at: now,
                },
            );
            applied += 1;
        }

        tracing::trace!(applied, "sensor readings updated");
        self.last_reading_at.send_replace(Some(now));
    }

    fn on_history(&self, raw: &Value) {
        let Some(frame) = model::decode_payload::<HistoryFrame>(raw, "history") else {
            return;
        };
        let Some(range) = HistoryRange::from_wire(&frame.range) else {
            tracing::debug!(range = %frame.range, "history for unknown range, ignoring");
            return;
        };
        if frame.point_size.is_some_and(|size| size != POINT_SIZE) {
            tracing::debug!(point_size = ?frame.point_size, "unsupported history point size");
            return;
        }

        let points = match telemetry::decode_telemetry_base64(&frame.payload) {
            Ok(points) => points,
            Err(e) => {
                tracing::debug!(sensor_id = %frame.sensor_id, error = %e, "dropping history frame");
                return;
            }
        };
        if let Some(count) = frame.count {
            if count != points.len() {
                tracing::debug!(
                    sensor_id = %frame.sensor_id,
                    announced = count,
                    decoded = points.len(),
                    "history count differs after filtering"
                );
            }
        }

        let key = (frame.sensor_id.clone(), range);
        let series = HistorySeries {
            sensor_id: frame.sensor_id,
            range,
            points,
            fetched_at: Utc::now(),
        };
        tracing::debug!(sensor_id = %series.sensor_id, %range, points = series.points.len(), "history replaced");
        self.history.insert(key.clone(), Arc::new(series));
        self.history_updates.send_replace(Some(key));
    }

    fn on_ppfd(&self, payload: &Value) {
        let Some(frame) = model::decode_payload::<PpfdFrame>(payload, "ppfd_calibration") else {
            return;
        };

        if frame.success == Some(false) {
            let reason = frame.error.unwrap_or_else(|| "calibration rejected".into());
            tracing::warn!(reason = %reason, "controller rejected PPFD calibration");
            self.last_error.send_replace(Some(reason));
            return;
        }

        if let Some(factor) = frame.factor {
            self.ppfd.send_replace(Some(PpfdCalibration { factor }));
            self.last_error.send_replace(None);
        }
    }
}
