//! Sensor command handlers.

use chrono::{DateTime, Local};
use serde::Serialize;
use tabled::Tabled;

use espgrow_core::{Controller, HistoryRange, NewSensor, Sensor, SensorReading, SensorType, TelemetryPoint};

use crate::cli::{RangeArg, SensorKindArg, SensorSpec, SensorsArgs, SensorsCommand};
use crate::config::Session;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct SensorRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    stype: String,
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Hardware")]
    hardware: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Serialize)]
struct SensorView {
    #[serde(flatten)]
    sensor: Sensor,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
}

#[derive(Tabled)]
struct ReadingRow {
    #[tabled(rename = "Sensor")]
    sensor: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Captured")]
    captured: String,
}

#[derive(Tabled)]
struct PointRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn sensor_row(v: &SensorView) -> SensorRow {
    let s = &v.sensor;
    SensorRow {
        id: s.id.clone(),
        name: s.name.clone(),
        stype: s.sensor_type.to_string(),
        unit: s.unit.clone(),
        hardware: s.hardware_type.clone(),
        value: v.value.map_or_else(|| "-".into(), |x| format!("{x} {}", s.unit)),
    }
}

fn local_time(ts: DateTime<chrono::Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn point_row(p: &TelemetryPoint) -> PointRow {
    let time = DateTime::from_timestamp(i64::from(p.timestamp), 0)
        .map_or_else(|| p.timestamp.to_string(), local_time);
    PointRow {
        time,
        value: p.value.to_string(),
    }
}

impl From<RangeArg> for HistoryRange {
    fn from(arg: RangeArg) -> Self {
        match arg {
            RangeArg::Short => Self::Short,
            RangeArg::Medium => Self::Medium,
            RangeArg::Long => Self::Long,
        }
    }
}

impl From<SensorKindArg> for SensorType {
    fn from(arg: SensorKindArg) -> Self {
        match arg {
            SensorKindArg::Temperature => Self::Temperature,
            SensorKindArg::Humidity => Self::Humidity,
            SensorKindArg::Co2 => Self::Co2,
            SensorKindArg::Light => Self::Light,
            SensorKindArg::Vpd => Self::Vpd,
            SensorKindArg::SoilMoisture => Self::SoilMoisture,
        }
    }
}

impl From<SensorSpec> for NewSensor {
    fn from(spec: SensorSpec) -> Self {
        Self {
            id: spec.id,
            name: spec.name,
            sensor_type: spec.sensor_type.into(),
            unit: spec.unit,
            hardware_type: spec.hardware,
            address: spec.address,
            temp_source_id: spec.temp_source,
            hum_source_id: spec.hum_source,
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    controller: &Controller,
    args: SensorsArgs,
    session: &Session,
) -> Result<(), CliError> {
    util::connect(controller, session).await?;
    let store = controller.sensors();
    util::synced(session.timeout, "sensor list", store.wait_synced()).await?;

    match args.command {
        SensorsCommand::List => {
            let views: Vec<SensorView> = store
                .snapshot()
                .iter()
                .map(|s| SensorView {
                    sensor: Sensor::clone(s),
                    value: store.reading(&s.id).map(|r| r.value),
                })
                .collect();
            let out = output::render_list(session.output, &views, sensor_row, |v| {
                v.sensor.id.clone()
            })?;
            output::print_output(&out, session.quiet);
            Ok(())
        }

        SensorsCommand::Readings => {
            if store.readings().is_empty() {
                let mut rx = store.watch_readings();
                util::next_change(&mut rx, session.timeout, "sensor readings").await?;
            }
            let readings = store.readings();
            let out = output::render_list(
                session.output,
                &readings,
                |r: &SensorReading| ReadingRow {
                    sensor: r.sensor_id.clone(),
                    value: r.value.to_string(),
                    captured: local_time(r.captured_at),
                },
                |r| format!("{}\t{}", r.sensor_id, r.value),
            )?;
            output::print_output(&out, session.quiet);
            Ok(())
        }

        SensorsCommand::History { sensor, range, tail } => {
            if store.get(&sensor).is_none() {
                return Err(CliError::not_found("sensor", &sensor));
            }
            let range = HistoryRange::from(range);
            let mut updates = store.watch_history();
            store.request_history(&sensor, range)?;

            util::within(session.timeout, "history series", async {
                updates
                    .wait_for(|key| {
                        key.as_ref()
                            .is_some_and(|(id, r)| *id == sensor && *r == range)
                    })
                    .await
                    .map(|_| ())
                    .map_err(|_| CliError::Disconnected)
            })
            .await?;

            let series = store
                .history(&sensor, range)
                .ok_or_else(|| CliError::not_found("history", &sensor))?;
            let points = match tail {
                Some(n) => &series.points[series.points.len().saturating_sub(n)..],
                None => &series.points[..],
            };
            let out = output::render_list(session.output, points, point_row, |p| {
                format!("{}\t{}", p.timestamp, p.value)
            })?;
            output::print_output(&out, session.quiet);
            if let Some((lo, hi)) = series.bounds() {
                output::notice(
                    &format!("{} points, min {lo}, max {hi}", series.points.len()),
                    session.quiet,
                );
            }
            Ok(())
        }

        SensorsCommand::Add(spec) => {
            let id = spec.id.clone();
            let mut sensors = store.subscribe();
            store.add(spec.into())?;
            util::wait_collection(&mut sensors, session.timeout, "sensor to appear", |snap| {
                snap.iter().any(|s| s.id == id)
            })
            .await?;
            output::notice(&format!("Sensor {id} added"), session.quiet);
            Ok(())
        }

        SensorsCommand::Remove { sensor } => {
            if store.get(&sensor).is_none() {
                return Err(CliError::not_found("sensor", &sensor));
            }
            if !util::confirm(&format!("Remove sensor {sensor}?"), session)? {
                return Ok(());
            }
            let mut sensors = store.subscribe();
            store.remove(&sensor)?;
            util::wait_collection(&mut sensors, session.timeout, "sensor removal", |snap| {
                snap.iter().all(|s| s.id != sensor)
            })
            .await?;
            output::notice(&format!("Sensor {sensor} removed"), session.quiet);
            Ok(())
        }
    }
}
