//! One-screen controller summary.

use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;

use espgrow_core::{Controller, OtaStatus, SensorReading, SystemInfo};

use crate::config::Session;
use crate::error::CliError;
use crate::output;

use super::util;

/// Readings are pushed periodically, not on request.
const READINGS_GRACE: Duration = Duration::from_secs(3);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView {
    controller: String,
    info: Option<SystemInfo>,
    latency_ms: Option<f64>,
    devices_on: usize,
    devices_total: usize,
    rules_enabled: usize,
    rules_total: usize,
    readings: Vec<LabelledReading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ota: Option<OtaStatus>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LabelledReading {
    #[serde(flatten)]
    reading: SensorReading,
    name: String,
    unit: String,
}

fn detail(v: &StatusView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Controller: {}", v.controller);
    if let Some(info) = &v.info {
        let _ = writeln!(
            out,
            "Firmware:   {} on {} (up {})",
            info.firmware_version,
            info.chip_model,
            util::format_uptime(info.uptime)
        );
    }
    if let Some(ms) = v.latency_ms {
        let _ = writeln!(out, "Latency:    {ms:.1} ms");
    }
    let _ = writeln!(out, "Devices:    {} of {} on", v.devices_on, v.devices_total);
    let _ = writeln!(out, "Rules:      {} of {} enabled", v.rules_enabled, v.rules_total);
    if let Some(ota) = &v.ota {
        let progress = ota.progress.map(|p| format!(" {p}%")).unwrap_or_default();
        let _ = writeln!(out, "Firmware update: {}{progress}", ota.status);
    }
    if !v.readings.is_empty() {
        let _ = writeln!(out);
        for r in &v.readings {
            let _ = writeln!(out, "  {:<20} {} {}", r.name, r.reading.value, r.unit);
        }
    }
    out.trim_end().to_owned()
}

pub async fn handle(controller: &Controller, session: &Session) -> Result<(), CliError> {
    util::connect(controller, session).await?;
    let timeout = session.timeout;

    util::synced(timeout, "device list", controller.devices().wait_synced()).await?;
    util::synced(timeout, "sensor list", controller.sensors().wait_synced()).await?;
    util::synced(timeout, "rule list", controller.rules().wait_synced()).await?;
    util::synced(timeout, "system info", controller.system().wait_synced()).await?;

    let system = controller.system();
    let mut latency = system.watch_latency();
    system.ping()?;
    let _ = util::next_change(&mut latency, timeout, "pong").await;

    let sensors = controller.sensors();
    if sensors.readings().is_empty() {
        let mut rx = sensors.watch_readings();
        if util::next_change(&mut rx, READINGS_GRACE.min(timeout), "readings").await.is_err() {
            tracing::debug!("no readings pushed yet");
        }
    }

    let devices = controller.devices().snapshot();
    let rules = controller.rules().snapshot();
    let readings = sensors
        .readings()
        .into_iter()
        .map(|reading| {
            let sensor = sensors.get(&reading.sensor_id);
            LabelledReading {
                name: sensor.as_ref().map_or_else(|| reading.sensor_id.clone(), |s| s.name.clone()),
                unit: sensor.map(|s| s.unit.clone()).unwrap_or_default(),
                reading,
            }
        })
        .collect();

    let view = StatusView {
        controller: controller.config().url.to_string(),
        info: system.info(),
        latency_ms: system.latency().map(|d| d.as_secs_f64() * 1000.0),
        devices_on: devices.iter().filter(|d| d.is_on).count(),
        devices_total: devices.len(),
        rules_enabled: rules.iter().filter(|r| r.enabled).count(),
        rules_total: rules.len(),
        readings,
        ota: system.ota_status(),
    };

    let out = output::render_single(session.output, &view, detail, |v| v.controller.clone())?;
    output::print_output(&out, session.quiet);
    Ok(())
}
