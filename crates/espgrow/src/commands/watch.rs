//! Live change stream: connection, device state, readings and OTA.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Local;
use serde::Serialize;

use espgrow_core::{ConnectionState, Controller, Device};

use crate::cli::{OutputFormat, WatchArgs};
use crate::config::Session;
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WatchEvent<'a> {
    Connection { state: String },
    Device { id: &'a str, name: &'a str, is_on: bool, pending: bool },
    Reading { sensor_id: &'a str, value: f64 },
    Ota { status: String, progress: Option<u8> },
}

fn emit(event: &WatchEvent<'_>, session: &Session) {
    let line = match session.output {
        OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
            serde_json::to_string(event).unwrap_or_default()
        }
        OutputFormat::Table | OutputFormat::Plain => {
            let text = match event {
                WatchEvent::Connection { state } => format!("connection {state}"),
                WatchEvent::Device { name, is_on, pending, .. } => {
                    format!("{name} {}", output::power_label(*is_on, *pending, session.color))
                }
                WatchEvent::Reading { sensor_id, value } => format!("{sensor_id} = {value}"),
                WatchEvent::Ota { status, progress } => match progress {
                    Some(p) => format!("ota {status} {p}%"),
                    None => format!("ota {status}"),
                },
            };
            format!("{} {text}", Local::now().format("%H:%M:%S"))
        }
    };
    output::print_output(&line, session.quiet);
}

/// Device fields worth reporting when they change.
fn device_key(d: &Device, pending: bool) -> (bool, bool) {
    (d.is_on, pending)
}

pub async fn handle(
    controller: &Controller,
    args: WatchArgs,
    session: &Session,
) -> Result<(), CliError> {
    util::connect(controller, session).await?;
    let mut state = controller.watch_connection_state();

    let devices_store = controller.devices();
    util::synced(session.timeout, "device list", devices_store.wait_synced()).await?;
    let mut devices = devices_store.subscribe();
    let mut pending = devices_store.watch_pending();
    let mut readings = controller.sensors().watch_readings();
    let mut ota = controller.system().watch_ota_status();
    let mut last: HashMap<String, (bool, bool)> = HashMap::new();

    let deadline = args.duration.map(Duration::from_secs);
    let sleep = tokio::time::sleep(deadline.unwrap_or(Duration::MAX / 4));
    tokio::pin!(sleep);

    let initial = *state.borrow_and_update();
    emit(&WatchEvent::Connection { state: initial.to_string() }, session);
    report_devices(controller, &mut last, session);

    loop {
        tokio::select! {
            () = &mut sleep, if deadline.is_some() => break,
            _ = tokio::signal::ctrl_c() => break,

            changed = state.changed() => {
                if changed.is_err() {
                    return Err(CliError::Disconnected);
                }
                let s = *state.borrow_and_update();
                emit(&WatchEvent::Connection { state: s.to_string() }, session);
                if s == ConnectionState::Closed {
                    return Err(CliError::Disconnected);
                }
            }

            changed = devices.changed() => {
                if changed.is_none() {
                    return Err(CliError::Disconnected);
                }
                report_devices(controller, &mut last, session);
            }

            changed = pending.changed() => {
                if changed.is_err() {
                    return Err(CliError::Disconnected);
                }
                pending.borrow_and_update();
                report_devices(controller, &mut last, session);
            }

            changed = readings.changed(), if args.readings => {
                if changed.is_err() {
                    return Err(CliError::Disconnected);
                }
                readings.borrow_and_update();
                for r in controller.sensors().readings() {
                    emit(&WatchEvent::Reading { sensor_id: &r.sensor_id, value: r.value }, session);
                }
            }

            changed = ota.changed() => {
                if changed.is_err() {
                    return Err(CliError::Disconnected);
                }
                let status = ota.borrow_and_update().clone();
                if let Some(status) = status {
                    emit(
                        &WatchEvent::Ota { status: status.status.to_string(), progress: status.progress },
                        session,
                    );
                }
            }
        }
    }
    Ok(())
}

fn report_devices(
    controller: &Controller,
    last: &mut HashMap<String, (bool, bool)>,
    session: &Session,
) {
    let store = controller.devices();
    for d in store.snapshot().iter() {
        let key = device_key(d, store.is_pending(&d.id));
        if last.get(&d.id) == Some(&key) {
            continue;
        }
        last.insert(d.id.clone(), key);
        emit(
            &WatchEvent::Device { id: &d.id, name: &d.name, is_on: key.0, pending: key.1 },
            session,
        );
    }
}
