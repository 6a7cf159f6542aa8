//! Device command handlers.

use std::time::Duration;

use serde::Serialize;
use tabled::Tabled;

use espgrow_core::{ControlMethod, Controller, Device, DeviceType, DeviceUpdate, NewDevice};

use crate::cli::{ControlMethodArg, DeviceKindArg, DeviceSpec, DevicesArgs, DevicesCommand};
use crate::config::Session;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    dtype: String,
    #[tabled(rename = "Method")]
    method: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Override")]
    override_left: String,
}

/// Device plus the client-side bookkeeping the store keeps for it.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceView {
    #[serde(flatten)]
    device: Device,
    pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    override_remaining_ms: Option<u64>,
}

fn views(controller: &Controller) -> Vec<DeviceView> {
    let store = controller.devices();
    store
        .snapshot()
        .iter()
        .map(|d| DeviceView {
            device: Device::clone(d),
            pending: store.is_pending(&d.id),
            override_remaining_ms: store
                .override_remaining(&d.id)
                .map(|r| u64::try_from(r.as_millis()).unwrap_or(u64::MAX)),
        })
        .collect()
}

fn row(v: &DeviceView, color: bool) -> DeviceRow {
    let d = &v.device;
    DeviceRow {
        id: d.id.clone(),
        name: d.name.clone(),
        dtype: d.device_type.to_string(),
        method: d.control_method.to_string(),
        target: d.target().unwrap_or_else(|| "-".into()),
        state: output::power_label(d.is_on, v.pending, color),
        mode: d.control_mode.to_string(),
        override_left: v
            .override_remaining_ms
            .map_or_else(String::new, |ms| util::format_remaining(Duration::from_millis(ms))),
    }
}

impl From<DeviceKindArg> for DeviceType {
    fn from(arg: DeviceKindArg) -> Self {
        match arg {
            DeviceKindArg::Fan => Self::Fan,
            DeviceKindArg::Light => Self::Light,
            DeviceKindArg::Heater => Self::Heater,
            DeviceKindArg::Pump => Self::Pump,
            DeviceKindArg::Humidifier => Self::Humidifier,
            DeviceKindArg::Dehumidifier => Self::Dehumidifier,
        }
    }
}

impl From<ControlMethodArg> for ControlMethod {
    fn from(arg: ControlMethodArg) -> Self {
        match arg {
            ControlMethodArg::Relay => Self::Relay,
            ControlMethodArg::ShellyGen1 => Self::ShellyGen1,
            ControlMethodArg::ShellyGen2 => Self::ShellyGen2,
            ControlMethodArg::Tasmota => Self::Tasmota,
        }
    }
}

impl From<DeviceSpec> for NewDevice {
    fn from(spec: DeviceSpec) -> Self {
        Self {
            id: spec.id,
            name: spec.name,
            device_type: spec.device_type.into(),
            control_method: spec.method.into(),
            ip_address: spec.ip,
            gpio_pin: spec.pin,
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    controller: &Controller,
    args: DevicesArgs,
    session: &Session,
) -> Result<(), CliError> {
    util::connect(controller, session).await?;
    let store = controller.devices();
    util::synced(session.timeout, "device list", store.wait_synced()).await?;
    let mut devices = store.subscribe();

    match args.command {
        DevicesCommand::List => {
            let views = views(controller);
            let out = output::render_list(
                session.output,
                &views,
                |v| row(v, session.color),
                |v| v.device.id.clone(),
            )?;
            output::print_output(&out, session.quiet);
            Ok(())
        }

        DevicesCommand::Toggle { device } => toggle(controller, &device, session).await,

        DevicesCommand::Add(spec) => {
            let id = spec.id.clone();
            store.add(spec.into())?;
            util::wait_collection(&mut devices, session.timeout, "device to appear", |snap| {
                snap.iter().any(|d| d.id == id)
            })
            .await?;
            output::notice(&format!("Device {id} added"), session.quiet);
            Ok(())
        }

        DevicesCommand::Update { device, fields } => {
            let before = store
                .get(&device)
                .ok_or_else(|| CliError::not_found("device", &device))?;
            let update = DeviceUpdate {
                name: fields.name,
                device_type: fields.device_type.map(Into::into),
                control_method: fields.method.map(Into::into),
                ip_address: fields.ip,
                gpio_pin: fields.pin,
            };
            if update == DeviceUpdate::default() {
                return Err(CliError::Validation {
                    field: "update".into(),
                    reason: "nothing to change".into(),
                });
            }
            store.update(&device, update)?;
            util::wait_collection(&mut devices, session.timeout, "device update", |snap| {
                snap.iter().any(|d| d.id == device && **d != *before)
            })
            .await?;
            output::notice(&format!("Device {device} updated"), session.quiet);
            Ok(())
        }

        DevicesCommand::Remove { device } => {
            if store.get(&device).is_none() {
                return Err(CliError::not_found("device", &device));
            }
            if !util::confirm(&format!("Remove device {device}?"), session)? {
                return Ok(());
            }
            store.remove(&device)?;
            util::wait_collection(&mut devices, session.timeout, "device removal", |snap| {
                snap.iter().all(|d| d.id != device)
            })
            .await?;
            output::notice(&format!("Device {device} removed"), session.quiet);
            Ok(())
        }
    }
}

/// Toggle and report the confirmed outcome.
async fn toggle(controller: &Controller, device_id: &str, session: &Session) -> Result<(), CliError> {
    let store = controller.devices();
    let before = store
        .get(device_id)
        .ok_or_else(|| CliError::not_found("device", device_id))?;

    if !store.toggle(device_id)? {
        return Err(CliError::Validation {
            field: "device".into(),
            reason: format!("{device_id} has no address or a toggle is already in flight"),
        });
    }

    // The store clears the pending mark itself on confirmation, rejection
    // or its own safety timeout; wait a little longer than that.
    let grace = controller.config().toggle_timeout + Duration::from_secs(1);
    let mut pending = store.watch_pending();
    util::within(grace, "toggle confirmation", async {
        pending
            .wait_for(|set| !set.contains(device_id))
            .await
            .map(|_| ())
            .map_err(|_| CliError::Disconnected)
    })
    .await?;

    let after = store
        .get(device_id)
        .ok_or_else(|| CliError::not_found("device", device_id))?;
    if after.is_on != before.is_on {
        let state = output::power_label(after.is_on, false, session.color);
        output::notice(&format!("{} is now {state}", after.name), session.quiet);
        return Ok(());
    }

    match store.last_error() {
        Some(message) => Err(CliError::Rejected { message }),
        None => Err(CliError::Timeout {
            what: format!("confirmation from {}", after.name),
            seconds: controller.config().toggle_timeout.as_secs(),
        }),
    }
}
