//! Controller health and latency.

use std::fmt::Write as _;

use serde::Serialize;

use espgrow_core::{Controller, SystemInfo};

use crate::cli::{OutputFormat, SystemArgs, SystemCommand};
use crate::config::Session;
use crate::error::CliError;
use crate::output;

use super::util;

fn detail(info: &SystemInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Chip:      {}", info.chip_model);
    let _ = writeln!(out, "Firmware:  {}", info.firmware_version);
    let _ = writeln!(out, "Address:   {}", info.ip_address);
    let _ = writeln!(out, "Uptime:    {}", util::format_uptime(info.uptime));
    let _ = writeln!(out, "Free heap: {} KiB", info.free_heap / 1024);
    let _ = write!(out, "Wi-Fi:     {} dBm", info.wifi_rssi);
    out
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PingResult {
    seq: u32,
    rtt_ms: f64,
}

pub async fn handle(
    controller: &Controller,
    args: SystemArgs,
    session: &Session,
) -> Result<(), CliError> {
    util::connect(controller, session).await?;
    let store = controller.system();

    match args.command {
        SystemCommand::Info => {
            util::synced(session.timeout, "system info", store.wait_synced()).await?;
            let info = store.info().unwrap_or_default();
            let out = output::render_single(session.output, &info, detail, |i| {
                i.firmware_version.clone()
            })?;
            output::print_output(&out, session.quiet);
            Ok(())
        }

        SystemCommand::Ping { count } => {
            let mut rx = store.watch_latency();
            let mut results = Vec::new();
            for seq in 1..=count.max(1) {
                rx.borrow_and_update();
                store.ping()?;
                util::next_change(&mut rx, session.timeout, "pong").await?;
                let Some(rtt) = *rx.borrow() else {
                    continue;
                };
                let rtt_ms = rtt.as_secs_f64() * 1000.0;
                if session.output == OutputFormat::Table {
                    output::print_output(&format!("pong seq={seq} time={rtt_ms:.1} ms"), session.quiet);
                }
                results.push(PingResult { seq, rtt_ms });
            }
            if session.output != OutputFormat::Table {
                let out = output::render_single(session.output, &results, |_| String::new(), |r| {
                    r.iter().map(|p| format!("{:.1}", p.rtt_ms)).collect::<Vec<_>>().join("\n")
                })?;
                output::print_output(&out, session.quiet);
            }
            Ok(())
        }
    }
}
