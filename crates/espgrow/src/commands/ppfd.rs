//! PPFD calibration of the spectral light sensor.

use tokio::sync::watch;

use espgrow_core::{Controller, PpfdCalibration};

use crate::cli::{PpfdArgs, PpfdCommand};
use crate::config::Session;
use crate::error::CliError;
use crate::output;

use super::util;

fn render(cal: PpfdCalibration, session: &Session) -> Result<(), CliError> {
    let out = output::render_single(
        session.output,
        &cal,
        |v| format!("Calibration factor: {:.4}", v.factor),
        |v| v.factor.to_string(),
    )?;
    output::print_output(&out, session.quiet);
    Ok(())
}

/// Wait for the controller's answer to a calibration command. A rejection
/// arrives as a failed `ppfd_calibration` push and sets the store error.
async fn await_result(
    mut factor: watch::Receiver<Option<PpfdCalibration>>,
    mut error: watch::Receiver<Option<String>>,
    session: &Session,
) -> Result<PpfdCalibration, CliError> {
    util::within(session.timeout, "calibration result", async {
        loop {
            tokio::select! {
                changed = factor.changed() => {
                    changed.map_err(|_| CliError::Disconnected)?;
                    if let Some(cal) = *factor.borrow_and_update() {
                        return Ok(cal);
                    }
                }
                changed = error.changed() => {
                    changed.map_err(|_| CliError::Disconnected)?;
                    if let Some(message) = error.borrow_and_update().clone() {
                        return Err(CliError::Rejected { message });
                    }
                }
            }
        }
    })
    .await
}

pub async fn handle(
    controller: &Controller,
    args: PpfdArgs,
    session: &Session,
) -> Result<(), CliError> {
    util::connect(controller, session).await?;
    let store = controller.sensors();
    let factor = store.watch_ppfd_calibration();
    let error = store.watch_last_error();

    let cal = match args.command {
        PpfdCommand::Get => {
            store.request_ppfd_calibration()?;
            await_result(factor, error, session).await?
        }
        PpfdCommand::Calibrate { known_ppfd } => {
            store.calibrate_ppfd(known_ppfd)?;
            let cal = await_result(factor, error, session).await?;
            output::notice(&format!("Calibrated against {known_ppfd} µmol/m²/s"), session.quiet);
            cal
        }
        PpfdCommand::Reset => {
            store.reset_ppfd_calibration()?;
            let cal = await_result(factor, error, session).await?;
            output::notice("Calibration reset", session.quiet);
            cal
        }
    };
    render(cal, session)
}
