//! Configuration backup and restore over the controller's HTTP side-channel.

use std::path::Path;

use espgrow_core::{ConfigBundle, Controller};

use crate::config::Session;
use crate::error::CliError;
use crate::output;

use super::util;

fn summary(bundle: &ConfigBundle) -> String {
    format!(
        "{} devices, {} rules, {} sensors",
        bundle.devices.len(),
        bundle.rules.len(),
        bundle.sensors.len()
    )
}

pub async fn backup(controller: &Controller, file: &Path, session: &Session) -> Result<(), CliError> {
    let bundle = util::within(session.timeout, "backup download", async {
        Ok(controller.backup().await?)
    })
    .await?;

    let json = serde_json::to_string_pretty(&bundle)?;
    tokio::fs::write(file, json).await?;

    output::notice(
        &format!("Saved {} to {}", summary(&bundle), file.display()),
        session.quiet,
    );
    Ok(())
}

pub async fn restore(controller: &Controller, file: &Path, session: &Session) -> Result<(), CliError> {
    let raw = tokio::fs::read_to_string(file).await?;
    let bundle: ConfigBundle = serde_json::from_str(&raw).map_err(|e| CliError::Validation {
        field: "file".into(),
        reason: format!("{} is not a backup: {e}", file.display()),
    })?;

    if !util::confirm(
        &format!("Replace the controller configuration with {}?", summary(&bundle)),
        session,
    )? {
        return Ok(());
    }

    util::within(session.timeout, "restore upload", async {
        Ok(controller.restore(&bundle).await?)
    })
    .await?;

    output::notice(&format!("Restored {}", summary(&bundle)), session.quiet);
    Ok(())
}
