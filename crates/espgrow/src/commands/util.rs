//! Shared helpers for command handlers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use espgrow_core::{Controller, CoreError, EntityStream, Keyed};
use tokio::sync::watch;

use crate::config::Session;
use crate::error::CliError;

/// Start the link and wait for it to open.
pub async fn connect(controller: &Controller, session: &Session) -> Result<(), CliError> {
    controller.connect()?;
    controller.wait_open(session.timeout).await?;
    Ok(())
}

/// Run `fut` with the session timeout, naming `what` on expiry.
pub async fn within<T, F>(timeout: Duration, what: &str, fut: F) -> Result<T, CliError>
where
    F: Future<Output = Result<T, CliError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| {
            CliError::from(CoreError::Timeout {
                what: what.into(),
                timeout_secs: timeout.as_secs(),
            })
        })?
}

/// Wait for a store's first push.
pub async fn synced(
    timeout: Duration,
    what: &str,
    fut: impl Future<Output = ()>,
) -> Result<(), CliError> {
    within(timeout, what, async {
        fut.await;
        Ok(())
    })
    .await
}

/// Wait until the collection behind `stream` satisfies `pred`.
pub async fn wait_collection<T>(
    stream: &mut EntityStream<T>,
    timeout: Duration,
    what: &str,
    pred: impl Fn(&[Arc<T>]) -> bool,
) -> Result<(), CliError>
where
    T: Keyed + Clone + Send + Sync + 'static,
{
    within(timeout, what, async {
        stream
            .wait_until(pred)
            .await
            .map(|_| ())
            .ok_or(CliError::Disconnected)
    })
    .await
}

/// Wait for the next change of `rx` after this call.
pub async fn next_change<T>(
    rx: &mut watch::Receiver<T>,
    timeout: Duration,
    what: &str,
) -> Result<(), CliError> {
    within(timeout, what, async {
        rx.changed().await.map_err(|_| CliError::Disconnected)
    })
    .await
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, session: &Session) -> Result<bool, CliError> {
    if session.yes {
        return Ok(true);
    }
    if !std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}

/// `+HH:MM` / `-HH:MM` for an offset in minutes east of UTC.
pub fn format_offset(minutes: i32) -> String {
    let sign = if minutes < 0 { '-' } else { '+' };
    let abs = minutes.unsigned_abs();
    format!("{sign}{:02}:{:02}", abs / 60, abs % 60)
}

/// Parse `-300`, `+330`, `-05:00` or `+05:30` into minutes east of UTC.
///
/// Offsets beyond ±14:00 are rejected.
pub fn parse_offset(raw: &str) -> Result<i32, CliError> {
    const MAX_OFFSET_MINUTES: i32 = 14 * 60;
    let invalid = || CliError::Validation {
        field: "offset".into(),
        reason: format!("expected minutes or ±HH:MM within ±14:00, got '{raw}'"),
    };

    let raw = raw.trim();
    let total = if let Some((hours, minutes)) = raw.split_once(':') {
        let (negative, hours) = match hours.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, hours.strip_prefix('+').unwrap_or(hours)),
        };
        let hours: i32 = hours.parse().map_err(|_| invalid())?;
        let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
        if hours < 0 || !(0..60).contains(&minutes) {
            return Err(invalid());
        }
        let total = hours
            .checked_mul(60)
            .and_then(|h| h.checked_add(minutes))
            .ok_or_else(invalid)?;
        if negative { -total } else { total }
    } else {
        raw.parse().map_err(|_| invalid())?
    };

    if !(-MAX_OFFSET_MINUTES..=MAX_OFFSET_MINUTES).contains(&total) {
        return Err(invalid());
    }
    Ok(total)
}

/// `3d 4h 12m` style uptime.
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    match (days, hours) {
        (0, 0) => format!("{minutes}m"),
        (0, _) => format!("{hours}h {minutes}m"),
        _ => format!("{days}d {hours}h {minutes}m"),
    }
}

/// `1m 30s` style remaining time.
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn offsets_parse_both_forms() {
        assert_eq!(parse_offset("-300").unwrap(), -300);
        assert_eq!(parse_offset("+330").unwrap(), 330);
        assert_eq!(parse_offset("-05:00").unwrap(), -300);
        assert_eq!(parse_offset("+05:30").unwrap(), 330);
        assert_eq!(parse_offset("-00:30").unwrap(), -30);
        assert!(parse_offset("05:75").is_err());
        assert!(parse_offset("EST").is_err());
    }

    #[test]
    fn offsets_outside_fourteen_hours_are_rejected() {
        assert_eq!(parse_offset("+14:00").unwrap(), 840);
        assert_eq!(parse_offset("-840").unwrap(), -840);
        assert!(parse_offset("+15:00").is_err());
        assert!(parse_offset("-14:01").is_err());
        assert!(parse_offset("900").is_err());
        assert!(parse_offset("99999999:00").is_err());
        assert!(parse_offset("-99999999:59").is_err());
        assert!(parse_offset("-2147483648").is_err());
        assert!(parse_offset("--05:00").is_err());
    }

    #[test]
    fn offsets_format() {
        assert_eq!(format_offset(-300), "-05:00");
        assert_eq!(format_offset(330), "+05:30");
        assert_eq!(format_offset(0), "+00:00");
    }

    #[test]
    fn durations_format() {
        assert_eq!(format_uptime(59), "0m");
        assert_eq!(format_uptime(3_660), "1h 1m");
        assert_eq!(format_uptime(90_061), "1d 1h 1m");
        assert_eq!(format_remaining(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_remaining(Duration::from_secs(42)), "42s");
    }
}
