// ── Core error types ──
//
// User-facing errors from espgrow-core. Consumers never see raw socket
// errors or JSON parse failures; the `From<espgrow_api::Error>` impl
// translates wire-layer errors into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to controller at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Controller disconnected")]
    ControllerDisconnected,

    #[error("Timed out after {timeout_secs}s waiting for {what}")]
    Timeout { what: String, timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("Sensor not found: {identifier}")]
    SensorNotFound { identifier: String },

    #[error("Rule not found: {identifier}")]
    RuleNotFound { identifier: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Operation rejected by controller: {message}")]
    Rejected { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<espgrow_api::Error> for CoreError {
    fn from(err: espgrow_api::Error) -> Self {
        match err {
            espgrow_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            espgrow_api::Error::WebSocket(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason,
            },
            espgrow_api::Error::ChannelClosed => CoreError::ControllerDisconnected,
            espgrow_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout {
                        what: "controller HTTP response".into(),
                        timeout_secs: 0,
                    }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            espgrow_api::Error::Http { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            espgrow_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            espgrow_api::Error::Parse { message } => {
                CoreError::Internal(format!("Frame parse error: {message}"))
            }
            espgrow_api::Error::Serialization(e) => {
                CoreError::Internal(format!("Serialization error: {e}"))
            }
            espgrow_api::Error::Telemetry(message) => {
                CoreError::Internal(format!("Telemetry decode error: {message}"))
            }
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Internal(format!("Serialization error: {err}"))
    }
}
