use thiserror::Error;

/// Top-level error type for the `espgrow-api` crate.
///
/// Covers every failure mode of the wire layer: the WebSocket channel,
/// frame and telemetry decoding, and the HTTP backup side-channel.
/// `espgrow-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection could not be established.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// Error on an established WebSocket (read or write side).
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The channel task is gone and can no longer carry frames.
    #[error("Channel closed")]
    ChannelClosed,

    // ── Frames ──────────────────────────────────────────────────────
    /// Inbound frame was not valid JSON or lacked a string `type`.
    #[error("Frame parse error: {message}")]
    Parse { message: String },

    /// Outbound payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary telemetry payload could not be decoded.
    #[error("Telemetry decode error: {0}")]
    Telemetry(String),

    // ── HTTP ────────────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success status from the controller's HTTP API.
    #[error("HTTP API error (status {status}): {message}")]
    Http { status: u16, message: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::WebSocketConnect(_) | Self::WebSocket(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if the error came from a malformed inbound payload.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::Telemetry(_))
    }
}
