// ── Runtime connection configuration ──
//
// Describes *how* to talk to one controller. Never touches disk: the
// front end builds a `ControllerConfig` and hands it in.

use std::time::Duration;

use espgrow_api::ChannelConfig;
use url::Url;

use crate::error::CoreError;
use crate::schedule::ScheduleZone;

/// Configuration for connecting to a single controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// WebSocket endpoint, e.g. `ws://192.168.1.40/ws`.
    pub url: Url,
    /// Constant delay between a close and the next connect attempt.
    pub reconnect_delay: Duration,
    /// How long a toggle may stay pending without confirmation.
    pub toggle_timeout: Duration,
    /// Bound on commands queued while disconnected.
    pub max_queued: usize,
    /// Queued commands older than this are discarded on reconnect.
    pub queued_ttl: Option<Duration>,
    /// Offset used for schedule rule times, in minutes east of UTC.
    /// `None` uses the host's local zone.
    pub utc_offset_minutes: Option<i32>,
    /// Timeout for HTTP requests and one-shot waits.
    pub request_timeout: Duration,
}

impl ControllerConfig {
    /// Defaults for everything but the URL.
    pub fn new(url: Url) -> Self {
        let channel = ChannelConfig::default();
        Self {
            url,
            reconnect_delay: channel.reconnect_delay,
            toggle_timeout: Duration::from_secs(5),
            max_queued: channel.max_queued,
            queued_ttl: channel.queued_ttl,
            utc_offset_minutes: None,
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            reconnect_delay: self.reconnect_delay,
            max_queued: self.max_queued,
            queued_ttl: self.queued_ttl,
        }
    }

    /// Zone used to translate schedule rule times.
    pub fn schedule_zone(&self) -> Result<ScheduleZone, CoreError> {
        match self.utc_offset_minutes {
            None => Ok(ScheduleZone::Local),
            Some(minutes) => {
                ScheduleZone::from_offset_minutes(minutes).ok_or_else(|| CoreError::Config {
                    message: format!("UTC offset out of range: {minutes} minutes"),
                })
            }
        }
    }
}
