//! Shared configuration for espgrow front ends.
//!
//! TOML profiles merged with `ESPGROW_` environment variables, and
//! translation to `espgrow_core::ControllerConfig`. The core crate never
//! reads files; front ends load a profile here and hand the result in.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use espgrow_core::ControllerConfig;

/// Largest accepted schedule offset, minutes either side of UTC.
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("no controller configured (run `espgrow config init` or pass --controller)")]
    NoController,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults, overridable per profile.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named controller profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_toggle_timeout_ms")]
    pub toggle_timeout_ms: u64,

    #[serde(default = "default_max_queued")]
    pub max_queued_commands: usize,

    #[serde(default = "default_queued_ttl_secs")]
    pub queued_command_ttl_secs: u64,

    /// HTTP and one-shot wait timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            toggle_timeout_ms: default_toggle_timeout_ms(),
            max_queued_commands: default_max_queued(),
            queued_command_ttl_secs: default_queued_ttl_secs(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_reconnect_delay_ms() -> u64 {
    3_000
}
fn default_toggle_timeout_ms() -> u64 {
    5_000
}
fn default_max_queued() -> usize {
    256
}
fn default_queued_ttl_secs() -> u64 {
    60
}
fn default_timeout() -> u64 {
    10
}

/// A named controller profile.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// WebSocket URL (`ws://192.168.1.40/ws`) or bare host.
    pub controller: String,

    /// Offset for schedule rule times in minutes east of UTC. Absent
    /// means the host's local zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset_minutes: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_delay_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toggle_timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_queued_commands: Option<usize>,

    /// `0` keeps queued commands forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_command_ttl_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "espgrow", "espgrow").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("espgrow");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Nested keys use a double underscore: `ESPGROW_DEFAULTS__OUTPUT=json`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ESPGROW_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Profile resolution ──────────────────────────────────────────────

impl Config {
    /// Pick `name`, else the default profile, else the only profile.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        if let Some(name) = name {
            return self
                .profiles
                .get(name)
                .map(|p| (name.to_owned(), p))
                .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() });
        }

        if let Some(default) = self.default_profile.as_deref() {
            if let Some(p) = self.profiles.get(default) {
                return Ok((default.to_owned(), p));
            }
        }

        let mut iter = self.profiles.iter();
        match (iter.next(), iter.next()) {
            (Some((name, p)), None) => Ok((name.clone(), p)),
            _ => Err(ConfigError::NoController),
        }
    }
}

/// Normalize a controller address to a WebSocket URL.
///
/// `192.168.1.40` becomes `ws://192.168.1.40/ws`; `http(s)` schemes are
/// mapped to `ws(s)`; an explicit path is kept.
pub fn controller_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::Validation {
        field: "controller".into(),
        reason,
    };

    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ConfigError::NoController);
    }
    let with_scheme = if raw.contains("://") {
        raw.to_owned()
    } else {
        format!("ws://{raw}")
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| invalid(format!("{raw}: {e}")))?;
    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| invalid(format!("cannot use scheme '{scheme}'")))?;
    if url.path() == "/" || url.path().is_empty() {
        url.set_path("/ws");
    }
    Ok(url)
}

/// Build a `ControllerConfig` from a profile, falling back to `defaults`.
pub fn profile_to_controller_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<ControllerConfig, ConfigError> {
    let url = controller_url(&profile.controller)?;

    if let Some(offset) = profile.utc_offset_minutes {
        if !(-MAX_OFFSET_MINUTES..=MAX_OFFSET_MINUTES).contains(&offset) {
            return Err(ConfigError::Validation {
                field: "utc_offset_minutes".into(),
                reason: format!("{offset} is outside ±{MAX_OFFSET_MINUTES}"),
            });
        }
    }

    let max_queued = profile.max_queued_commands.unwrap_or(defaults.max_queued_commands);
    if max_queued == 0 {
        return Err(ConfigError::Validation {
            field: "max_queued_commands".into(),
            reason: "must be at least 1".into(),
        });
    }

    let ttl_secs = profile
        .queued_command_ttl_secs
        .unwrap_or(defaults.queued_command_ttl_secs);

    let mut config = ControllerConfig::new(url);
    config.reconnect_delay = Duration::from_millis(
        profile.reconnect_delay_ms.unwrap_or(defaults.reconnect_delay_ms),
    );
    config.toggle_timeout =
        Duration::from_millis(profile.toggle_timeout_ms.unwrap_or(defaults.toggle_timeout_ms));
    config.max_queued = max_queued;
    config.queued_ttl = (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs));
    config.utc_offset_minutes = profile.utc_offset_minutes;
    config.request_timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    Ok(config)
}
