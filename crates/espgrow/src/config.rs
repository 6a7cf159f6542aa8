//! CLI configuration: thin wrapper around `espgrow_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (`--controller`, `--utc-offset`, `--timeout`).

use std::time::Duration;

use espgrow_core::ControllerConfig;

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;

pub use espgrow_config::{
    Config, Profile, config_path, controller_url, load_config_or_default, save_config,
};

/// Settings a command handler needs besides the controller itself.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub output: OutputFormat,
    pub color: bool,
    pub quiet: bool,
    pub yes: bool,
    pub timeout: Duration,
}

impl Session {
    pub fn resolve(global: &GlobalOpts, cfg: &Config) -> Self {
        let output = global.output.unwrap_or_else(|| match cfg.defaults.output.as_str() {
            "json" => OutputFormat::Json,
            "json-compact" => OutputFormat::JsonCompact,
            "yaml" => OutputFormat::Yaml,
            "plain" => OutputFormat::Plain,
            _ => OutputFormat::Table,
        });
        let color = global.color.unwrap_or(match cfg.defaults.color.as_str() {
            "always" => ColorMode::Always,
            "never" => ColorMode::Never,
            _ => ColorMode::Auto,
        });

        Self {
            output,
            color: crate::output::should_color(color),
            quiet: global.quiet,
            yes: global.yes,
            timeout: Duration::from_secs(global.timeout.unwrap_or(cfg.defaults.timeout)),
        }
    }
}

/// Build a `ControllerConfig` from the config file, profile, and CLI
/// overrides. Flags beat environment beats profile beats defaults.
pub fn build_controller_config(
    global: &GlobalOpts,
    cfg: &Config,
) -> Result<ControllerConfig, CliError> {
    let selected = match cfg.profile(global.profile.as_deref()) {
        Ok((_, profile)) => Some(profile.clone()),
        Err(espgrow_config::ConfigError::UnknownProfile { name }) => {
            return Err(CliError::ProfileNotFound {
                name,
                available: available_profiles(cfg),
            });
        }
        Err(_) => None,
    };

    let mut profile = match (selected, global.controller.as_deref()) {
        (Some(profile), _) => profile,
        (None, Some(_)) => Profile::default(),
        (None, None) => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    if let Some(controller) = &global.controller {
        profile.controller.clone_from(controller);
    }
    if global.utc_offset.is_some() {
        profile.utc_offset_minutes = global.utc_offset;
    }
    if global.timeout.is_some() {
        profile.timeout = global.timeout;
    }

    Ok(espgrow_config::profile_to_controller_config(
        &profile,
        &cfg.defaults,
    )?)
}

fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        return "(none)".into();
    }
    cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
}
