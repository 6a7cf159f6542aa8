//! Config subcommand handlers.

use dialoguer::Input;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Profile, Session};
use crate::error::CliError;
use crate::output;

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn is_interactive() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stdin())
}

fn available(cfg: &config::Config) -> String {
    if cfg.profiles.is_empty() {
        "(none)".into()
    } else {
        cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts, session: &Session) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            let out = output::render_single(
                session.output,
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_default(),
                |c| c.default_profile.clone().unwrap_or_default(),
            )?;
            output::print_output(out.trim_end(), session.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), false);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            if cfg.profiles.is_empty() {
                output::notice("No profiles configured. Run: espgrow config init", session.quiet);
                return Ok(());
            }
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            let lines: Vec<String> = cfg
                .profiles
                .iter()
                .map(|(name, p)| {
                    let marker = if name == default { " *" } else { "" };
                    format!("{name}{marker}\t{}", p.controller)
                })
                .collect();
            output::print_output(&lines.join("\n"), session.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();
            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: available(&cfg),
                    name,
                });
            }
            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            output::notice(&format!("Default profile set to '{name}'"), session.quiet);
            Ok(())
        }

        ConfigCommand::Init { name, set_default } => {
            let mut cfg = config::load_config_or_default();
            let existing = cfg.profiles.get(&name).cloned().unwrap_or_default();

            let controller = match &global.controller {
                Some(c) => c.clone(),
                None if is_interactive() => {
                    let mut prompt = Input::<String>::new().with_prompt("Controller address");
                    if !existing.controller.is_empty() {
                        prompt = prompt.default(existing.controller.clone());
                    }
                    prompt.interact_text().map_err(prompt_err)?
                }
                None => {
                    return Err(CliError::NonInteractiveRequiresYes {
                        action: "config init without --controller".into(),
                    });
                }
            };
            // Reject garbage before it lands in the file.
            let url = config::controller_url(&controller)?;

            let utc_offset_minutes = global.utc_offset.or(existing.utc_offset_minutes);
            let profile = Profile {
                controller: url.to_string(),
                utc_offset_minutes,
                timeout: global.timeout.or(existing.timeout),
                ..existing
            };
            cfg.profiles.insert(name.clone(), profile);
            if set_default || cfg.default_profile.is_none() || cfg.profiles.len() == 1 {
                cfg.default_profile = Some(name.clone());
            }

            let path = config::save_config(&cfg)?;
            output::notice(
                &format!("Profile '{name}' written to {}", path.display()),
                session.quiet,
            );
            output::notice("Test it: espgrow status", session.quiet);
            Ok(())
        }
    }
}
