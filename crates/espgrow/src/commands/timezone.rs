//! Controller clock offset.

use espgrow_core::{ControllerSettings, Controller};

use crate::cli::{TimezoneArgs, TimezoneCommand};
use crate::config::Session;
use crate::error::CliError;
use crate::output;

use super::util;

fn render(settings: &ControllerSettings, session: &Session) -> Result<(), CliError> {
    let out = output::render_single(
        session.output,
        settings,
        |s| format!("UTC{}", util::format_offset(s.timezone_offset_minutes)),
        |s| s.timezone_offset_minutes.to_string(),
    )?;
    output::print_output(&out, session.quiet);
    Ok(())
}

pub async fn handle(
    controller: &Controller,
    args: TimezoneArgs,
    session: &Session,
) -> Result<(), CliError> {
    util::connect(controller, session).await?;
    let store = controller.settings();

    match args.command {
        TimezoneCommand::Get => {
            util::synced(session.timeout, "settings", store.wait_synced()).await?;
            let settings = store.settings().unwrap_or_default();
            render(&settings, session)
        }
        TimezoneCommand::Set { offset } => {
            let minutes = util::parse_offset(&offset)?;
            let mut rx = store.watch_settings();
            store.set_timezone(minutes)?;
            let settings = util::within(session.timeout, "settings update", async {
                rx.wait_for(|s| s.is_some_and(|s| s.timezone_offset_minutes == minutes))
                    .await
                    .map(|s| s.unwrap_or_default())
                    .map_err(|_| CliError::Disconnected)
            })
            .await?;
            output::notice(
                &format!("Controller offset set to UTC{}", util::format_offset(minutes)),
                session.quiet,
            );
            render(&settings, session)
        }
    }
}
