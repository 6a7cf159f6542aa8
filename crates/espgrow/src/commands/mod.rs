//! Command dispatch: bridges CLI args -> store operations -> output formatting.

pub mod backup;
pub mod config_cmd;
pub mod devices;
pub mod ppfd;
pub mod rules;
pub mod sensors;
pub mod status;
pub mod system;
pub mod timezone;
pub mod util;
pub mod watch;

use espgrow_core::Controller;

use crate::cli::Command;
use crate::config::Session;
use crate::error::CliError;

/// Dispatch a controller-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    controller: &Controller,
    session: &Session,
) -> Result<(), CliError> {
    match cmd {
        Command::Status => status::handle(controller, session).await,
        Command::Watch(args) => watch::handle(controller, args, session).await,
        Command::Devices(args) => devices::handle(controller, args, session).await,
        Command::Sensors(args) => sensors::handle(controller, args, session).await,
        Command::Rules(args) => rules::handle(controller, args, session).await,
        Command::System(args) => system::handle(controller, args, session).await,
        Command::Ppfd(args) => ppfd::handle(controller, args, session).await,
        Command::Timezone(args) => timezone::handle(controller, args, session).await,
        Command::Backup { file } => backup::backup(controller, &file, session).await,
        Command::Restore { file } => backup::restore(controller, &file, session).await,
        // Config and Completions never reach dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
