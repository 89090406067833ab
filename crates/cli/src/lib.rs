pub mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::CommandResult;

/// Operator tooling for the BookWorm chat service.
#[derive(Debug, Parser)]
#[command(
    name = "bookworm",
    version,
    about = "BookWorm operator CLI",
    after_help = "Examples:\n  bookworm migrate\n  bookworm config\n  bookworm doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create or upgrade the order schema
    Migrate,
    /// Show effective settings, where each came from, with secrets masked
    Config,
    /// Check configuration, oracle settings and database readiness
    Doctor {
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Command {
    fn execute(self) -> CommandResult {
        match self {
            Self::Migrate => commands::migrate::run(),
            Self::Config => CommandResult::plain(commands::config::run()),
            Self::Doctor { json } => commands::doctor::run(json),
        }
    }
}

pub fn run() -> ExitCode {
    let CommandResult { exit_code, output } = Cli::parse().command.execute();
    println!("{output}");
    ExitCode::from(exit_code)
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{Cli, Command};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn doctor_accepts_json_flag() {
        let cli = Cli::try_parse_from(["bookworm", "doctor", "--json"]).expect("parses");
        assert!(matches!(cli.command, Command::Doctor { json: true }));
    }
}
