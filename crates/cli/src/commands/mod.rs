pub mod config;
pub mod doctor;
pub mod migrate;

use std::future::Future;

use bookworm_core::config::{AppConfig, LoadOptions};
use serde::Serialize;

/// What a subcommand hands back to `main`: the text to print and the exit code.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

/// A classified failure. `class` is a stable machine-readable tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub class: &'static str,
    pub message: String,
    pub exit_code: u8,
}

impl CommandFailure {
    pub fn new(class: &'static str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { class, message: message.into(), exit_code }
    }
}

#[derive(Serialize)]
struct StatusLine<'a> {
    command: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<&'a str>,
    message: &'a str,
}

impl CommandResult {
    pub fn plain(output: String) -> Self {
        Self { exit_code: 0, output }
    }

    /// Renders a one-line JSON status for `command`.
    pub fn status(command: &str, outcome: Result<String, CommandFailure>) -> Self {
        let (exit_code, line) = match &outcome {
            Ok(message) => {
                (0, StatusLine { command, status: "ok", error_class: None, message })
            }
            Err(failure) => (
                failure.exit_code,
                StatusLine {
                    command,
                    status: "error",
                    error_class: Some(failure.class),
                    message: &failure.message,
                },
            ),
        };

        let output = serde_json::to_string(&line)
            .unwrap_or_else(|error| serde_json::json!({ "status": "error", "message": error.to_string() }).to_string());
        Self { exit_code, output }
    }
}

pub(crate) fn load_config() -> Result<AppConfig, CommandFailure> {
    AppConfig::load(LoadOptions::default())
        .map_err(|error| CommandFailure::new("config_validation", format!("configuration issue: {error}"), 2))
}

/// Drives `work` on a throwaway current-thread runtime.
pub(crate) fn block_on<T, F>(work: F) -> Result<T, CommandFailure>
where
    F: Future<Output = Result<T, CommandFailure>>,
{
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| {
            CommandFailure::new("runtime_init", format!("failed to initialize async runtime: {error}"), 3)
        })?
        .block_on(work)
}
