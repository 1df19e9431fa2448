//! `start` / `end` command handlers

use super::runtime;
use crate::commands::ControlArgs;
use crate::error::{CliError, CliResult};
use crate::output::StatusPrinter;
use covdiff::protocol::MAX_COMMAND_LEN;
use covdiff::{Command, ControlClient};
use std::time::Duration;

/// Execute the start command
pub fn execute_start(printer: &StatusPrinter, args: &ControlArgs) -> CliResult<()> {
    send(printer, &Command::Start(validate_test_id(&args.id)?), args)
}

/// Execute the end command
pub fn execute_end(printer: &StatusPrinter, args: &ControlArgs) -> CliResult<()> {
    send(printer, &Command::End(validate_test_id(&args.id)?), args)
}

/// Check that an id fits on one control line
pub fn validate_test_id(id: &str) -> CliResult<String> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(CliError::invalid_argument("test id must not be empty"));
    }
    if trimmed.contains(['\n', '\r']) {
        return Err(CliError::invalid_argument(
            "test id must not contain line breaks",
        ));
    }
    // "START " plus the trailing newline
    if trimmed.len() + 7 > MAX_COMMAND_LEN {
        return Err(CliError::invalid_argument(format!(
            "test id longer than {} bytes",
            MAX_COMMAND_LEN - 7
        )));
    }
    Ok(trimmed.to_string())
}

fn send(printer: &StatusPrinter, command: &Command, args: &ControlArgs) -> CliResult<()> {
    let client =
        ControlClient::new(&args.socket).with_timeout(Duration::from_millis(args.timeout_ms));
    tracing::debug!(command = %command, socket = %args.socket.display(), "sending control command");
    runtime()?.block_on(client.send(command))?;
    printer.success(&format!("{command} acknowledged"));
    Ok(())
}
