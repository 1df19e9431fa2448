//! `collect` command handler

use super::runtime;
use crate::commands::CollectArgs;
use crate::error::{CliError, CliResult};
use crate::output::{render_report, StatusPrinter};
use covdiff::{AgentError, CoverageReport, ReportListener};
use std::io::Write;
use std::time::Duration;

/// Execute the collect command
///
/// Binds the data socket and prints every report to stdout until `--count`
/// reports arrived or `--idle-timeout-ms` passed without one.
pub fn execute_collect(printer: &StatusPrinter, args: &CollectArgs) -> CliResult<()> {
    if args.count == Some(0) {
        return Err(CliError::invalid_argument("--count must be at least 1"));
    }
    let format = args.format;
    runtime()?.block_on(async {
        let listener = ReportListener::bind(&args.socket)?;
        printer.info(&format!(
            "listening for reports on {}",
            listener.path().display()
        ));
        let mut stdout = std::io::stdout().lock();
        let received = collect_reports(&listener, args, |report| {
            writeln!(stdout, "{}", render_report(report, format)?)?;
            stdout.flush()?;
            Ok(())
        })
        .await?;
        printer.success(&format!("collected {received} report(s)"));
        Ok::<(), CliError>(())
    })
}

/// Feed reports from `listener` to `on_report`; returns how many arrived
///
/// An idle timeout ends collection normally. Undecodable payloads are
/// reported and skipped.
pub async fn collect_reports<F>(
    listener: &ReportListener,
    args: &CollectArgs,
    mut on_report: F,
) -> CliResult<usize>
where
    F: FnMut(&CoverageReport) -> CliResult<()>,
{
    let idle = args.idle_timeout_ms.map(Duration::from_millis);
    let mut received = 0;
    while args.count.map_or(true, |count| received < count) {
        let next = match idle {
            Some(timeout) => listener.next_report_within(timeout).await,
            None => listener.next_report().await,
        };
        match next {
            Ok(report) => {
                on_report(&report)?;
                received += 1;
            }
            Err(AgentError::Timeout { ms }) => {
                tracing::info!(idle_ms = ms, received, "no report before idle timeout");
                break;
            }
            Err(AgentError::Json(err)) => {
                tracing::warn!(error = %err, "skipping undecodable report");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(received)
}
