//! covdiff CLI Library
//!
//! Orchestrator-side commands for the covdiff agent: bracket a test with
//! `start`/`end`, receive reports with `collect`, inspect the resolved agent
//! configuration with `config`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod config;
mod error;
pub mod handlers;
mod output;

pub use commands::{
    Cli, CollectArgs, ColorArg, Commands, ConfigArgs, ConfigFormat, ControlArgs, ReportFormat,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{render_config, render_report, StatusPrinter};

/// Dispatch a parsed command line
pub fn run(cli: &Cli) -> CliResult<()> {
    let config = CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(cli.color.into());
    let _ = covdiff::logging::init(
        config.verbosity.log_filter(),
        covdiff::logging::LogFormat::Text,
    );
    let printer = StatusPrinter::new(
        config.color.should_color(),
        config.verbosity.is_quiet(),
    );

    match &cli.command {
        Commands::Start(args) => handlers::execute_start(&printer, args),
        Commands::End(args) => handlers::execute_end(&printer, args),
        Commands::Collect(args) => handlers::execute_collect(&printer, args),
        Commands::Config(args) => handlers::execute_config(args),
    }
}
