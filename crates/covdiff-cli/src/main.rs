//! covdiff CLI: orchestrator side of the per-test coverage agent
//!
//! ## Usage
//!
//! ```bash
//! covdiff collect --format json &    # receive reports
//! covdiff start "tests/test_api.py::test_login"
//! # ... drive the application ...
//! covdiff end "tests/test_api.py::test_login"
//! covdiff config                      # show resolved agent settings
//! ```

use clap::Parser;
use covdiff_cli::{Cli, ColorChoice, StatusPrinter};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match covdiff_cli::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let use_color = ColorChoice::from(cli.color).should_color();
            StatusPrinter::new(use_color, false).error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
