//! Command handlers - extracted from main.rs for testability
//!
//! Each handler module contains:
//! - The execution logic for a CLI command
//! - Pure helper functions
//! - Tests

pub mod collect;
pub mod config;
pub mod control;

pub use collect::{collect_reports, execute_collect};
pub use config::execute_config;
pub use control::{execute_end, execute_start, validate_test_id};

use crate::error::{CliError, CliResult};

/// Single-threaded runtime for one command
pub(crate) fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::config(format!("Failed to create runtime: {e}")))
}
