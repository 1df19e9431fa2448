//! Output formatting and status lines

use crate::commands::{ConfigFormat, ReportFormat};
use crate::error::CliResult;
use console::{style, Term};
use covdiff::{AgentConfig, CoverageReport};

/// Status printer; writes to stderr so stdout stays machine-readable
#[derive(Debug)]
pub struct StatusPrinter {
    term: Term,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for StatusPrinter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl StatusPrinter {
    /// Create a new printer
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            use_color,
            quiet,
        }
    }

    /// Report a successful step
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        let mark = if self.use_color {
            style("✓").green().to_string()
        } else {
            "ok".to_string()
        };
        let _ = self.term.write_line(&format!("{mark} {message}"));
    }

    /// Print an informational line
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        let line = if self.use_color {
            style(message).dim().to_string()
        } else {
            message.to_string()
        };
        let _ = self.term.write_line(&line);
    }

    /// Print an error line; shown even in quiet mode
    pub fn error(&self, message: &str) {
        let label = if self.use_color {
            style("error:").red().bold().to_string()
        } else {
            "error:".to_string()
        };
        let _ = self.term.write_line(&format!("{label} {message}"));
    }
}

/// Render one report for stdout
pub fn render_report(report: &CoverageReport, format: ReportFormat) -> CliResult<String> {
    Ok(match format {
        ReportFormat::Json => serde_json::to_string(report)?,
        ReportFormat::Yaml => format!("---\n{}", serde_yaml_ng::to_string(report)?),
    })
}

/// Render the agent configuration
pub fn render_config(config: &AgentConfig, format: ConfigFormat) -> CliResult<String> {
    Ok(match format {
        ConfigFormat::Yaml => serde_yaml_ng::to_string(config)?,
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
    })
}
