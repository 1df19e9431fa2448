//! Diagnostic logging setup
//!
//! The agent lives inside someone else's process, so logs go to stderr and
//! installing the subscriber never fails hard: if the host already installed
//! one, the host's wins.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Output format for agent logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Parse a filter directive, falling back to `info` when it is invalid
#[must_use]
pub fn filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|err| {
        eprintln!("covdiff: invalid log filter {directive:?}: {err}");
        EnvFilter::new(crate::config::DEFAULT_LOG_FILTER)
    })
}

/// Install a global subscriber writing to stderr
///
/// Returns `false` when another subscriber was already installed.
pub fn init(directive: &str, format: LogFormat) -> bool {
    let registry = tracing_subscriber::registry().with(filter(directive));
    let installed = match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_falls_back() {
        let parsed = filter("covdiff=loud");
        assert!(parsed.to_string().contains("info"));
    }

    #[test]
    fn test_second_init_is_harmless() {
        let _ = init("debug", LogFormat::Text);
        assert!(!init("debug", LogFormat::Json));
    }
}
