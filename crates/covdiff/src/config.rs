//! Agent configuration
//!
//! Read once at startup, either from the process environment
//! ([`AgentConfig::from_env`]) or built explicitly by an embedding host or a
//! test ([`AgentConfig::builder`]).

use crate::result::{AgentError, AgentResult};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default control socket path
pub const DEFAULT_CONTROL_SOCKET: &str = "/tmp/coverage_control.sock";

/// Default data socket path
pub const DEFAULT_DATA_SOCKET: &str = "/tmp/coverage_data.sock";

/// Default stabilizer budget (500ms)
pub const DEFAULT_STABILIZE_WAIT_MS: u64 = 500;

/// Default stabilizer sampling interval (70ms)
pub const DEFAULT_STABILIZE_INTERVAL_MS: u64 = 70;

/// Default thread quiescence timeout (1s)
pub const DEFAULT_QUIESCE_WAIT_MS: u64 = 1_000;

/// Default thread quiescence polling interval (20ms)
pub const DEFAULT_QUIESCE_INTERVAL_MS: u64 = 20;

/// Default pause between quiescence and the first sample (20ms)
pub const DEFAULT_SETTLE_MS: u64 = 20;

/// Directory components that mark third-party package trees
pub const DEFAULT_THIRD_PARTY_MARKERS: &[&str] = &["site-packages", "dist-packages"];

/// Default log filter directive
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Environment variable names
pub mod env {
    /// Application source root
    pub const APP_SOURCE_DIR: &str = "COVDIFF_APP_SOURCE_DIR";
    /// Control socket path
    pub const CONTROL_SOCKET: &str = "COVDIFF_CONTROL_SOCKET";
    /// Data socket path
    pub const DATA_SOCKET: &str = "COVDIFF_DATA_SOCKET";
    /// Stabilizer budget in milliseconds
    pub const STABILIZE_WAIT_MS: &str = "COVDIFF_STABILIZE_WAIT_MS";
    /// Stabilizer interval in milliseconds
    pub const STABILIZE_INTERVAL_MS: &str = "COVDIFF_STABILIZE_INTERVAL_MS";
    /// Quiescence timeout in milliseconds
    pub const QUIESCE_WAIT_MS: &str = "COVDIFF_QUIESCE_WAIT_MS";
    /// Quiescence interval in milliseconds
    pub const QUIESCE_INTERVAL_MS: &str = "COVDIFF_QUIESCE_INTERVAL_MS";
    /// Settle delay in milliseconds
    pub const SETTLE_MS: &str = "COVDIFF_SETTLE_MS";
    /// Agent installation directory
    pub const AGENT_DIR: &str = "COVDIFF_AGENT_DIR";
    /// Standard library roots (path list)
    pub const STDLIB_DIRS: &str = "COVDIFF_STDLIB_DIRS";
    /// Third-party roots (path list)
    pub const THIRD_PARTY_DIRS: &str = "COVDIFF_THIRD_PARTY_DIRS";
    /// Third-party directory markers (comma separated)
    pub const THIRD_PARTY_MARKERS: &str = "COVDIFF_THIRD_PARTY_MARKERS";
    /// YAML report log file
    pub const REPORT_LOG: &str = "COVDIFF_REPORT_LOG";
    /// Tracing filter directive
    pub const LOG: &str = "COVDIFF_LOG";
}

// =============================================================================
// AGENT CONFIG
// =============================================================================

/// Resolved agent configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Root directory of the application under test
    pub app_root: PathBuf,
    /// Control channel socket path
    pub control_socket: PathBuf,
    /// Data channel socket path
    pub data_socket: PathBuf,
    /// Maximum time the stabilizer keeps re-sampling
    pub stabilize_wait_ms: u64,
    /// Pause between two stabilizer samples
    pub stabilize_interval_ms: u64,
    /// Maximum time to wait for session threads to exit
    pub quiesce_wait_ms: u64,
    /// Pause between two thread-set polls
    pub quiesce_interval_ms: u64,
    /// Pause between quiescence and the first stabilizer sample
    pub settle_ms: u64,
    /// The agent's own installation directory, excluded from reports
    pub agent_dir: Option<PathBuf>,
    /// Standard library roots, excluded from reports
    pub stdlib_dirs: Vec<PathBuf>,
    /// Third-party package roots, excluded from reports
    pub third_party_dirs: Vec<PathBuf>,
    /// Path components that mark a third-party package tree
    pub third_party_markers: Vec<String>,
    /// Optional YAML file every report is appended to
    pub report_log: Option<PathBuf>,
    /// Tracing filter directive
    pub log_filter: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            app_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            control_socket: PathBuf::from(DEFAULT_CONTROL_SOCKET),
            data_socket: PathBuf::from(DEFAULT_DATA_SOCKET),
            stabilize_wait_ms: DEFAULT_STABILIZE_WAIT_MS,
            stabilize_interval_ms: DEFAULT_STABILIZE_INTERVAL_MS,
            quiesce_wait_ms: DEFAULT_QUIESCE_WAIT_MS,
            quiesce_interval_ms: DEFAULT_QUIESCE_INTERVAL_MS,
            settle_ms: DEFAULT_SETTLE_MS,
            agent_dir: None,
            stdlib_dirs: Vec::new(),
            third_party_dirs: Vec::new(),
            third_party_markers: DEFAULT_THIRD_PARTY_MARKERS
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
            report_log: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl AgentConfig {
    /// Create a builder for agent config
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Load configuration from the process environment
    pub fn from_env() -> AgentResult<Self> {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// Unset variables fall back to defaults; set but unparsable numeric
    /// values are errors.
    pub fn from_lookup<F>(lookup: F) -> AgentResult<Self>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let mut config = Self::default();

        if let Some(root) = non_empty(lookup(env::APP_SOURCE_DIR)) {
            config.app_root = PathBuf::from(root);
        }
        if let Some(path) = non_empty(lookup(env::CONTROL_SOCKET)) {
            config.control_socket = PathBuf::from(path);
        }
        if let Some(path) = non_empty(lookup(env::DATA_SOCKET)) {
            config.data_socket = PathBuf::from(path);
        }

        config.stabilize_wait_ms =
            parse_millis(env::STABILIZE_WAIT_MS, lookup(env::STABILIZE_WAIT_MS))?
                .unwrap_or(config.stabilize_wait_ms);
        config.stabilize_interval_ms = parse_millis(
            env::STABILIZE_INTERVAL_MS,
            lookup(env::STABILIZE_INTERVAL_MS),
        )?
        .unwrap_or(config.stabilize_interval_ms);
        config.quiesce_wait_ms = parse_millis(env::QUIESCE_WAIT_MS, lookup(env::QUIESCE_WAIT_MS))?
            .unwrap_or(config.quiesce_wait_ms);
        config.quiesce_interval_ms =
            parse_millis(env::QUIESCE_INTERVAL_MS, lookup(env::QUIESCE_INTERVAL_MS))?
                .unwrap_or(config.quiesce_interval_ms);
        config.settle_ms =
            parse_millis(env::SETTLE_MS, lookup(env::SETTLE_MS))?.unwrap_or(config.settle_ms);

        config.agent_dir = non_empty(lookup(env::AGENT_DIR)).map(PathBuf::from);
        if let Some(list) = non_empty(lookup(env::STDLIB_DIRS)) {
            config.stdlib_dirs = std::env::split_paths(&list).collect();
        }
        if let Some(list) = non_empty(lookup(env::THIRD_PARTY_DIRS)) {
            config.third_party_dirs = std::env::split_paths(&list).collect();
        }
        if let Some(markers) = lookup(env::THIRD_PARTY_MARKERS) {
            config.third_party_markers = markers
                .to_string_lossy()
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
        }
        config.report_log = non_empty(lookup(env::REPORT_LOG)).map(PathBuf::from);
        if let Some(filter) = non_empty(lookup(env::LOG)) {
            config.log_filter = filter.to_string_lossy().into_owned();
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would make the polling loops spin
    pub fn validate(&self) -> AgentResult<()> {
        if self.stabilize_interval_ms == 0 {
            return Err(AgentError::config(format!(
                "{} must be greater than zero",
                env::STABILIZE_INTERVAL_MS
            )));
        }
        if self.quiesce_interval_ms == 0 {
            return Err(AgentError::config(format!(
                "{} must be greater than zero",
                env::QUIESCE_INTERVAL_MS
            )));
        }
        if self.control_socket == self.data_socket {
            return Err(AgentError::config(
                "control and data sockets must use different paths",
            ));
        }
        Ok(())
    }

    /// Stabilizer budget as Duration
    #[must_use]
    pub const fn stabilize_wait(&self) -> Duration {
        Duration::from_millis(self.stabilize_wait_ms)
    }

    /// Stabilizer interval as Duration
    #[must_use]
    pub const fn stabilize_interval(&self) -> Duration {
        Duration::from_millis(self.stabilize_interval_ms)
    }

    /// Quiescence timeout as Duration
    #[must_use]
    pub const fn quiesce_wait(&self) -> Duration {
        Duration::from_millis(self.quiesce_wait_ms)
    }

    /// Quiescence interval as Duration
    #[must_use]
    pub const fn quiesce_interval(&self) -> Duration {
        Duration::from_millis(self.quiesce_interval_ms)
    }

    /// Settle delay as Duration
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

fn non_empty(value: Option<OsString>) -> Option<OsString> {
    value.filter(|v| !v.is_empty())
}

fn parse_millis(key: &str, value: Option<OsString>) -> AgentResult<Option<u64>> {
    let Some(raw) = non_empty(value) else {
        return Ok(None);
    };
    let text = raw.to_string_lossy();
    text.trim().parse::<u64>().map(Some).map_err(|_| {
        AgentError::config(format!(
            "{key} must be a non-negative integer (milliseconds), got {text:?}"
        ))
    })
}

// =============================================================================
// BUILDER
// =============================================================================

/// Builder for agent configuration
#[derive(Debug, Default)]
pub struct AgentConfigBuilder {
    config: AgentConfig,
}

impl AgentConfigBuilder {
    /// Set the application root
    #[must_use]
    pub fn app_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.app_root = root.into();
        self
    }

    /// Set the control socket path
    #[must_use]
    pub fn control_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.control_socket = path.into();
        self
    }

    /// Set the data socket path
    #[must_use]
    pub fn data_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_socket = path.into();
        self
    }

    /// Set the stabilizer budget and interval
    #[must_use]
    pub const fn stabilize(mut self, wait_ms: u64, interval_ms: u64) -> Self {
        self.config.stabilize_wait_ms = wait_ms;
        self.config.stabilize_interval_ms = interval_ms;
        self
    }

    /// Set the quiescence timeout and interval
    #[must_use]
    pub const fn quiesce(mut self, wait_ms: u64, interval_ms: u64) -> Self {
        self.config.quiesce_wait_ms = wait_ms;
        self.config.quiesce_interval_ms = interval_ms;
        self
    }

    /// Set the settle delay
    #[must_use]
    pub const fn settle_ms(mut self, ms: u64) -> Self {
        self.config.settle_ms = ms;
        self
    }

    /// Set the agent installation directory
    #[must_use]
    pub fn agent_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.agent_dir = Some(dir.into());
        self
    }

    /// Add a standard library root
    #[must_use]
    pub fn stdlib_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.stdlib_dirs.push(dir.into());
        self
    }

    /// Add a third-party package root
    #[must_use]
    pub fn third_party_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.third_party_dirs.push(dir.into());
        self
    }

    /// Replace the third-party directory markers
    #[must_use]
    pub fn third_party_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.third_party_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    /// Append every report to a YAML log file
    #[must_use]
    pub fn report_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.report_log = Some(path.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> AgentResult<AgentConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
