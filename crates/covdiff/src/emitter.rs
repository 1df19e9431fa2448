//! Data Emitter
//!
//! Delivers finished reports. The data channel gets one short-lived
//! connection per report, separate from the control socket so a large payload
//! never interleaves with control traffic.

use crate::coverage::CoverageReport;
use crate::result::{AgentError, AgentResult};
use async_trait::async_trait;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

/// Default bound on connecting and writing one report
pub const DEFAULT_EMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Destination for finished coverage reports
#[async_trait]
pub trait ReportSink: Send + Sync + fmt::Debug {
    /// Short name used in log lines
    fn name(&self) -> &'static str;

    /// Deliver one report; failures are not retried
    async fn emit(&self, report: &CoverageReport) -> AgentResult<()>;
}

// =============================================================================
// DATA SOCKET
// =============================================================================

/// Pushes compact JSON to the orchestrator's data socket
#[derive(Debug, Clone)]
pub struct SocketEmitter {
    path: PathBuf,
    timeout: Duration,
}

impl SocketEmitter {
    /// Create an emitter for a data socket path
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: DEFAULT_EMIT_TIMEOUT,
        }
    }

    /// Bound connect + write time
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Data socket path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn deliver(&self, payload: &[u8]) -> AgentResult<()> {
        let mut stream = UnixStream::connect(&self.path).await?;
        stream.write_all(payload).await?;
        stream.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl ReportSink for SocketEmitter {
    fn name(&self) -> &'static str {
        "data-socket"
    }

    async fn emit(&self, report: &CoverageReport) -> AgentResult<()> {
        let payload = report.to_json_bytes()?;
        tokio::time::timeout(self.timeout, self.deliver(&payload))
            .await
            .map_err(|_| AgentError::timeout(self.timeout))??;
        tracing::info!(
            test_id = %report.id,
            files = report.file_count(),
            lines = report.line_count(),
            bytes = payload.len(),
            socket = %self.path.display(),
            "sent coverage report"
        );
        Ok(())
    }
}

// =============================================================================
// YAML REPORT LOG
// =============================================================================

/// Appends every report to a YAML sequence on disk
///
/// The file holds `[{id, executedLinesByFile}, ...]` and is created on first
/// use. Each append writes the whole sequence to a sibling `.tmp` file and
/// renames it over the log. Plain blocking I/O: the agent thread owns it and
/// reports are written one at a time.
#[derive(Debug, Clone)]
pub struct YamlLogSink {
    path: PathBuf,
}

impl YamlLogSink {
    /// Create a sink appending to `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read every report logged so far
    pub fn read_all(&self) -> AgentResult<Vec<CoverageReport>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let reports: Option<Vec<CoverageReport>> = serde_yaml_ng::from_str(&text)?;
        Ok(reports.unwrap_or_default())
    }

    fn append(&self, report: &CoverageReport) -> AgentResult<()> {
        let mut reports = self.read_all()?;
        reports.push(report.clone());
        let text = serde_yaml_ng::to_string(&reports)?;
        // Readers see either the old log or the new one, never a partial write
        let staging = self.staging_path();
        std::fs::write(&staging, text)?;
        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ReportSink for YamlLogSink {
    fn name(&self) -> &'static str {
        "yaml-log"
    }

    async fn emit(&self, report: &CoverageReport) -> AgentResult<()> {
        self.append(report)?;
        tracing::debug!(test_id = %report.id, path = %self.path.display(), "appended report to log");
        Ok(())
    }
}

/// Deliver a report to every sink, logging failures
///
/// Returns how many sinks accepted the report.
pub async fn emit_all(sinks: &[Box<dyn ReportSink>], report: &CoverageReport) -> usize {
    let mut delivered = 0;
    for sink in sinks {
        match sink.emit(report).await {
            Ok(()) => delivered += 1,
            Err(err) => tracing::error!(
                test_id = %report.id,
                sink = sink.name(),
                error = %err,
                "failed to deliver coverage report"
            ),
        }
    }
    delivered
}
