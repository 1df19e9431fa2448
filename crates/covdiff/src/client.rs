//! Orchestrator-side helpers
//!
//! [`ControlClient`] sends `START`/`END` lines and waits for the agent's
//! `ACK`; [`ReportListener`] owns the data socket and decodes the reports the
//! agent pushes to it.

use crate::coverage::CoverageReport;
use crate::protocol::{Command, ACK};
use crate::result::{AgentError, AgentResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

/// Default wait for the agent's acknowledgement
///
/// An `END` is acknowledged only after quiescence, stabilization and
/// delivery, so this is well above the agent's own budgets.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the agent's control socket
#[derive(Debug, Clone)]
pub struct ControlClient {
    path: PathBuf,
    timeout: Duration,
}

impl ControlClient {
    /// Create a client for the control socket at `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: DEFAULT_ACK_TIMEOUT,
        }
    }

    /// Bound the whole request, acknowledgement included
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Control socket path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Announce the start of a test
    pub async fn start(&self, id: &str) -> AgentResult<()> {
        self.send(&Command::Start(id.to_string())).await
    }

    /// Announce the end of a test
    pub async fn end(&self, id: &str) -> AgentResult<()> {
        self.send(&Command::End(id.to_string())).await
    }

    /// Send one command and wait for `ACK`
    pub async fn send(&self, command: &Command) -> AgentResult<()> {
        tokio::time::timeout(self.timeout, self.exchange(command))
            .await
            .map_err(|_| AgentError::timeout(self.timeout))?
    }

    async fn exchange(&self, command: &Command) -> AgentResult<()> {
        let mut stream = UnixStream::connect(&self.path).await?;
        stream.write_all(command.to_line().as_bytes()).await?;

        let mut reply = String::new();
        let _ = stream.read_to_string(&mut reply).await?;
        if reply.trim_end() == ACK {
            tracing::debug!(command = %command, "agent acknowledged");
            Ok(())
        } else {
            Err(AgentError::protocol(format!(
                "expected {ACK} for {command}, got {reply:?}"
            )))
        }
    }
}

/// Listener for the data socket
///
/// The socket file is removed again when the listener is dropped.
#[derive(Debug)]
pub struct ReportListener {
    listener: UnixListener,
    path: PathBuf,
}

impl ReportListener {
    /// Bind the data socket, replacing a stale socket file
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(path: impl Into<PathBuf>) -> AgentResult<Self> {
        let path = path.into();
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| AgentError::bind(&path, e))?;
        }
        let listener = UnixListener::bind(&path).map_err(|e| AgentError::bind(&path, e))?;
        Ok(Self { listener, path })
    }

    /// Data socket path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next report
    ///
    /// Each report arrives on its own connection and ends at EOF.
    pub async fn next_report(&self) -> AgentResult<CoverageReport> {
        let (mut stream, _addr) = self.listener.accept().await?;
        let mut payload = Vec::new();
        let _ = stream.read_to_end(&mut payload).await?;
        let report = CoverageReport::from_json_slice(&payload)?;
        tracing::debug!(
            test_id = %report.id,
            files = report.file_count(),
            bytes = payload.len(),
            "received coverage report"
        );
        Ok(report)
    }

    /// Wait for the next report, giving up after `timeout`
    pub async fn next_report_within(&self, timeout: Duration) -> AgentResult<CoverageReport> {
        tokio::time::timeout(timeout, self.next_report())
            .await
            .map_err(|_| AgentError::timeout(timeout))?
    }
}

impl Drop for ReportListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
