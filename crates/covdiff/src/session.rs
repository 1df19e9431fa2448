//! Session State Machine
//!
//! ```text
//!            START(id)                      END(id)
//!   IDLE ───────────────► ACTIVE(id) ──────────────────► IDLE
//!                           │  ▲        quiesce → settle →
//!      START(other) / END(other)        stabilize → diff → emit
//!            (rejected, logged)
//! ```
//!
//! Every transition runs under one async mutex, so concurrent control
//! connections are applied one at a time and the reset/diff sequence is
//! atomic with respect to them.

use crate::classifier::PathClassifier;
use crate::config::AgentConfig;
use crate::coverage::{build_report, CoverageReport, ExecutionRecorder, Snapshot, Stabilizer};
use crate::emitter::{emit_all, ReportSink, SocketEmitter, YamlLogSink};
use crate::protocol::Command;
use crate::threads::{QuiescenceWatcher, ThreadKey, ThreadRegistry};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Bookkeeping for the test whose window is open
#[derive(Debug)]
struct Session {
    id: String,
    baseline: Snapshot,
    baseline_threads: BTreeSet<ThreadKey>,
    started_at: Instant,
}

/// Observable state of the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// No test window open
    Idle,
    /// Window open for the given test id
    Active(String),
}

/// Result of applying one control line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A session was opened
    Started {
        /// Test id
        id: String,
    },
    /// A session was closed and its report handed to the sinks
    Completed {
        /// The emitted report
        report: CoverageReport,
        /// Number of sinks that accepted it
        delivered: usize,
        /// Whether all session threads exited before sampling
        quiesced: bool,
    },
    /// START while another session is active
    Rejected {
        /// Id of the active session
        active: String,
        /// Id that was requested
        requested: String,
    },
    /// END for an id other than the active one
    Mismatch {
        /// Id of the active session
        active: String,
        /// Id that was requested
        requested: String,
    },
    /// END with no active session
    Unexpected {
        /// Id that was requested
        requested: String,
    },
    /// Unparsable control line
    Malformed {
        /// Parser message
        reason: String,
    },
}

impl Outcome {
    /// Check whether a report was produced
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Serialized START/END coordinator
#[derive(Debug)]
pub struct SessionMachine {
    recorder: Arc<dyn ExecutionRecorder>,
    threads: Arc<dyn ThreadRegistry>,
    classifier: PathClassifier,
    stabilizer: Stabilizer,
    watcher: QuiescenceWatcher,
    settle: Duration,
    sinks: Vec<Box<dyn ReportSink>>,
    state: Mutex<Option<Session>>,
}

impl SessionMachine {
    /// Create a machine with the sinks described by `config`
    ///
    /// Reports go to the data socket and, when configured, the YAML log.
    #[must_use]
    pub fn new(
        config: &AgentConfig,
        recorder: Arc<dyn ExecutionRecorder>,
        threads: Arc<dyn ThreadRegistry>,
    ) -> Self {
        let mut sinks: Vec<Box<dyn ReportSink>> =
            vec![Box::new(SocketEmitter::new(&config.data_socket))];
        if let Some(log) = &config.report_log {
            sinks.push(Box::new(YamlLogSink::new(log)));
        }
        Self::with_sinks(config, recorder, threads, sinks)
    }

    /// Create a machine with explicit sinks
    #[must_use]
    pub fn with_sinks(
        config: &AgentConfig,
        recorder: Arc<dyn ExecutionRecorder>,
        threads: Arc<dyn ThreadRegistry>,
        sinks: Vec<Box<dyn ReportSink>>,
    ) -> Self {
        Self {
            recorder,
            threads,
            classifier: PathClassifier::from_config(config),
            stabilizer: Stabilizer::from_config(config),
            watcher: QuiescenceWatcher::from_config(config),
            settle: config.settle_delay(),
            sinks,
            state: Mutex::new(None),
        }
    }

    /// Current phase
    pub async fn phase(&self) -> SessionPhase {
        match self.state.lock().await.as_ref() {
            Some(session) => SessionPhase::Active(session.id.clone()),
            None => SessionPhase::Idle,
        }
    }

    /// Id of the active session, if any
    pub async fn active_session(&self) -> Option<String> {
        self.state.lock().await.as_ref().map(|s| s.id.clone())
    }

    /// Parse and apply one raw control line
    pub async fn handle_line(&self, line: &str) -> Outcome {
        match Command::parse(line) {
            Ok(command) => self.handle(command).await,
            Err(err) => {
                tracing::warn!(line = line.trim(), error = %err, "malformed control command");
                Outcome::Malformed {
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Apply one control command
    pub async fn handle(&self, command: Command) -> Outcome {
        match command {
            Command::Start(id) => self.start(id).await,
            Command::End(id) => self.end(id).await,
        }
    }

    async fn start(&self, id: String) -> Outcome {
        let mut state = self.state.lock().await;
        if let Some(active) = state.as_ref() {
            tracing::error!(
                active = %active.id,
                requested = %id,
                "START while a session is active; overlapping sessions are not supported"
            );
            return Outcome::Rejected {
                active: active.id.clone(),
                requested: id,
            };
        }

        self.recorder.reset();
        let baseline = Stabilizer::sample(self.recorder.as_ref()).await;
        let baseline_threads = self.threads.live_threads();
        tracing::info!(
            test_id = %id,
            baseline_lines = baseline.len(),
            baseline_threads = baseline_threads.len(),
            "START"
        );
        *state = Some(Session {
            id: id.clone(),
            baseline,
            baseline_threads,
            started_at: Instant::now(),
        });
        Outcome::Started { id }
    }

    async fn end(&self, id: String) -> Outcome {
        let mut state = self.state.lock().await;
        let session = match state.take() {
            None => {
                tracing::warn!(requested = %id, "END with no active session");
                return Outcome::Unexpected { requested: id };
            }
            Some(active) if active.id != id => {
                tracing::warn!(
                    active = %active.id,
                    requested = %id,
                    "END does not match the active session; ignoring"
                );
                let outcome = Outcome::Mismatch {
                    active: active.id.clone(),
                    requested: id,
                };
                *state = Some(active);
                return outcome;
            }
            Some(session) => session,
        };

        tracing::info!(test_id = %id, "END");
        let quiesced = self
            .watcher
            .wait(self.threads.as_ref(), &session.baseline_threads)
            .await;
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
        let after = self.stabilizer.snapshot(self.recorder.as_ref()).await;
        let report = build_report(&id, &after, &session.baseline, &self.classifier);
        let delivered = emit_all(&self.sinks, &report).await;

        tracing::info!(
            test_id = %id,
            files = report.file_count(),
            lines = report.line_count(),
            delivered,
            quiesced,
            window_ms = session.started_at.elapsed().as_millis() as u64,
            "session closed"
        );
        Outcome::Completed {
            report,
            delivered,
            quiesced,
        }
    }
}
