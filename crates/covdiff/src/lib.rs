//! covdiff: per-test line coverage for a long-running application
//!
//! An agent embedded in the application under test. A test orchestrator
//! brackets each test with `START <id>` / `END <id>` on a control socket; at
//! `END` the agent waits for threads spawned during the test to finish, takes
//! a stable snapshot of the line counters, subtracts the snapshot taken at
//! `START`, keeps only application files and pushes the result as JSON to a
//! data socket.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    COVDIFF Architecture                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  orchestrator ──START/END──► ControlServer ──► SessionMachine    │
//! │       ▲                       (agent thread)        │            │
//! │       │                                             ▼            │
//! │  ReportListener ◄──JSON── SocketEmitter ◄── diff + classify     │
//! │                                                     ▲            │
//! │  app threads ──trace_line!──► LineRecorder ─────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! fn main() -> covdiff::AgentResult<()> {
//!     let _agent = covdiff::start_from_env()?;
//!     covdiff::trace_line!();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

#[cfg(not(unix))]
compile_error!("covdiff talks over Unix domain sockets and supports Unix targets only");

/// Path classification: application, library, agent or synthetic
pub mod classifier;
/// Orchestrator-side control client and data listener
pub mod client;
/// Agent configuration from builders or the environment
pub mod config;
/// Line counters, stabilization, diffing and the report type
pub mod coverage;
/// Report delivery
pub mod emitter;
/// Subscriber setup for diagnostic logs
pub mod logging;
/// Control line protocol
pub mod protocol;
mod result;
/// Control socket server and agent lifecycle
pub mod server;
/// Test session state machine
pub mod session;
/// Thread lifecycle tracking
pub mod threads;

pub use classifier::{Classification, PathClassifier};
pub use client::{ControlClient, ReportListener};
pub use config::{AgentConfig, AgentConfigBuilder};
pub use coverage::{
    build_report, diff, CoverageReport, ExecutionRecorder, LineKey, LineRecorder, RecorderBusy,
    Snapshot, Stabilizer,
};
pub use emitter::{ReportSink, SocketEmitter, YamlLogSink};
pub use protocol::{Command, ParseCommandError, ACK};
pub use result::{AgentError, AgentResult};
pub use server::{AgentHandle, ControlServer, CoverageAgent};
pub use session::{Outcome, SessionMachine, SessionPhase};
pub use threads::{ProcessThreads, QuiescenceWatcher, ThreadRegistry, ThreadTracker};

/// Start the agent configured from `COVDIFF_*` environment variables
///
/// Installs a stderr log subscriber (unless the host has one), then binds the
/// control socket on the agent's own thread. Keep the returned handle alive
/// for as long as coverage should be served.
pub fn start_from_env() -> AgentResult<AgentHandle> {
    let config = AgentConfig::from_env()?;
    let _ = logging::init(&config.log_filter, logging::LogFormat::Text);
    CoverageAgent::new(config).spawn()
}

/// Prelude for convenient imports
pub mod prelude {
    pub use super::client::*;
    pub use super::config::{AgentConfig, AgentConfigBuilder};
    pub use super::coverage::*;
    pub use super::emitter::*;
    pub use super::protocol::*;
    pub use super::result::*;
    pub use super::server::*;
    pub use super::session::*;
    pub use super::threads::*;
    pub use super::trace_line;
}
