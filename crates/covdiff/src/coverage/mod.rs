//! Line Coverage Primitives
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  COVDIFF COVERAGE PIPELINE                                       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  LineRecorder → Stabilizer → diff(after, baseline) → Report     │
//! │   (all threads)   (re-sample)        ↓                          │
//! │                               PathClassifier                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod diff;
mod recorder;
mod report;
mod stabilizer;

pub use diff::{build_report, diff};
pub use recorder::{ExecutionRecorder, LineKey, LineRecorder, RecorderBusy, Snapshot};
pub use report::CoverageReport;
pub use stabilizer::Stabilizer;
