//! Snapshot Stabilizer
//!
//! Re-samples the recorder until two consecutive samples agree or the wait
//! budget runs out, so that instrumentation still landing from just-finished
//! work is included in the end-of-test snapshot.

use super::{ExecutionRecorder, RecorderBusy, Snapshot};
use crate::config::AgentConfig;
use std::time::{Duration, Instant};

/// Bounded re-sampling of an [`ExecutionRecorder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stabilizer {
    interval: Duration,
    max_wait: Duration,
}

impl Stabilizer {
    /// Create a stabilizer with an explicit interval and budget
    #[must_use]
    pub const fn new(interval: Duration, max_wait: Duration) -> Self {
        Self { interval, max_wait }
    }

    /// Create a stabilizer from agent configuration
    #[must_use]
    pub const fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.stabilize_interval(), config.stabilize_wait())
    }

    /// Pause between samples
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Maximum time spent re-sampling
    #[must_use]
    pub const fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Take a snapshot that stayed unchanged across one interval
    ///
    /// Returns the latest sample once two consecutive samples are equal or
    /// the budget has elapsed since the first sample.
    pub async fn snapshot(&self, recorder: &dyn ExecutionRecorder) -> Snapshot {
        let started = Instant::now();
        let mut previous = Self::sample(recorder).await;
        let mut rounds = 0_u32;
        loop {
            tokio::time::sleep(self.interval).await;
            let next = Self::sample(recorder).await;
            rounds += 1;
            if next == previous {
                tracing::debug!(rounds, lines = next.len(), "snapshot stable");
                return next;
            }
            if started.elapsed() >= self.max_wait {
                tracing::debug!(
                    rounds,
                    lines = next.len(),
                    budget_ms = self.max_wait.as_millis() as u64,
                    "snapshot still moving, budget exhausted"
                );
                return next;
            }
            previous = next;
        }
    }

    /// One consistent copy; transient conflicts are retried in place
    pub async fn sample(recorder: &dyn ExecutionRecorder) -> Snapshot {
        loop {
            match recorder.try_counts() {
                Ok(snapshot) => return snapshot,
                Err(RecorderBusy) => tokio::task::yield_now().await,
            }
        }
    }
}

impl Default for Stabilizer {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}
