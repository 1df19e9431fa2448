//! Thread Lifecycle Watcher
//!
//! Records which threads exist when a test starts and, at test end, waits
//! (bounded) until every thread created since then has exited. Best effort:
//! long-lived background threads only cost the timeout.

use crate::config::AgentConfig;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Opaque identifier of a live thread
pub type ThreadKey = u64;

/// Source of the set of currently live threads
pub trait ThreadRegistry: Send + Sync + fmt::Debug {
    /// Identifiers of every live thread
    fn live_threads(&self) -> BTreeSet<ThreadKey>;
}

// =============================================================================
// EXPLICIT TRACKER
// =============================================================================

#[derive(Debug, Default)]
struct TrackerInner {
    live: Mutex<BTreeSet<ThreadKey>>,
    next: AtomicU64,
}

/// Registry of threads that announce themselves
///
/// Threads started through [`ThreadTracker::spawn`] are registered before
/// they run and removed when their closure returns or unwinds. Threads
/// spawned elsewhere can call [`ThreadTracker::enter`].
#[derive(Debug, Clone, Default)]
pub struct ThreadTracker {
    inner: Arc<TrackerInner>,
}

/// Keeps one thread registered until dropped
#[derive(Debug)]
pub struct ThreadGuard {
    key: ThreadKey,
    inner: Arc<TrackerInner>,
}

impl ThreadGuard {
    /// Identifier assigned to the registered thread
    #[must_use]
    pub const fn key(&self) -> ThreadKey {
        self.key
    }
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        let _ = self
            .inner
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl ThreadTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a thread until the returned guard is dropped
    #[must_use]
    pub fn enter(&self) -> ThreadGuard {
        let key = self.inner.next.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .inner
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key);
        ThreadGuard {
            key,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Spawn a named thread that stays registered while it runs
    pub fn spawn<F, T>(&self, name: impl Into<String>, f: F) -> std::io::Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.enter();
        std::thread::Builder::new().name(name.into()).spawn(move || {
            let _guard = guard;
            f()
        })
    }

    /// Number of registered threads
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.inner
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ThreadRegistry for ThreadTracker {
    fn live_threads(&self) -> BTreeSet<ThreadKey> {
        self.inner
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// =============================================================================
// OPERATING SYSTEM THREADS
// =============================================================================

/// Every OS thread of the current process
///
/// Reads `/proc/self/task` on Linux. Elsewhere the set is always empty, so
/// the quiescence wait returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessThreads;

impl ThreadRegistry for ProcessThreads {
    #[cfg(target_os = "linux")]
    fn live_threads(&self) -> BTreeSet<ThreadKey> {
        match std::fs::read_dir("/proc/self/task") {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
                .collect(),
            Err(err) => {
                tracing::debug!(error = %err, "cannot enumerate process threads");
                BTreeSet::new()
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn live_threads(&self) -> BTreeSet<ThreadKey> {
        BTreeSet::new()
    }
}

// =============================================================================
// QUIESCENCE WAIT
// =============================================================================

/// Bounded wait for threads created after a baseline to exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuiescenceWatcher {
    interval: Duration,
    timeout: Duration,
}

impl QuiescenceWatcher {
    /// Create a watcher with an explicit poll interval and timeout
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Create a watcher from agent configuration
    #[must_use]
    pub const fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.quiesce_interval(), config.quiesce_wait())
    }

    /// Maximum time spent waiting
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait until every live thread is in `baseline`
    ///
    /// Returns `true` on quiescence, `false` once the timeout elapsed with
    /// extra threads still alive.
    pub async fn wait(&self, registry: &dyn ThreadRegistry, baseline: &BTreeSet<ThreadKey>) -> bool {
        let deadline = Instant::now() + self.timeout;
        loop {
            let extra = registry.live_threads().difference(baseline).count();
            if extra == 0 {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    extra_threads = extra,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "threads started during the test are still running"
                );
                return false;
            }
            tokio::time::sleep(self.interval.min(deadline - now)).await;
        }
    }
}

impl Default for QuiescenceWatcher {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}
