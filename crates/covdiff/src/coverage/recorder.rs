//! Execution Recorder
//!
//! Process-wide `(file, line) -> hits` counters. Every instrumented thread
//! writes through [`LineRecorder::record`]; the agent only ever *tries* to
//! read, so a sample taken while a writer holds the map fails with
//! [`RecorderBusy`] instead of observing a partial update.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock, TryLockError};

/// One executed source line
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineKey {
    /// File path exactly as reported by the tracer
    pub file: Arc<str>,
    /// 1-based line number
    pub line: u32,
}

impl LineKey {
    /// Create a new line key
    #[must_use]
    pub fn new(file: impl Into<Arc<str>>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Immutable point-in-time copy of all line counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    counts: BTreeMap<LineKey, u64>,
}

impl Snapshot {
    /// Create an empty snapshot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hit count for a line (0 when absent)
    #[must_use]
    pub fn get(&self, key: &LineKey) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Number of distinct lines
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Check whether no line has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate over `(line, hits)` pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&LineKey, u64)> {
        self.counts.iter().map(|(k, v)| (k, *v))
    }
}

impl FromIterator<(LineKey, u64)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (LineKey, u64)>>(iter: I) -> Self {
        Self {
            counts: iter.into_iter().collect(),
        }
    }
}

/// Transient read conflict: a writer held the counters at sampling time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderBusy;

impl fmt::Display for RecorderBusy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("execution counters are being updated")
    }
}

impl std::error::Error for RecorderBusy {}

/// The host capability the agent drives: sample and reset line counters
///
/// [`LineRecorder`] is the in-process implementation; embedding tracers can
/// supply their own.
pub trait ExecutionRecorder: Send + Sync + fmt::Debug {
    /// Copy the counters, or report a transient conflict
    fn try_counts(&self) -> Result<Snapshot, RecorderBusy>;

    /// Clear all counters
    fn reset(&self);

    /// Copy the counters, retrying transient conflicts until one succeeds
    fn current_counts(&self) -> Snapshot {
        loop {
            match self.try_counts() {
                Ok(snapshot) => return snapshot,
                Err(RecorderBusy) => std::thread::yield_now(),
            }
        }
    }
}

type FileCounts = HashMap<Arc<str>, HashMap<u32, u64>>;

/// Thread-safe line hit counters
#[derive(Debug)]
pub struct LineRecorder {
    counts: RwLock<FileCounts>,
    running: AtomicBool,
}

static GLOBAL: OnceLock<Arc<LineRecorder>> = OnceLock::new();

impl LineRecorder {
    /// Create a running recorder with no counts
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: RwLock::new(HashMap::new()),
            running: AtomicBool::new(true),
        }
    }

    /// Process-wide recorder, created on first use
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    /// Count one execution of `file:line`
    ///
    /// Hot path; no-op while the recorder is stopped.
    #[inline]
    pub fn record(&self, file: &str, line: u32) {
        if !self.running.load(Ordering::Relaxed) {
            return;
        }
        let mut counts = self.counts.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(lines) = counts.get_mut(file) {
            *lines.entry(line).or_insert(0) += 1;
        } else {
            let mut lines = HashMap::new();
            let _ = lines.insert(line, 1);
            let _ = counts.insert(Arc::from(file), lines);
        }
    }

    /// Resume counting
    pub fn start(&self) {
        self.running.store(true, Ordering::Relaxed);
    }

    /// Stop counting; existing counts are kept
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Check whether hits are being counted
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Number of distinct lines currently tracked
    #[must_use]
    pub fn distinct_lines(&self) -> usize {
        self.counts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(HashMap::len)
            .sum()
    }

    fn copy(counts: &FileCounts) -> Snapshot {
        counts
            .iter()
            .flat_map(|(file, lines)| {
                lines
                    .iter()
                    .map(move |(line, hits)| (LineKey::new(Arc::clone(file), *line), *hits))
            })
            .collect()
    }
}

impl Default for LineRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionRecorder for LineRecorder {
    fn try_counts(&self) -> Result<Snapshot, RecorderBusy> {
        match self.counts.try_read() {
            Ok(counts) => Ok(Self::copy(&counts)),
            Err(TryLockError::Poisoned(poisoned)) => Ok(Self::copy(&poisoned.into_inner())),
            Err(TryLockError::WouldBlock) => Err(RecorderBusy),
        }
    }

    fn reset(&self) {
        self.counts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Record the calling source line on a recorder
///
/// With no argument the process-wide [`LineRecorder::global`] is used.
///
/// ```
/// let recorder = covdiff::LineRecorder::new();
/// covdiff::trace_line!(recorder);
/// assert_eq!(recorder.distinct_lines(), 1);
/// ```
#[macro_export]
macro_rules! trace_line {
    () => {
        $crate::LineRecorder::global().record(file!(), line!())
    };
    ($recorder:expr) => {
        $recorder.record(file!(), line!())
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_record_counts_hits() {
        let recorder = LineRecorder::new();
        recorder.record("/app/main.py", 10);
        recorder.record("/app/main.py", 10);
        recorder.record("/app/main.py", 11);

        let snapshot = recorder.current_counts();
        assert_eq!(snapshot.get(&LineKey::new("/app/main.py", 10)), 2);
        assert_eq!(snapshot.get(&LineKey::new("/app/main.py", 11)), 1);
        assert_eq!(snapshot.get(&LineKey::new("/app/main.py", 12)), 0);
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_reset_clears_counts() {
        let recorder = LineRecorder::new();
        recorder.record("/app/a.py", 1);
        recorder.reset();
        assert!(recorder.current_counts().is_empty());
        assert_eq!(recorder.distinct_lines(), 0);
    }

    #[test]
    fn test_stopped_recorder_ignores_hits() {
        let recorder = LineRecorder::new();
        recorder.stop();
        assert!(!recorder.is_running());
        recorder.record("/app/a.py", 1);
        assert!(recorder.current_counts().is_empty());

        recorder.start();
        recorder.record("/app/a.py", 1);
        assert_eq!(recorder.distinct_lines(), 1);
    }

    #[test]
    fn test_try_counts_reports_busy_while_writer_holds_lock() {
        let recorder = LineRecorder::new();
        let guard = recorder.counts.write().unwrap();
        assert_eq!(recorder.try_counts(), Err(RecorderBusy));
        drop(guard);
        assert!(recorder.try_counts().is_ok());
    }

    #[test]
    fn test_snapshot_is_independent_of_later_hits() {
        let recorder = LineRecorder::new();
        recorder.record("/app/a.py", 1);
        let before = recorder.current_counts();
        recorder.record("/app/a.py", 1);
        assert_eq!(before.get(&LineKey::new("/app/a.py", 1)), 1);
        assert_eq!(recorder.current_counts().get(&LineKey::new("/app/a.py", 1)), 2);
    }

    #[test]
    fn test_hits_from_many_threads_are_all_counted() {
        let recorder = Arc::new(LineRecorder::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let recorder = Arc::clone(&recorder);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        recorder.record("/app/worker.py", 7);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let snapshot = recorder.current_counts();
        assert_eq!(snapshot.get(&LineKey::new("/app/worker.py", 7)), 8000);
    }

    #[test]
    fn test_trace_line_macro_records_call_site() {
        let recorder = LineRecorder::new();
        let line = line!() + 1;
        trace_line!(recorder);
        let snapshot = recorder.current_counts();
        assert_eq!(snapshot.get(&LineKey::new(file!(), line)), 1);
    }

    #[test]
    fn test_line_key_display() {
        assert_eq!(LineKey::new("/app/x.py", 3).to_string(), "/app/x.py:3");
    }
}
