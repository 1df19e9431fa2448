//! Diff & Filter Engine
//!
//! Lines whose hit count strictly increased between two snapshots, filtered
//! down to application code and grouped by resolved file.

use super::{CoverageReport, LineKey, Snapshot};
use crate::classifier::PathClassifier;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Keys of `after` whose count is strictly greater than in `before`
///
/// A key absent from `before` counts as zero there.
#[must_use]
pub fn diff(after: &Snapshot, before: &Snapshot) -> BTreeSet<LineKey> {
    after
        .iter()
        .filter(|(key, hits)| *hits > before.get(key))
        .map(|(key, _)| key.clone())
        .collect()
}

/// Build the report for test `id` from its baseline and final snapshots
///
/// Each raw file is resolved and classified once per report.
#[must_use]
pub fn build_report(
    id: &str,
    after: &Snapshot,
    before: &Snapshot,
    classifier: &PathClassifier,
) -> CoverageReport {
    let mut report = CoverageReport::new(id);
    let mut resolved: HashMap<Arc<str>, Option<String>> = HashMap::new();
    let mut dropped = 0_usize;

    for key in diff(after, before) {
        let target = resolved.entry(Arc::clone(&key.file)).or_insert_with(|| {
            classifier
                .resolve_application_path(&key.file)
                .map(|path| path.to_string_lossy().into_owned())
        });
        match target {
            Some(path) => report.add_line(path.clone(), key.line),
            None => dropped += 1,
        }
    }

    tracing::debug!(
        test_id = id,
        files = report.file_count(),
        lines = report.line_count(),
        dropped,
        "built coverage report"
    );
    report
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn snap(entries: &[(&str, u32, u64)]) -> Snapshot {
        entries
            .iter()
            .map(|(file, line, hits)| (LineKey::new(*file, *line), *hits))
            .collect()
    }

    #[test]
    fn test_new_and_increased_lines_are_reported() {
        let before = snap(&[("/app/a.py", 1, 3), ("/app/a.py", 2, 1)]);
        let after = snap(&[("/app/a.py", 1, 3), ("/app/a.py", 2, 2), ("/app/b.py", 5, 1)]);
        let changed: Vec<String> = diff(&after, &before).iter().map(ToString::to_string).collect();
        assert_eq!(changed, vec!["/app/a.py:2", "/app/b.py:5"]);
    }

    #[test]
    fn test_decreased_count_is_not_reported() {
        let before = snap(&[("/app/a.py", 1, 5)]);
        let after = snap(&[("/app/a.py", 1, 2)]);
        assert!(diff(&after, &before).is_empty());
    }

    #[test]
    fn test_keys_only_in_before_are_ignored() {
        let before = snap(&[("/app/gone.py", 9, 1)]);
        assert!(diff(&Snapshot::new(), &before).is_empty());
    }

    #[test]
    fn test_report_filters_standard_library() {
        let classifier = PathClassifier::new("/app").with_stdlib_dir("/usr/lib/pythonX");
        let after = snap(&[
            ("/app/main.py", 10, 1),
            ("/usr/lib/pythonX/socket.py", 55, 4),
            ("/app/lib/util.py", 3, 2),
        ]);
        let report = build_report("t1", &after, &Snapshot::new(), &classifier);

        let expected: serde_json::Value = serde_json::json!({
            "id": "t1",
            "executedLinesByFile": {"/app/main.py": [10], "/app/lib/util.py": [3]}
        });
        let actual: serde_json::Value =
            serde_json::from_slice(&report.to_json_bytes().unwrap()).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_report_merges_raw_spellings_of_one_file() {
        let classifier = PathClassifier::new("/app");
        let after = snap(&[("/app/./main.py", 1, 1), ("/app/lib/../main.py", 2, 1)]);
        let report = build_report("t2", &after, &Snapshot::new(), &classifier);
        assert_eq!(report.file_count(), 1);
        assert_eq!(report.line_count(), 2);
    }

    #[test]
    fn test_report_drops_synthetic_frames() {
        let classifier = PathClassifier::new("/app");
        let after = snap(&[("<frozen importlib._bootstrap>", 241, 7)]);
        assert!(build_report("t3", &after, &Snapshot::new(), &classifier).is_empty());
    }

    fn arb_snapshot() -> impl Strategy<Value = BTreeMap<(u8, u32), u64>> {
        prop::collection::btree_map((0u8..4, 1u32..20), 0u64..5, 0..30)
    }

    fn to_snapshot(map: &BTreeMap<(u8, u32), u64>) -> Snapshot {
        map.iter()
            .map(|((file, line), hits)| (LineKey::new(format!("/app/f{file}.py"), *line), *hits))
            .collect()
    }

    proptest! {
        #[test]
        fn prop_diff_contains_exactly_the_increased_keys(
            before in arb_snapshot(),
            after in arb_snapshot()
        ) {
            let changed = diff(&to_snapshot(&after), &to_snapshot(&before));
            for (key, hits) in &after {
                let key_line = LineKey::new(format!("/app/f{}.py", key.0), key.1);
                let old = before.get(key).copied().unwrap_or(0);
                prop_assert_eq!(changed.contains(&key_line), *hits > old);
            }
            prop_assert!(changed.len() <= after.len());
        }

        #[test]
        fn prop_diff_against_itself_is_empty(snapshot in arb_snapshot()) {
            let snapshot = to_snapshot(&snapshot);
            prop_assert!(diff(&snapshot, &snapshot).is_empty());
        }
    }
}
