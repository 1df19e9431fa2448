//! Coverage Report
//!
//! Per-test result shipped on the data channel:
//!
//! ```text
//! {"id":"<test-id>","executedLinesByFile":{"<abs-path>":[<line>,...],...}}
//! ```

use crate::result::AgentResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Lines newly executed by one test, grouped by resolved file path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// Test case identifier
    pub id: String,
    /// Executed line numbers per absolute file path
    #[serde(rename = "executedLinesByFile")]
    pub executed_lines_by_file: BTreeMap<String, BTreeSet<u32>>,
}

impl CoverageReport {
    /// Create an empty report for a test
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            executed_lines_by_file: BTreeMap::new(),
        }
    }

    /// Record one executed line; duplicates collapse
    pub fn add_line(&mut self, file: impl Into<String>, line: u32) {
        let _ = self
            .executed_lines_by_file
            .entry(file.into())
            .or_default()
            .insert(line);
    }

    /// Number of files with at least one executed line
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.executed_lines_by_file.len()
    }

    /// Total number of executed lines across all files
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.executed_lines_by_file.values().map(BTreeSet::len).sum()
    }

    /// Check whether the test executed no application line
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executed_lines_by_file.is_empty()
    }

    /// Executed lines of one file
    #[must_use]
    pub fn lines_for(&self, file: &str) -> Option<&BTreeSet<u32>> {
        self.executed_lines_by_file.get(file)
    }

    /// Compact JSON encoding used on the data channel
    pub fn to_json_bytes(&self) -> AgentResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a data channel payload
    pub fn from_json_slice(bytes: &[u8]) -> AgentResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_lines_collapse() {
        let mut report = CoverageReport::new("t1");
        report.add_line("/app/main.py", 10);
        report.add_line("/app/main.py", 10);
        report.add_line("/app/main.py", 4);
        assert_eq!(report.file_count(), 1);
        assert_eq!(report.line_count(), 2);
        let lines: Vec<u32> = report.lines_for("/app/main.py").unwrap().iter().copied().collect();
        assert_eq!(lines, vec![4, 10]);
    }

    #[test]
    fn test_wire_format_uses_camel_case_field() {
        let mut report = CoverageReport::new("t1");
        report.add_line("/app/main.py", 10);
        let json = String::from_utf8(report.to_json_bytes().unwrap()).unwrap();
        assert_eq!(
            json,
            r#"{"id":"t1","executedLinesByFile":{"/app/main.py":[10]}}"#
        );
    }

    #[test]
    fn test_empty_report_encodes_empty_map() {
        let report = CoverageReport::new("idle");
        assert!(report.is_empty());
        let value: serde_json::Value =
            serde_json::from_slice(&report.to_json_bytes().unwrap()).unwrap();
        assert_eq!(value["executedLinesByFile"], serde_json::json!({}));
    }

    #[test]
    fn test_decodes_payload_with_unsorted_duplicate_lines() {
        let payload = br#"{"id":"t9","executedLinesByFile":{"/app/a.py":[3,1,3]}}"#;
        let report = CoverageReport::from_json_slice(payload).unwrap();
        assert_eq!(report.id, "t9");
        assert_eq!(report.line_count(), 2);
    }

    #[test]
    fn test_rejects_malformed_payload() {
        assert!(CoverageReport::from_json_slice(b"{\"id\":1}").is_err());
    }
}
