//! Test assertions for run records.

use crate::core::{FailureKind, RunRecord, RunStatus, StageStatus};

/// Asserts that the run completed with every node succeeding.
pub fn assert_run_succeeded(record: &RunRecord) {
    assert!(
        record.is_success(),
        "Expected successful run, got status {:?} (failed at {:?}: {:?})",
        record.status(),
        record.failed_node(),
        record.failure_reason()
    );
}

/// Asserts that the run failed at `node`.
pub fn assert_run_failed_at(record: &RunRecord, node: &str) {
    assert_eq!(
        record.status(),
        RunStatus::Failed,
        "Expected failed run, got {:?}",
        record.status()
    );
    assert_eq!(
        record.failed_node(),
        Some(node),
        "Expected failure at '{}', got {:?}",
        node,
        record.failed_node()
    );
}

/// Asserts the exact sequence of executed nodes and their statuses.
pub fn assert_results(record: &RunRecord, expected: &[(&str, StageStatus)]) {
    let actual: Vec<(&str, StageStatus)> = record
        .results()
        .iter()
        .map(|r| (r.node.as_str(), r.status))
        .collect();
    assert_eq!(actual, expected, "Unexpected stage results");
}

/// Asserts that the last result carries the given failure kind.
pub fn assert_last_failure_kind(record: &RunRecord, kind: FailureKind) {
    let last = record.results().last();
    assert_eq!(
        last.and_then(|r| r.failure_kind),
        Some(kind),
        "Expected last result to fail with {:?}, got {:?}",
        kind,
        last
    );
}

/// Asserts that the run's failure reason contains `needle`.
pub fn assert_reason_contains(record: &RunRecord, needle: &str) {
    let reason = record.failure_reason().unwrap_or_default();
    assert!(
        reason.contains(needle),
        "Expected failure reason to contain '{}', got '{}'",
        needle,
        reason
    );
}
