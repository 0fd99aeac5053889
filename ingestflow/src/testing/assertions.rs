//! Assertions over workflow summaries.

use crate::status::{StatusCounts, WorkflowSummary};

/// Asserts the counters of one step.
///
/// # Panics
///
/// Panics if the step is missing or any counter differs.
pub fn assert_step_counts(
    summary: &WorkflowSummary,
    step: &str,
    scanned: u64,
    filtered: u64,
    failed: u64,
) {
    let snapshot = summary
        .step(step)
        .unwrap_or_else(|| panic!("Expected a status for step '{step}'"));
    let StatusCounts {
        scanned: actual_scanned,
        filtered: actual_filtered,
        failed: actual_failed,
        ..
    } = snapshot.counts;
    assert_eq!(
        (actual_scanned, actual_filtered, actual_failed),
        (scanned, filtered, failed),
        "Unexpected (scanned, filtered, failed) for step '{step}'"
    );
}

/// Asserts that every record the step received is accounted for exactly once.
///
/// # Panics
///
/// Panics if the step is missing or its counters do not add up to `received`.
pub fn assert_accounted(summary: &WorkflowSummary, step: &str, received: u64) {
    let snapshot = summary
        .step(step)
        .unwrap_or_else(|| panic!("Expected a status for step '{step}'"));
    assert_eq!(
        snapshot.counts.processed(),
        received,
        "Expected scanned + filtered + failed == {received} for step '{step}', got {:?}",
        snapshot.counts
    );
}

/// Asserts that no step recorded a failure.
///
/// # Panics
///
/// Panics listing every recorded failure otherwise.
pub fn assert_no_failures(summary: &WorkflowSummary) {
    let failures: Vec<String> = summary
        .failures()
        .map(|(step, failure)| format!("{step}: {} ({})", failure.name, failure.error))
        .collect();
    assert!(failures.is_empty(), "Expected no failures, got {failures:?}");
}
