//! Per-step status tracking.
//!
//! Counters are atomics so the progress timer can read them from its own
//! thread without taking the details lock. A reader may observe counters from
//! slightly different points in time; that is fine for progress reports since
//! every counter only grows.

use crate::core::StepRole;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Record of a single failed record in a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    /// Name of the failed record (or of the step when no record is known).
    pub name: String,
    /// Error message.
    pub error: String,
    /// Captured stack trace, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    /// Unix timestamp of the failure.
    pub timestamp: f64,
}

impl FailureRecord {
    /// Creates a new failure record.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        Self {
            name: name.into(),
            error: error.into(),
            stack_trace: None,
            timestamp: now,
        }
    }

    /// Sets the stack trace.
    #[must_use]
    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    /// Builds a failure record from a step error.
    ///
    /// The full context chain becomes the message; the backtrace is kept only
    /// when one was actually captured.
    #[must_use]
    pub fn from_error(name: impl Into<String>, err: &anyhow::Error) -> Self {
        let record = Self::new(name, format!("{err:#}"));
        let backtrace = err.backtrace();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            record.with_stack_trace(backtrace.to_string())
        } else {
            record
        }
    }
}

/// A record skipped by policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredRecord {
    /// Record key.
    pub key: String,
    /// Why it was filtered.
    pub reason: String,
}

/// A non-fatal warning raised while processing a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningRecord {
    /// Record key.
    pub key: String,
    /// Warning message.
    pub message: String,
}

/// Point-in-time counter values for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Successfully processed records.
    pub scanned: u64,
    /// Records skipped by policy.
    pub filtered: u64,
    /// Warnings raised.
    pub warnings: u64,
    /// Failed records.
    pub failed: u64,
}

impl StatusCounts {
    /// Records accounted for: scanned, filtered or failed.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.scanned + self.filtered + self.failed
    }

    /// Fraction of processed records that failed, in `[0, 1]`.
    #[must_use]
    pub fn failure_ratio(&self) -> f64 {
        let processed = self.processed();
        if processed == 0 {
            return 0.0;
        }
        self.failed as f64 / processed as f64
    }
}

impl std::ops::Add for StatusCounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            scanned: self.scanned + rhs.scanned,
            filtered: self.filtered + rhs.filtered,
            warnings: self.warnings + rhs.warnings,
            failed: self.failed + rhs.failed,
        }
    }
}

/// Full copy of a step's status, including failure details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    /// Step name.
    pub name: String,
    /// Step role.
    pub role: StepRole,
    /// Counter values.
    #[serde(flatten)]
    pub counts: StatusCounts,
    /// Failure entries, in order of occurrence.
    #[serde(default)]
    pub failures: Vec<FailureRecord>,
    /// Filtered entries, in order of occurrence.
    #[serde(default)]
    pub filtered_records: Vec<FilteredRecord>,
    /// Warning entries, in order of occurrence.
    #[serde(default)]
    pub warning_records: Vec<WarningRecord>,
    /// When tracking started for this step.
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct StatusDetails {
    failures: Vec<FailureRecord>,
    filtered: Vec<FilteredRecord>,
    warnings: Vec<WarningRecord>,
}

/// Mutable status of a single step.
///
/// Written by the main loop and read concurrently by the progress timer.
#[derive(Debug)]
pub struct Status {
    name: String,
    role: StepRole,
    scanned: AtomicU64,
    filtered: AtomicU64,
    warnings: AtomicU64,
    failed: AtomicU64,
    details: Mutex<StatusDetails>,
    started_at: DateTime<Utc>,
}

impl Status {
    /// Creates an empty status for a step.
    #[must_use]
    pub fn new(name: impl Into<String>, role: StepRole) -> Self {
        Self {
            name: name.into(),
            role,
            scanned: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            warnings: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            details: Mutex::new(StatusDetails::default()),
            started_at: Utc::now(),
        }
    }

    /// Returns the step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the step role.
    #[must_use]
    pub fn role(&self) -> StepRole {
        self.role
    }

    /// Records a successfully processed record.
    pub fn scanned(&self, key: &str) {
        debug!(step = %self.name, record = key, "Scanned");
        self.scanned.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a record skipped by policy.
    pub fn filter(&self, key: impl Into<String>, reason: impl Into<String>) {
        let entry = FilteredRecord {
            key: key.into(),
            reason: reason.into(),
        };
        debug!(step = %self.name, record = %entry.key, reason = %entry.reason, "Filtered");
        self.details.lock().filtered.push(entry);
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a non-fatal warning.
    pub fn warning(&self, key: impl Into<String>, message: impl Into<String>) {
        let entry = WarningRecord {
            key: key.into(),
            message: message.into(),
        };
        warn!(step = %self.name, record = %entry.key, "{}", entry.message);
        self.details.lock().warnings.push(entry);
        self.warnings.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed record.
    pub fn failed(
        &self,
        name: impl Into<String>,
        error: impl Into<String>,
        stack_trace: Option<String>,
    ) {
        let mut record = FailureRecord::new(name, error);
        record.stack_trace = stack_trace;
        self.record_failure(record);
    }

    /// Records a prebuilt failure entry.
    pub fn record_failure(&self, record: FailureRecord) {
        warn!(step = %self.name, record = %record.name, error = %record.error, "Failed");
        self.details.lock().failures.push(record);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads the current counters without locking.
    #[must_use]
    pub fn counts(&self) -> StatusCounts {
        StatusCounts {
            scanned: self.scanned.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Copies counters and details.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        let details = self.details.lock();
        StatusSnapshot {
            name: self.name.clone(),
            role: self.role,
            counts: self.counts(),
            failures: details.failures.clone(),
            filtered_records: details.filtered.clone(),
            warning_records: details.warnings.clone(),
            started_at: self.started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn test_failure_record_creation() {
        let record = FailureRecord::new("db.orders", "column type unsupported")
            .with_stack_trace("at parse_column");

        assert_eq!(record.name, "db.orders");
        assert_eq!(record.error, "column type unsupported");
        assert_eq!(record.stack_trace.as_deref(), Some("at parse_column"));
        assert!(record.timestamp > 0.0);
    }

    #[test]
    fn test_failure_record_from_error_keeps_context() {
        let err = anyhow::anyhow!("timeout").context("fetching table metadata");
        let record = FailureRecord::from_error("db.orders", &err);

        assert_eq!(record.error, "fetching table metadata: timeout");
    }

    #[test]
    fn test_status_counters() {
        let status = Status::new("processor", StepRole::Processor);

        status.scanned("a");
        status.scanned("b");
        status.filter("c", "excluded by table filter pattern");
        status.warning("b", "missing description");
        status.failed("d", "boom", None);

        assert_eq!(
            status.counts(),
            StatusCounts {
                scanned: 2,
                filtered: 1,
                warnings: 1,
                failed: 1,
            }
        );
        assert_eq!(status.counts().processed(), 4);
    }

    #[test]
    fn test_status_snapshot_details() {
        let status = Status::new("sink", StepRole::Sink);
        status.filter("x", "duplicate");
        status.failed("y", "rejected by catalog", Some("trace".to_string()));

        let snapshot = status.snapshot();
        assert_eq!(snapshot.name, "sink");
        assert_eq!(snapshot.role, StepRole::Sink);
        assert_eq!(snapshot.filtered_records[0].reason, "duplicate");
        assert_eq!(snapshot.failures[0].name, "y");
        assert_eq!(snapshot.failures[0].stack_trace.as_deref(), Some("trace"));
    }

    #[test]
    fn test_failure_ratio() {
        let counts = StatusCounts {
            scanned: 8,
            filtered: 0,
            warnings: 3,
            failed: 2,
        };
        assert!((counts.failure_ratio() - 0.2).abs() < f64::EPSILON);
        assert!(StatusCounts::default().failure_ratio().abs() < f64::EPSILON);
    }

    #[test]
    fn test_concurrent_reads_are_monotonic() {
        let status = Arc::new(Status::new("source", StepRole::Source));
        let reader = {
            let status = Arc::clone(&status);
            std::thread::spawn(move || {
                let mut last = 0;
                for _ in 0..1000 {
                    let scanned = status.counts().scanned;
                    assert!(scanned >= last);
                    last = scanned;
                }
            })
        };

        for i in 0..1000 {
            status.scanned(&i.to_string());
        }
        reader.join().unwrap();
        assert_eq!(status.counts().scanned, 1000);
    }

    #[test]
    fn test_snapshot_serializes_flat_counts() {
        let status = Status::new("source", StepRole::Source);
        status.scanned("a");

        let json = serde_json::to_value(status.snapshot()).unwrap();
        assert_eq!(json["scanned"], 1);
        assert_eq!(json["role"], "source");
    }
}
