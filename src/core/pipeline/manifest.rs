//! Run manifest and per-resource-type reports

use crate::core::transform::RejectedRecord;
use crate::domain::{ErrorKind, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Outcome of a run, or of one resource type within it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    /// Everything extracted was written
    Success,
    /// Committed, but some records were rejected (or, for a run, some types failed)
    Partial,
    /// Nothing committed; the cursor is unchanged
    Failed,
    /// No transformer for the resource type
    Skipped,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Success => "SUCCESS",
            RunStatus::Partial => "PARTIAL",
            RunStatus::Failed => "FAILED",
            RunStatus::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

/// Counts and outcome for one resource type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRunReport {
    /// Outcome
    pub status: RunStatus,
    /// Records extracted
    pub extracted: usize,
    /// Records that became rows
    pub transformed: usize,
    /// Records excluded by the transform state machine
    pub rejected: usize,
    /// Rows appended
    pub written: usize,
    /// Rows skipped as already stored
    pub duplicates_skipped: usize,
    /// Non-blocking findings
    pub warnings: usize,
    /// Failures per kind (rejected records, batch and I/O failures)
    pub errors_by_kind: BTreeMap<ErrorKind, usize>,
    /// Mapping version used, when a transformer was resolved
    pub mapping_version: Option<u32>,
    /// Cursor watermark before the run
    pub watermark_before: Option<DateTime<Utc>>,
    /// Cursor watermark after the run
    pub watermark_after: Option<DateTime<Utc>>,
    /// Failure that stopped the resource type's run
    pub error: Option<String>,
    /// Rejects log
    pub rejects: Vec<RejectedRecord>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

impl ResourceRunReport {
    /// Empty report with the given status
    pub fn new(status: RunStatus) -> Self {
        Self {
            status,
            extracted: 0,
            transformed: 0,
            rejected: 0,
            written: 0,
            duplicates_skipped: 0,
            warnings: 0,
            errors_by_kind: BTreeMap::new(),
            mapping_version: None,
            watermark_before: None,
            watermark_after: None,
            error: None,
            rejects: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Count one failure of `kind`
    pub fn count_error(&mut self, kind: ErrorKind) {
        *self.errors_by_kind.entry(kind).or_insert(0) += 1;
    }

    /// Mark the run failed
    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.count_error(kind);
        self.error = Some(message.into());
        self.watermark_after = self.watermark_before;
    }

    /// Add the rejects of a transformed batch
    pub fn add_rejects(&mut self, rejects: Vec<RejectedRecord>) {
        for rejected in &rejects {
            self.count_error(rejected.kind);
        }
        self.rejected += rejects.len();
        self.rejects.extend(rejects);
    }
}

/// Summary of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Unique run id
    pub run_id: Uuid,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: Option<DateTime<Utc>>,
    /// Whether writes were skipped
    pub dry_run: bool,
    /// Report per resource type
    pub resource_types: BTreeMap<String, ResourceRunReport>,
}

impl RunManifest {
    /// Start a manifest now
    pub fn new(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            resource_types: BTreeMap::new(),
        }
    }

    /// Record a resource type's report
    pub fn insert(&mut self, resource_type: impl Into<String>, report: ResourceRunReport) {
        self.resource_types.insert(resource_type.into(), report);
    }

    /// Stamp the finish time
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Overall status
    ///
    /// `SUCCESS` when every resource type succeeded, `FAILED` when none committed,
    /// `PARTIAL` otherwise. An empty run is a success.
    pub fn status(&self) -> RunStatus {
        let reports = self.resource_types.values();
        if reports.clone().all(|r| r.status == RunStatus::Success) {
            return RunStatus::Success;
        }
        if reports
            .clone()
            .any(|r| matches!(r.status, RunStatus::Success | RunStatus::Partial))
        {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        }
    }

    /// Records extracted across all resource types
    pub fn total_extracted(&self) -> usize {
        self.resource_types.values().map(|r| r.extracted).sum()
    }

    /// Records rejected across all resource types
    pub fn total_rejected(&self) -> usize {
        self.resource_types.values().map(|r| r.rejected).sum()
    }

    /// Rows written across all resource types
    pub fn total_written(&self) -> usize {
        self.resource_types.values().map(|r| r.written).sum()
    }

    /// Failures per kind across all resource types
    pub fn errors_by_kind(&self) -> BTreeMap<ErrorKind, usize> {
        let mut totals = BTreeMap::new();
        for report in self.resource_types.values() {
            for (kind, count) in &report.errors_by_kind {
                *totals.entry(*kind).or_insert(0) += count;
            }
        }
        totals
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Log the summary
    pub fn log_summary(&self) {
        let duration_ms = self
            .finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
            .unwrap_or_default();
        tracing::info!(
            run_id = %self.run_id,
            status = %self.status(),
            resource_types = self.resource_types.len(),
            extracted = self.total_extracted(),
            rejected = self.total_rejected(),
            written = self.total_written(),
            dry_run = self.dry_run,
            duration_ms,
            "Run completed"
        );

        for (resource_type, report) in &self.resource_types {
            if report.status == RunStatus::Success {
                continue;
            }
            tracing::warn!(
                resource_type = %resource_type,
                status = %report.status,
                rejected = report.rejected,
                errors_by_kind = ?report.errors_by_kind,
                error = ?report.error,
                "Resource type did not fully succeed"
            );
        }
    }
}
