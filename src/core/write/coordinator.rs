//! Write coordinator

use crate::adapters::storage::Dataset;
use crate::core::state::{Cursor, CursorStatus, StateManager};
use crate::domain::{ErrorKind, Row, RowKey, StrataError, TableSchema};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Status of one commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommitStatus {
    /// Rows written, cursor advanced, nothing rejected upstream
    Success,
    /// Rows written and cursor advanced, but some records were rejected upstream
    Partial,
    /// Nothing written and cursor unchanged
    Failed,
}

impl fmt::Display for CommitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitStatus::Success => f.write_str("SUCCESS"),
            CommitStatus::Partial => f.write_str("PARTIAL"),
            CommitStatus::Failed => f.write_str("FAILED"),
        }
    }
}

/// Input of [`WriteCoordinator::commit`]
#[derive(Debug, Clone)]
pub struct CommitBatch {
    /// Schema declared by the transformer that produced `rows`
    pub schema: TableSchema,
    /// Transformed rows
    pub rows: Vec<Row>,
    /// Candidate watermark from extraction
    pub new_watermark: Option<DateTime<Utc>>,
    /// Records of this batch rejected before the write
    pub rejected: usize,
}

/// Outcome of one commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResult {
    /// Commit status
    pub status: CommitStatus,
    /// Rows appended (or that would have been, in a dry run)
    pub written: usize,
    /// Rows skipped because they were already stored or repeated in the batch
    pub duplicates_skipped: usize,
    /// Cursor watermark after the commit
    pub watermark: Option<DateTime<Utc>>,
    /// Failure classification, for failed commits
    pub error_kind: Option<ErrorKind>,
    /// Failure description, for failed commits
    pub message: Option<String>,
    /// Whether dataset and cursor writes were skipped
    pub dry_run: bool,
}

impl WriteResult {
    fn failed(cursor: &Cursor, kind: ErrorKind, message: String, dry_run: bool) -> Self {
        Self {
            status: CommitStatus::Failed,
            written: 0,
            duplicates_skipped: 0,
            watermark: cursor.last_successful_watermark,
            error_kind: Some(kind),
            message: Some(message),
            dry_run,
        }
    }

    /// Whether the commit succeeded (fully or partially)
    pub fn is_committed(&self) -> bool {
        self.status != CommitStatus::Failed
    }
}

/// Sole writer of rows and cursors during a run
#[derive(Clone)]
pub struct WriteCoordinator {
    dataset: Arc<dyn Dataset>,
    state: StateManager,
    dry_run: bool,
}

impl WriteCoordinator {
    /// Create a coordinator; `dry_run` skips the append and cursor save
    pub fn new(dataset: Arc<dyn Dataset>, state: StateManager, dry_run: bool) -> Self {
        Self {
            dataset,
            state,
            dry_run,
        }
    }

    /// Whether this coordinator is in dry-run mode
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Write a batch and advance `cursor`
    ///
    /// `cursor` is only modified when the commit succeeds; after a failed
    /// commit it is exactly as it was passed in, and so is the dataset.
    pub async fn commit(&self, cursor: &mut Cursor, batch: CommitBatch) -> WriteResult {
        let CommitBatch {
            schema,
            rows,
            new_watermark,
            rejected,
        } = batch;
        let rt = &schema.resource_type;

        if cursor.resource_type != *rt {
            return WriteResult::failed(
                cursor,
                ErrorKind::Other,
                format!("cursor for {} cannot commit {rt} rows", cursor.resource_type),
                self.dry_run,
            );
        }

        if let Err(e) = check_rows(&schema, &rows) {
            return self.schema_violation(cursor, e);
        }

        let pinned = match self.dataset.read_schema(rt).await {
            Ok(pinned) => pinned,
            Err(e) => return self.io_failure(cursor, e),
        };
        if let Some(diff) = pinned.as_ref().and_then(|p| p.diff(&schema)) {
            return self.schema_violation(
                cursor,
                StrataError::SchemaViolation(format!("{rt}: {diff}")),
            );
        }

        let existing = match self.dataset.existing_keys(rt).await {
            Ok(keys) => keys,
            Err(e) => return self.io_failure(cursor, e),
        };
        let total = rows.len();
        let fresh = dedup(rows, existing);
        let duplicates_skipped = total - fresh.len();
        if duplicates_skipped > 0 {
            tracing::info!(
                resource_type = %rt,
                duplicates_skipped,
                "Skipping rows already present in the dataset"
            );
        }

        let status = if rejected == 0 {
            CommitStatus::Success
        } else {
            CommitStatus::Partial
        };

        if self.dry_run {
            tracing::info!(
                resource_type = %rt,
                rows = fresh.len(),
                watermark = ?new_watermark,
                "Dry run: skipping dataset append and cursor save"
            );
            return WriteResult {
                status,
                written: fresh.len(),
                duplicates_skipped,
                watermark: cursor.last_successful_watermark,
                error_kind: None,
                message: None,
                dry_run: true,
            };
        }

        if !fresh.is_empty() {
            if let Err(e) = self.dataset.append(&schema, &fresh).await {
                return self.io_failure(cursor, e);
            }
        }

        let mut advanced = cursor.clone();
        let cursor_status = match status {
            CommitStatus::Partial => CursorStatus::Partial,
            _ => CursorStatus::Success,
        };
        let moved = advanced.advance(
            new_watermark,
            fresh.len() as u64,
            schema.mapping_version,
            cursor_status,
        );
        if let Err(e) = self.state.save(&advanced).await {
            // rows are durable but the watermark is not; the next run replays them
            tracing::error!(
                resource_type = %rt,
                error = %e,
                "Rows written but cursor could not be saved"
            );
            return self.io_failure(cursor, e);
        }
        *cursor = advanced;

        tracing::info!(
            resource_type = %rt,
            written = fresh.len(),
            duplicates_skipped,
            watermark = ?cursor.last_successful_watermark,
            watermark_moved = moved,
            "Batch committed"
        );

        WriteResult {
            status,
            written: fresh.len(),
            duplicates_skipped,
            watermark: cursor.last_successful_watermark,
            error_kind: None,
            message: None,
            dry_run: false,
        }
    }

    fn schema_violation(&self, cursor: &Cursor, error: StrataError) -> WriteResult {
        tracing::error!(
            resource_type = %cursor.resource_type,
            error = %error,
            "Batch rejected: schema violation"
        );
        WriteResult::failed(cursor, ErrorKind::SchemaViolation, error.to_string(), self.dry_run)
    }

    fn io_failure(&self, cursor: &Cursor, error: StrataError) -> WriteResult {
        tracing::error!(
            resource_type = %cursor.resource_type,
            error = %error,
            "Commit failed"
        );
        WriteResult::failed(cursor, error.kind(), error.to_string(), self.dry_run)
    }
}

impl fmt::Debug for WriteCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteCoordinator")
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

/// Every row must belong to `schema` and use only declared columns
fn check_rows(schema: &TableSchema, rows: &[Row]) -> Result<(), StrataError> {
    for row in rows {
        if row.resource_type != schema.resource_type
            || row.provenance.mapping_version != schema.mapping_version
        {
            return Err(StrataError::SchemaViolation(format!(
                "row {} ({} v{}) does not belong to {} v{}",
                row.provenance.source_resource_id,
                row.resource_type,
                row.provenance.mapping_version,
                schema.resource_type,
                schema.mapping_version
            )));
        }
        let undeclared = schema.undeclared(row.values.keys());
        if !undeclared.is_empty() {
            return Err(StrataError::SchemaViolation(format!(
                "row {} has columns not declared by {} v{}: {}",
                row.provenance.source_resource_id,
                schema.resource_type,
                schema.mapping_version,
                undeclared.join(", ")
            )));
        }
    }
    Ok(())
}

fn dedup(rows: Vec<Row>, mut seen: HashSet<RowKey>) -> Vec<Row> {
    rows.into_iter().filter(|row| seen.insert(row.key())).collect()
}
