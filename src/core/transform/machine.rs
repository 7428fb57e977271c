//! Per-record transform state machine

use super::Transformer;
use crate::core::validation::{validate_business, validate_structural, ValidationResult};
use crate::domain::{ErrorKind, Provenance, Record, ResourceType, Row, StrataError};
use crate::log_record_rejected;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// States of the transform state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformStage {
    /// Record received, nothing checked
    Init,
    /// Structural checks passed
    Validated,
    /// Column values produced
    Mapped,
    /// Columns conform to the schema
    Enforced,
    /// Row emitted
    Done,
    /// Record excluded
    Failed,
}

impl fmt::Display for TransformStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransformStage::Init => "init",
            TransformStage::Validated => "validated",
            TransformStage::Mapped => "mapped",
            TransformStage::Enforced => "enforced",
            TransformStage::Done => "done",
            TransformStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A record excluded from output, kept for the rejects log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRecord {
    /// Resource type the record was dispatched as
    pub resource_type: ResourceType,
    /// Record id, when it had one
    pub resource_id: Option<String>,
    /// State the record was in when it failed
    pub stage: TransformStage,
    /// Failure classification
    pub kind: ErrorKind,
    /// Every finding collected for the record, blocking ones included
    pub results: Vec<ValidationResult>,
}

/// Result of transforming one record
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    /// The record reached `DONE`
    Row {
        /// Emitted row with provenance
        row: Row,
        /// Non-blocking findings
        warnings: Vec<ValidationResult>,
    },
    /// The record reached `FAILED`
    Rejected(RejectedRecord),
}

impl TransformOutcome {
    /// The emitted row, if any
    pub fn row(&self) -> Option<&Row> {
        match self {
            TransformOutcome::Row { row, .. } => Some(row),
            TransformOutcome::Rejected(_) => None,
        }
    }

    /// The rejection, if any
    pub fn rejected(&self) -> Option<&RejectedRecord> {
        match self {
            TransformOutcome::Row { .. } => None,
            TransformOutcome::Rejected(rejected) => Some(rejected),
        }
    }
}

struct Run<'a> {
    resource_type: &'a ResourceType,
    resource_id: Option<String>,
    findings: Vec<ValidationResult>,
}

impl Run<'_> {
    fn reject(mut self, stage: TransformStage, kind: ErrorKind, extra: Vec<ValidationResult>) -> TransformOutcome {
        self.findings.extend(extra);
        log_record_rejected!(
            self.resource_type,
            self.resource_id.as_deref(),
            stage,
            kind,
            self.findings.len()
        );
        TransformOutcome::Rejected(RejectedRecord {
            resource_type: self.resource_type.clone(),
            resource_id: self.resource_id,
            stage,
            kind,
            results: self.findings,
        })
    }

    fn reject_error(self, stage: TransformStage, error: StrataError) -> TransformOutcome {
        let rule_id = match error.kind() {
            ErrorKind::SchemaViolation => "schema.undeclared_column",
            _ => "mapping.error",
        };
        let finding = ValidationResult::fail(rule_id, error.to_string(), self.resource_id.as_deref());
        self.reject(stage, error.kind(), vec![finding])
    }
}

/// Drive one record through the state machine
///
/// Never panics and never returns an error: every failure becomes a
/// [`TransformOutcome::Rejected`].
pub fn transform_record<T: Transformer + ?Sized>(
    transformer: &T,
    record: Record,
    extracted_at: DateTime<Utc>,
) -> TransformOutcome {
    let resource_type = transformer.resource_type();
    let schema = transformer.schema();
    let mut run = Run {
        resource_type,
        resource_id: record.id().map(str::to_string),
        findings: Vec::new(),
    };

    // INIT -> VALIDATED
    let structural = validate_structural(&record, Some(resource_type));
    let blocked = structural.iter().any(ValidationResult::is_blocking);
    run.findings.extend(structural);
    if blocked {
        return run.reject(TransformStage::Init, ErrorKind::Structural, Vec::new());
    }
    let source_last_updated = record.last_updated();

    // VALIDATED -> MAPPED
    let record = match transformer.pre_hook(record) {
        Ok(record) => record,
        Err(e) => return run.reject_error(TransformStage::Validated, e),
    };
    if record.resource_type() != Some(resource_type.as_str()) {
        return run.reject_error(
            TransformStage::Validated,
            StrataError::Mapping("pre-hook changed the resourceType".to_string()),
        );
    }
    let output = match transformer.map(&record) {
        Ok(output) => output,
        Err(e) => return run.reject_error(TransformStage::Validated, e),
    };
    let blocked = output.findings.iter().any(ValidationResult::is_blocking);
    run.findings.extend(output.findings);
    if blocked {
        return run.reject(TransformStage::Validated, ErrorKind::Validation, Vec::new());
    }
    let mut values = transformer.post_hook(output.values);

    // MAPPED -> ENFORCED
    let undeclared = schema.undeclared(values.keys());
    if !undeclared.is_empty() {
        return run.reject_error(
            TransformStage::Mapped,
            StrataError::SchemaViolation(format!(
                "columns not declared by {} mapping version {}: {}",
                resource_type,
                schema.mapping_version,
                undeclared.join(", ")
            )),
        );
    }
    for column in &schema.columns {
        values.entry(column.name.clone()).or_insert(serde_json::Value::Null);
    }

    // ENFORCED -> DONE
    let row = Row {
        resource_type: resource_type.clone(),
        provenance: Provenance {
            source_resource_id: run.resource_id.clone().unwrap_or_default(),
            mapping_version: schema.mapping_version,
            extracted_at,
            source_last_updated,
        },
        values,
    };
    let business = validate_business(&row, transformer.rules());
    let blocked = business.iter().any(ValidationResult::is_blocking);
    run.findings.extend(business);
    if blocked {
        return run.reject(TransformStage::Enforced, ErrorKind::Validation, Vec::new());
    }

    TransformOutcome::Row {
        row,
        warnings: run.findings,
    }
}

/// Rows, rejects and warnings of one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// Rows that reached `DONE`, in input order
    pub rows: Vec<Row>,
    /// Records that reached `FAILED`
    pub rejected: Vec<RejectedRecord>,
    /// Non-blocking findings of emitted rows
    pub warnings: Vec<ValidationResult>,
}

impl BatchOutcome {
    /// Records processed
    pub fn total(&self) -> usize {
        self.rows.len() + self.rejected.len()
    }
}

/// Transform every record independently
pub fn transform_batch<T: Transformer + ?Sized>(
    transformer: &T,
    records: impl IntoIterator<Item = Record>,
    extracted_at: DateTime<Utc>,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for record in records {
        match transformer.transform(record, extracted_at) {
            TransformOutcome::Row { row, warnings } => {
                outcome.rows.push(row);
                outcome.warnings.extend(warnings);
            }
            TransformOutcome::Rejected(rejected) => outcome.rejected.push(rejected),
        }
    }
    outcome
}
