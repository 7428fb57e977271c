//! Validation engine
//!
//! Structural checks run on raw records before dispatch; business rules run on
//! mapped rows. Both return every finding for their subject instead of stopping
//! at the first one, and neither mutates what it inspects. Callers aggregate the
//! findings in a [`ValidationReport`] to decide whether the subject may proceed.

pub mod business;
pub mod structural;

pub use business::{validate_business, BusinessRule, Constraint, RuleSpec};
pub use structural::validate_structural;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    /// No problem found
    Pass,
    /// Recorded but does not block the subject
    Warn,
    /// Blocks downstream use of the subject
    Fail,
}

impl fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationLevel::Pass => f.write_str("PASS"),
            ValidationLevel::Warn => f.write_str("WARN"),
            ValidationLevel::Fail => f.write_str("FAIL"),
        }
    }
}

/// One validation finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Severity
    pub level: ValidationLevel,
    /// Stable identifier of the rule that produced this finding
    pub rule_id: String,
    /// Human-readable description
    pub message: String,
    /// Id of the record or row inspected, when known
    pub subject_id: Option<String>,
}

impl ValidationResult {
    /// A warning finding
    pub fn warn(rule_id: impl Into<String>, message: impl Into<String>, subject_id: Option<&str>) -> Self {
        Self::at(ValidationLevel::Warn, rule_id, message, subject_id)
    }

    /// A failing finding
    pub fn fail(rule_id: impl Into<String>, message: impl Into<String>, subject_id: Option<&str>) -> Self {
        Self::at(ValidationLevel::Fail, rule_id, message, subject_id)
    }

    /// A finding at an explicit level
    pub fn at(
        level: ValidationLevel,
        rule_id: impl Into<String>,
        message: impl Into<String>,
        subject_id: Option<&str>,
    ) -> Self {
        Self {
            level,
            rule_id: rule_id.into(),
            message: message.into(),
            subject_id: subject_id.map(str::to_string),
        }
    }

    /// Whether this finding blocks its subject
    pub fn is_blocking(&self) -> bool {
        self.level == ValidationLevel::Fail
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject_id {
            Some(id) => write!(f, "[{}] {} ({}): {}", self.level, self.rule_id, id, self.message),
            None => write!(f, "[{}] {}: {}", self.level, self.rule_id, self.message),
        }
    }
}

/// Aggregated findings for one subject or batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    results: Vec<ValidationResult>,
}

impl ValidationReport {
    /// Empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one finding
    pub fn push(&mut self, result: ValidationResult) {
        self.results.push(result);
    }

    /// Highest severity seen; `Pass` when there are no findings
    pub fn level(&self) -> ValidationLevel {
        self.results
            .iter()
            .map(|r| r.level)
            .max()
            .unwrap_or(ValidationLevel::Pass)
    }

    /// Whether any finding blocks the subject
    pub fn is_blocked(&self) -> bool {
        self.results.iter().any(ValidationResult::is_blocking)
    }

    /// Blocking findings
    pub fn failures(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| r.level == ValidationLevel::Fail)
    }

    /// Non-blocking findings
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| r.level == ValidationLevel::Warn)
    }

    /// All findings in the order they were produced
    pub fn results(&self) -> &[ValidationResult] {
        &self.results
    }

    /// Consume the report
    pub fn into_results(self) -> Vec<ValidationResult> {
        self.results
    }

    /// Number of findings
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether there are no findings
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl Extend<ValidationResult> for ValidationReport {
    fn extend<T: IntoIterator<Item = ValidationResult>>(&mut self, iter: T) {
        self.results.extend(iter);
    }
}

impl From<Vec<ValidationResult>> for ValidationReport {
    fn from(results: Vec<ValidationResult>) -> Self {
        Self { results }
    }
}
