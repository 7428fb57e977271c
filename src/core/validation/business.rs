//! Business rules over mapped rows
//!
//! Rules are declared per resource type in the mapping document:
//!
//! ```toml
//! [[rules]]
//! id = "status-allowed"
//! field = "status"
//! constraint = "allowed"
//! values = ["final", "amended"]
//!
//! [[rules]]
//! id = "systolic-range"
//! field = "value"
//! constraint = "range"
//! min = 0
//! max = 300
//! level = "warn"
//! ```
//!
//! `Null` values only violate `not_null`; list values are checked element by element.

use super::{ValidationLevel, ValidationResult};
use crate::domain::Row;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declarative form of a rule as it appears in a mapping document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Stable rule identifier
    pub id: String,
    /// Column the rule applies to
    pub field: String,
    /// Constraint and its parameters
    #[serde(flatten)]
    pub constraint: ConstraintSpec,
    /// Severity when violated
    #[serde(default = "default_rule_level")]
    pub level: ValidationLevel,
}

fn default_rule_level() -> ValidationLevel {
    ValidationLevel::Fail
}

/// Declarative constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "constraint", rename_all = "snake_case")]
pub enum ConstraintSpec {
    /// Value must be present
    NotNull,
    /// String value must match the pattern
    Regex {
        /// Regular expression
        pattern: String,
    },
    /// Value must be one of a fixed set
    Allowed {
        /// Permitted values
        values: Vec<Value>,
    },
    /// Numeric value must fall inside the inclusive bounds
    Range {
        /// Lower bound
        #[serde(default)]
        min: Option<f64>,
        /// Upper bound
        #[serde(default)]
        max: Option<f64>,
    },
}

/// Compiled constraint
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Value must be present
    NotNull,
    /// String value must match
    Regex(Regex),
    /// Value must be one of these
    Allowed(Vec<Value>),
    /// Inclusive numeric bounds
    Range {
        /// Lower bound
        min: Option<f64>,
        /// Upper bound
        max: Option<f64>,
    },
}

/// A compiled rule ready to run against rows
#[derive(Debug, Clone)]
pub struct BusinessRule {
    /// Stable rule identifier
    pub id: String,
    /// Column the rule applies to
    pub field: String,
    /// Compiled constraint
    pub constraint: Constraint,
    /// Severity when violated
    pub level: ValidationLevel,
}

impl BusinessRule {
    /// Compile a declared rule
    ///
    /// Fails on an invalid regex, an empty allowed set, inverted range bounds or a
    /// `pass` level.
    pub fn compile(spec: RuleSpec) -> Result<Self, String> {
        if spec.id.trim().is_empty() {
            return Err("rule id cannot be empty".to_string());
        }
        if spec.level == ValidationLevel::Pass {
            return Err(format!("rule '{}': level must be 'warn' or 'fail'", spec.id));
        }

        let constraint = match spec.constraint {
            ConstraintSpec::NotNull => Constraint::NotNull,
            ConstraintSpec::Regex { pattern } => {
                let anchored = format!("^(?:{pattern})$");
                let regex = Regex::new(&anchored)
                    .map_err(|e| format!("rule '{}': invalid regex: {e}", spec.id))?;
                Constraint::Regex(regex)
            }
            ConstraintSpec::Allowed { values } => {
                if values.is_empty() {
                    return Err(format!("rule '{}': allowed set cannot be empty", spec.id));
                }
                Constraint::Allowed(values)
            }
            ConstraintSpec::Range { min, max } => {
                if min.is_none() && max.is_none() {
                    return Err(format!("rule '{}': range needs min or max", spec.id));
                }
                if let (Some(lo), Some(hi)) = (min, max) {
                    if lo > hi {
                        return Err(format!("rule '{}': min {lo} is greater than max {hi}", spec.id));
                    }
                }
                Constraint::Range { min, max }
            }
        };

        Ok(Self {
            id: spec.id,
            field: spec.field,
            constraint,
            level: spec.level,
        })
    }

    /// Check one row; returns a finding per violating value
    pub fn check(&self, row: &Row) -> Vec<ValidationResult> {
        let subject = Some(row.provenance.source_resource_id.as_str());
        let value = row.get(&self.field).unwrap_or(&Value::Null);

        if let Constraint::NotNull = self.constraint {
            let missing = match value {
                Value::Null => true,
                Value::Array(items) => items.iter().all(Value::is_null),
                _ => false,
            };
            return if missing {
                vec![self.finding(format!("{} is null", self.field), subject)]
            } else {
                Vec::new()
            };
        }

        let items: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };

        items
            .into_iter()
            .filter(|v| !v.is_null())
            .filter_map(|v| self.violation(v))
            .map(|message| self.finding(message, subject))
            .collect()
    }

    fn violation(&self, value: &Value) -> Option<String> {
        match &self.constraint {
            Constraint::NotNull => None,
            Constraint::Regex(regex) => {
                let text = scalar_text(value);
                (!regex.is_match(&text)).then(|| {
                    format!("{} value '{text}' does not match {}", self.field, regex.as_str())
                })
            }
            Constraint::Allowed(values) => (!values.iter().any(|allowed| loose_eq(allowed, value)))
                .then(|| format!("{} value {value} is not an allowed value", self.field)),
            Constraint::Range { min, max } => match as_number(value) {
                None => Some(format!("{} value {value} is not numeric", self.field)),
                Some(n) if min.is_some_and(|lo| n < lo) || max.is_some_and(|hi| n > hi) => {
                    Some(format!(
                        "{} value {n} is outside [{}, {}]",
                        self.field,
                        bound(*min),
                        bound(*max)
                    ))
                }
                Some(_) => None,
            },
        }
    }

    fn finding(&self, message: String, subject: Option<&str>) -> ValidationResult {
        ValidationResult::at(self.level, self.id.clone(), message, subject)
    }
}

/// Run every rule against a row and collect all findings
pub fn validate_business(row: &Row, rules: &[BusinessRule]) -> Vec<ValidationResult> {
    rules.iter().flat_map(|rule| rule.check(row)).collect()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn bound(b: Option<f64>) -> String {
    b.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Provenance, ResourceType};
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;
    use test_case::test_case;

    fn row(values: Value) -> Row {
        let values: BTreeMap<String, Value> = serde_json::from_value(values).unwrap();
        Row {
            resource_type: ResourceType::new("Observation").unwrap(),
            provenance: Provenance {
                source_resource_id: "obs-1".to_string(),
                mapping_version: 1,
                extracted_at: Utc::now(),
                source_last_updated: None,
            },
            values,
        }
    }

    fn rule(toml_src: &str) -> BusinessRule {
        let spec: RuleSpec = toml::from_str(toml_src).unwrap();
        BusinessRule::compile(spec).unwrap()
    }

    #[test]
    fn test_rule_spec_from_toml() {
        let spec: RuleSpec = toml::from_str(
            r#"
            id = "range"
            field = "value"
            constraint = "range"
            min = 0
            max = 300
            level = "warn"
            "#,
        )
        .unwrap();
        assert_eq!(
            spec.constraint,
            ConstraintSpec::Range {
                min: Some(0.0),
                max: Some(300.0)
            }
        );
        assert_eq!(spec.level, ValidationLevel::Warn);
    }

    #[test]
    fn test_default_level_is_fail() {
        let r = rule("id = \"nn\"\nfield = \"status\"\nconstraint = \"not_null\"");
        assert_eq!(r.level, ValidationLevel::Fail);
    }

    #[test_case(json!({"status": null}), 1 ; "null")]
    #[test_case(json!({}), 1 ; "missing column")]
    #[test_case(json!({"status": [null]}), 1 ; "list of nulls")]
    #[test_case(json!({"status": "final"}), 0 ; "present")]
    fn test_not_null(values: Value, expected: usize) {
        let r = rule("id = \"nn\"\nfield = \"status\"\nconstraint = \"not_null\"");
        assert_eq!(r.check(&row(values)).len(), expected);
    }

    #[test_case(json!({"code": "8480-6"}), 0 ; "matches")]
    #[test_case(json!({"code": "x8480-6"}), 1 ; "anchored")]
    #[test_case(json!({"code": ["1-1", "bad", "2-2"]}), 1 ; "list elements")]
    #[test_case(json!({"code": null}), 0 ; "null skipped")]
    fn test_regex(values: Value, expected: usize) {
        let r = rule("id = \"re\"\nfield = \"code\"\nconstraint = \"regex\"\npattern = '\\d+-\\d'");
        assert_eq!(r.check(&row(values)).len(), expected);
    }

    #[test_case(json!({"status": "final"}), 0 ; "allowed")]
    #[test_case(json!({"status": "draft"}), 1 ; "not allowed")]
    fn test_allowed(values: Value, expected: usize) {
        let r = rule("id = \"al\"\nfield = \"status\"\nconstraint = \"allowed\"\nvalues = [\"final\", \"amended\"]");
        assert_eq!(r.check(&row(values)).len(), expected);
    }

    #[test_case(json!({"value": 120}), 0 ; "inside")]
    #[test_case(json!({"value": 300.0}), 0 ; "inclusive upper")]
    #[test_case(json!({"value": 301}), 1 ; "above")]
    #[test_case(json!({"value": -1}), 1 ; "below")]
    #[test_case(json!({"value": "120"}), 0 ; "numeric string")]
    #[test_case(json!({"value": "high"}), 1 ; "not numeric")]
    fn test_range(values: Value, expected: usize) {
        let r = rule("id = \"rg\"\nfield = \"value\"\nconstraint = \"range\"\nmin = 0\nmax = 300");
        assert_eq!(r.check(&row(values)).len(), expected);
    }

    #[test]
    fn test_all_rules_evaluated() {
        let rules = vec![
            rule("id = \"nn\"\nfield = \"status\"\nconstraint = \"not_null\""),
            rule("id = \"rg\"\nfield = \"value\"\nconstraint = \"range\"\nmax = 10\nlevel = \"warn\""),
        ];
        let results = validate_business(&row(json!({"status": null, "value": 11})), &rules);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].level, ValidationLevel::Fail);
        assert_eq!(results[1].level, ValidationLevel::Warn);
        assert_eq!(results[1].subject_id.as_deref(), Some("obs-1"));
    }

    #[test_case("id = \"x\"\nfield = \"a\"\nconstraint = \"regex\"\npattern = \"(\"" ; "bad regex")]
    #[test_case("id = \"x\"\nfield = \"a\"\nconstraint = \"allowed\"\nvalues = []" ; "empty allowed")]
    #[test_case("id = \"x\"\nfield = \"a\"\nconstraint = \"range\"\nmin = 5\nmax = 1" ; "inverted range")]
    #[test_case("id = \"x\"\nfield = \"a\"\nconstraint = \"range\"" ; "unbounded range")]
    #[test_case("id = \"x\"\nfield = \"a\"\nconstraint = \"not_null\"\nlevel = \"pass\"" ; "pass level")]
    fn test_compile_errors(src: &str) {
        let spec: RuleSpec = toml::from_str(src).unwrap();
        assert!(BusinessRule::compile(spec).is_err());
    }
}
