//! Mapping-spec driven transformer

use super::hooks::{standardize_codes, Hooks, MappedValues};
use super::{MapOutput, Transformer};
use crate::core::mapping::{coerce, ColumnSpec, MappingSpec};
use crate::core::path::PathEvaluator;
use crate::core::validation::{BusinessRule, ValidationResult};
use crate::domain::{Record, ResourceType, Result, StrataError, TableSchema};
use serde_json::Value;
use std::sync::Arc;

/// Transformer that evaluates every column of a [`MappingSpec`] in declaration order
#[derive(Debug, Clone)]
pub struct GenericMapper {
    spec: Arc<MappingSpec>,
    evaluator: Arc<PathEvaluator>,
    hooks: Hooks,
}

impl GenericMapper {
    /// Wrap a spec with an uncached evaluator
    ///
    /// When the spec lists `standardize` columns, the [`standardize_codes`]
    /// post-hook is attached first.
    pub fn new(spec: Arc<MappingSpec>) -> Self {
        Self::with_evaluator(spec, Arc::new(PathEvaluator::new()))
    }

    /// Wrap a spec with a shared evaluator
    pub fn with_evaluator(spec: Arc<MappingSpec>, evaluator: Arc<PathEvaluator>) -> Self {
        let mut hooks = Hooks::new();
        if !spec.standardize().is_empty() {
            hooks = hooks.with_post(standardize_codes(spec.standardize().to_vec()));
        }
        Self {
            spec,
            evaluator,
            hooks,
        }
    }

    /// Attach additional hooks after the built-in ones
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = self.hooks.merge(hooks);
        self
    }

    /// The wrapped spec
    pub fn spec(&self) -> &MappingSpec {
        &self.spec
    }

    fn map_column(
        &self,
        column: &ColumnSpec,
        record: &Record,
        findings: &mut Vec<ValidationResult>,
    ) -> Result<Value> {
        let subject = record.id();
        let data_type = column.storage_type();
        let values: Vec<Value> = column
            .expression
            .evaluate(record, &self.evaluator)
            .into_iter()
            .filter(|v| !v.is_null())
            .collect();

        if values.is_empty() {
            if column.required {
                findings.push(ValidationResult::fail(
                    "mapping.required",
                    format!("required column '{}' produced no value", column.name),
                    subject,
                ));
            } else {
                findings.push(ValidationResult::warn(
                    "mapping.empty",
                    format!("column '{}' produced no value", column.name),
                    subject,
                ));
            }
            return Ok(Value::Null);
        }

        let coerce_one = |value: &Value| {
            coerce(value, data_type)
                .map_err(|e| StrataError::Mapping(format!("column '{}': {e}", column.name)))
        };

        if column.multiple {
            return values
                .iter()
                .map(coerce_one)
                .collect::<Result<Vec<_>>>()
                .map(Value::Array);
        }

        if values.len() > 1 {
            findings.push(ValidationResult::warn(
                "mapping.multiple",
                format!(
                    "column '{}' produced {} values; keeping the first",
                    column.name,
                    values.len()
                ),
                subject,
            ));
        }
        coerce_one(&values[0])
    }
}

impl Transformer for GenericMapper {
    fn resource_type(&self) -> &ResourceType {
        self.spec.resource_type()
    }

    fn schema(&self) -> &TableSchema {
        self.spec.schema()
    }

    fn rules(&self) -> &[BusinessRule] {
        self.spec.rules()
    }

    fn pre_hook(&self, record: Record) -> Result<Record> {
        self.hooks.apply_pre(record).map_err(StrataError::Mapping)
    }

    fn map(&self, record: &Record) -> Result<MapOutput> {
        let mut findings = Vec::new();
        let mut values = MappedValues::new();
        for column in self.spec.columns() {
            let value = self.map_column(column, record, &mut findings)?;
            values.insert(column.name.clone(), value);
        }
        Ok(MapOutput { values, findings })
    }

    fn post_hook(&self, values: MappedValues) -> MappedValues {
        self.hooks.apply_post(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transform::TransformOutcome;
    use crate::core::validation::ValidationLevel;
    use crate::domain::ErrorKind;
    use chrono::Utc;
    use serde_json::json;

    const OBSERVATION_V1: &str = r#"
resource_type = "Observation"
version = 1
standardize = ["status"]

[[columns]]
name = "id"
path = "id"

[[columns]]
name = "status"
path = "status"

[[columns]]
name = "code"
path = "code.coding.first().code"

[[columns]]
name = "codes"
path = "code.coding.code"
multiple = true

[[columns]]
name = "value"
path = "value[x].value"
type = "decimal"

[[columns]]
name = "subject_id"
function = "reference_id"
args = ["subject.reference"]
required = true
"#;

    fn mapper() -> GenericMapper {
        GenericMapper::new(Arc::new(MappingSpec::from_toml_str(OBSERVATION_V1).unwrap()))
    }

    fn observation() -> Record {
        Record::new(json!({
            "resourceType": "Observation",
            "id": "42",
            "meta": {"lastUpdated": "2024-03-01T10:00:00Z"},
            "status": " FINAL ",
            "code": {"coding": [{"code": "8480-6"}, {"code": "271649006"}]},
            "valueQuantity": {"value": 120, "unit": "mmHg"},
            "subject": {"reference": "Patient/p1"}
        }))
    }

    #[test]
    fn test_generic_mapping() {
        let outcome = mapper().transform(observation(), Utc::now());
        let row = outcome.row().expect("row");
        assert_eq!(row.get("id"), Some(&json!("42")));
        assert_eq!(row.get("status"), Some(&json!("final")));
        assert_eq!(row.get("code"), Some(&json!("8480-6")));
        assert_eq!(row.get("codes"), Some(&json!(["8480-6", "271649006"])));
        assert_eq!(row.get("value"), Some(&json!(120.0)));
        assert_eq!(row.get("subject_id"), Some(&json!("p1")));
        assert_eq!(row.provenance.mapping_version, 1);
    }

    #[test]
    fn test_missing_required_column_fails() {
        let mut value = observation().into_value();
        value.as_object_mut().unwrap().remove("subject");
        let outcome = mapper().transform(Record::new(value), Utc::now());
        let rejected = outcome.rejected().expect("rejected");
        assert_eq!(rejected.kind, ErrorKind::Validation);
        assert!(rejected
            .results
            .iter()
            .any(|r| r.rule_id == "mapping.required" && r.level == ValidationLevel::Fail));
    }

    #[test]
    fn test_complex_value_without_json_type_is_mapping_error() {
        let spec = MappingSpec::from_toml_str(
            r#"
resource_type = "Observation"
version = 1

[[columns]]
name = "code"
path = "code"
"#,
        )
        .unwrap();
        let outcome = GenericMapper::new(Arc::new(spec)).transform(observation(), Utc::now());
        match outcome {
            TransformOutcome::Rejected(rejected) => assert_eq!(rejected.kind, ErrorKind::Mapping),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_extra_values_warn_and_keep_first() {
        let spec = MappingSpec::from_toml_str(
            r#"
resource_type = "Observation"
version = 1

[[columns]]
name = "code"
path = "code.coding.code"
"#,
        )
        .unwrap();
        let outcome = GenericMapper::new(Arc::new(spec)).transform(observation(), Utc::now());
        let TransformOutcome::Row { row, warnings } = outcome else {
            panic!("expected a row");
        };
        assert_eq!(row.get("code"), Some(&json!("8480-6")));
        assert!(warnings.iter().any(|w| w.rule_id == "mapping.multiple"));
    }

    #[test]
    fn test_user_hooks_run_after_standardize() {
        let hooks = Hooks::new().with_post(Arc::new(|mut values: MappedValues| {
            if let Some(status) = values.get_mut("status") {
                let upper = status.as_str().map(str::to_uppercase);
                if let Some(upper) = upper {
                    *status = json!(upper);
                }
            }
            values
        }));
        let outcome = mapper().with_hooks(hooks).transform(observation(), Utc::now());
        assert_eq!(outcome.row().unwrap().get("status"), Some(&json!("FINAL")));
    }
}
