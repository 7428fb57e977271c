//! Hand-written transformer for `Patient`

use crate::core::mapping::coerce;
use crate::core::transform::{MapOutput, MappedValues, Transformer};
use crate::core::validation::ValidationResult;
use crate::domain::{ColumnDef, DataType, Record, ResourceType, Result, StrataError, TableSchema};
use serde_json::Value;

/// Schema version of [`PatientTransformer`] output
pub const PATIENT_SCHEMA_VERSION: u32 = 1;

/// Flattens names, telecom, birth date and the `deceased[x]` choice field
#[derive(Debug, Clone)]
pub struct PatientTransformer {
    resource_type: ResourceType,
    schema: TableSchema,
}

impl PatientTransformer {
    /// Create the transformer
    pub fn new() -> Self {
        let resource_type = ResourceType::from_static("Patient");
        let schema = TableSchema::new(
            resource_type.clone(),
            PATIENT_SCHEMA_VERSION,
            vec![
                ColumnDef::new("id", DataType::String),
                ColumnDef::new("family_name", DataType::String),
                ColumnDef::new("given_names", DataType::String).multiple(),
                ColumnDef::new("gender", DataType::String),
                ColumnDef::new("birth_date", DataType::Date),
                ColumnDef::new("deceased", DataType::Boolean),
                ColumnDef::new("deceased_date_time", DataType::DateTime),
                ColumnDef::new("phone", DataType::String),
                ColumnDef::new("email", DataType::String),
                ColumnDef::new("managing_organization_id", DataType::String),
            ],
        );
        Self {
            resource_type,
            schema,
        }
    }
}

impl Default for PatientTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer for PatientTransformer {
    fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    fn schema(&self) -> &TableSchema {
        &self.schema
    }

    fn map(&self, record: &Record) -> Result<MapOutput> {
        let patient = record.value();
        let mut values = MappedValues::new();
        let mut findings = Vec::new();

        values.insert("id".to_string(), text(patient.get("id")));

        let name = preferred_name(patient);
        values.insert(
            "family_name".to_string(),
            text(name.and_then(|n| n.get("family"))),
        );
        let given: Vec<Value> = name
            .and_then(|n| n.get("given"))
            .and_then(Value::as_array)
            .map(|g| g.iter().filter(|v| v.is_string()).cloned().collect())
            .unwrap_or_default();
        if name.is_none() {
            findings.push(ValidationResult::warn(
                "patient.name",
                "patient has no usable name",
                record.id(),
            ));
        }
        values.insert("given_names".to_string(), Value::Array(given));

        values.insert("gender".to_string(), text(patient.get("gender")));

        let birth_date = match patient.get("birthDate") {
            Some(v) => coerce(v, DataType::Date).map_err(|e| mapping_error("birth_date", e))?,
            None => Value::Null,
        };
        values.insert("birth_date".to_string(), birth_date);

        let (deceased, deceased_at) = deceased(patient)?;
        values.insert("deceased".to_string(), deceased);
        values.insert("deceased_date_time".to_string(), deceased_at);

        values.insert("phone".to_string(), telecom(patient, "phone"));
        values.insert("email".to_string(), telecom(patient, "email"));

        let organization = patient
            .pointer("/managingOrganization/reference")
            .and_then(Value::as_str)
            .and_then(crate::core::mapping::functions::reference_id)
            .map(Value::String)
            .unwrap_or(Value::Null);
        values.insert("managing_organization_id".to_string(), organization);

        Ok(MapOutput { values, findings })
    }
}

fn mapping_error(column: &str, message: String) -> StrataError {
    StrataError::Mapping(format!("column '{column}': {message}"))
}

fn text(value: Option<&Value>) -> Value {
    value
        .and_then(Value::as_str)
        .map(|s| Value::String(s.to_string()))
        .unwrap_or(Value::Null)
}

/// `use = official` wins, then `usual`, then the first name
fn preferred_name(patient: &Value) -> Option<&Value> {
    let names = patient.get("name")?.as_array()?;
    let with_use = |wanted: &str| {
        names
            .iter()
            .find(|n| n.get("use").and_then(Value::as_str) == Some(wanted))
    };
    with_use("official").or_else(|| with_use("usual")).or_else(|| names.first())
}

/// First contact point of `system`, preferring `rank` 1 and skipping ended periods
fn telecom(patient: &Value, system: &str) -> Value {
    let Some(points) = patient.get("telecom").and_then(Value::as_array) else {
        return Value::Null;
    };
    let mut candidates: Vec<&Value> = points
        .iter()
        .filter(|p| p.get("system").and_then(Value::as_str) == Some(system))
        .filter(|p| p.pointer("/period/end").is_none())
        .collect();
    candidates.sort_by_key(|p| p.get("rank").and_then(Value::as_u64).unwrap_or(u64::MAX));
    text(candidates.first().and_then(|p| p.get("value")))
}

fn deceased(patient: &Value) -> Result<(Value, Value)> {
    if let Some(flag) = patient.get("deceasedBoolean") {
        let flag = coerce(flag, DataType::Boolean).map_err(|e| mapping_error("deceased", e))?;
        return Ok((flag, Value::Null));
    }
    if let Some(at) = patient.get("deceasedDateTime") {
        let at = coerce(at, DataType::DateTime).map_err(|e| mapping_error("deceased_date_time", e))?;
        return Ok((Value::Bool(true), at));
    }
    Ok((Value::Null, Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transform::TransformOutcome;
    use crate::domain::ErrorKind;
    use chrono::Utc;
    use serde_json::json;

    fn patient() -> Value {
        json!({
            "resourceType": "Patient",
            "id": "p1",
            "meta": {"lastUpdated": "2024-02-01T08:00:00Z"},
            "name": [
                {"use": "nickname", "given": ["Jim"]},
                {"use": "official", "family": "Chalmers", "given": ["Peter", "James"]}
            ],
            "gender": "male",
            "birthDate": "1974-12-25",
            "deceasedDateTime": "2020-01-01T10:00:00+01:00",
            "telecom": [
                {"system": "phone", "value": "(03) 5555 6473", "rank": 2},
                {"system": "phone", "value": "(03) 3410 5613", "rank": 1},
                {"system": "email", "value": "old@example.org", "period": {"end": "2014"}},
                {"system": "email", "value": "p.chalmers@example.org"}
            ],
            "managingOrganization": {"reference": "Organization/org-1"}
        })
    }

    #[test]
    fn test_patient_row() {
        let outcome = PatientTransformer::new().transform(Record::new(patient()), Utc::now());
        let row = outcome.row().expect("row");
        assert_eq!(row.get("family_name"), Some(&json!("Chalmers")));
        assert_eq!(row.get("given_names"), Some(&json!(["Peter", "James"])));
        assert_eq!(row.get("birth_date"), Some(&json!("1974-12-25")));
        assert_eq!(row.get("deceased"), Some(&json!(true)));
        assert_eq!(row.get("deceased_date_time"), Some(&json!("2020-01-01T09:00:00Z")));
        assert_eq!(row.get("phone"), Some(&json!("(03) 3410 5613")));
        assert_eq!(row.get("email"), Some(&json!("p.chalmers@example.org")));
        assert_eq!(row.get("managing_organization_id"), Some(&json!("org-1")));
    }

    #[test]
    fn test_deceased_boolean_and_absent() {
        let mut value = patient();
        let obj = value.as_object_mut().unwrap();
        obj.remove("deceasedDateTime");
        obj.insert("deceasedBoolean".to_string(), json!(false));
        let row = PatientTransformer::new()
            .transform(Record::new(value.clone()), Utc::now())
            .row()
            .cloned()
            .unwrap();
        assert_eq!(row.get("deceased"), Some(&json!(false)));
        assert_eq!(row.get("deceased_date_time"), Some(&Value::Null));

        value.as_object_mut().unwrap().remove("deceasedBoolean");
        let row = PatientTransformer::new()
            .transform(Record::new(value), Utc::now())
            .row()
            .cloned()
            .unwrap();
        assert_eq!(row.get("deceased"), Some(&Value::Null));
    }

    #[test]
    fn test_invalid_birth_date_is_mapping_error() {
        let mut value = patient();
        value["birthDate"] = json!("25/12/1974");
        match PatientTransformer::new().transform(Record::new(value), Utc::now()) {
            TransformOutcome::Rejected(rejected) => assert_eq!(rejected.kind, ErrorKind::Mapping),
            other => panic!("expected rejection, got {other:?}"),
        }
    }
}
