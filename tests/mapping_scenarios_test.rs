//! Mapping engine scenarios: spec loading, dispatch and the transform state machine

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use strata::core::mapping::{MappingLoader, MappingSpec};
use strata::core::transform::{
    builtin_transformers, transform_batch, GenericMapper, Resolution, TransformOutcome,
    TransformRegistry, TransformStage, Transformer,
};
use strata::core::validation::ValidationLevel;
use strata::domain::{ErrorKind, Record, ResourceType, StrataError};

const OBSERVATION_V1: &str = r#"
resource_type = "Observation"
version = 1

[[columns]]
name = "id"
path = "id"

[[columns]]
name = "code"
path = "code.coding.first().code"

[[columns]]
name = "systolic"
path = "component.where(code.coding.code='8480-6').value[x].value"
type = "decimal"
"#;

fn observation_mapper() -> GenericMapper {
    GenericMapper::new(Arc::new(MappingSpec::from_toml_str(OBSERVATION_V1).unwrap()))
}

fn record(value: serde_json::Value) -> Record {
    Record::new(value)
}

#[test]
fn test_observation_code_is_flattened() {
    let mapper = observation_mapper();
    let outcome = mapper.transform(
        record(json!({
            "resourceType": "Observation",
            "id": "42",
            "code": {"coding": [{"code": "8480-6"}]}
        })),
        Utc::now(),
    );

    let row = outcome.row().expect("row emitted");
    assert_eq!(row.get("id"), Some(&json!("42")));
    assert_eq!(row.get("code"), Some(&json!("8480-6")));
    assert_eq!(row.provenance.source_resource_id, "42");
    assert_eq!(row.provenance.mapping_version, 1);
}

#[test]
fn test_empty_code_is_null_with_warning() {
    let mapper = observation_mapper();
    let outcome = mapper.transform(
        record(json!({"resourceType": "Observation", "id": "42", "code": {}})),
        Utc::now(),
    );

    match outcome {
        TransformOutcome::Row { row, warnings } => {
            assert_eq!(row.get("id"), Some(&json!("42")));
            assert_eq!(row.get("code"), Some(&serde_json::Value::Null));
            assert!(warnings
                .iter()
                .any(|w| w.level == ValidationLevel::Warn && w.rule_id == "mapping.empty"));
            assert!(warnings.iter().all(|w| w.level != ValidationLevel::Fail));
        }
        TransformOutcome::Rejected(rejected) => panic!("unexpected rejection: {rejected:?}"),
    }
}

#[test]
fn test_choice_field_inside_filtered_component() {
    let mapper = observation_mapper();
    let outcome = mapper.transform(
        record(json!({
            "resourceType": "Observation",
            "id": "bp-1",
            "code": {"coding": [{"code": "85354-9"}]},
            "component": [
                {"code": {"coding": [{"code": "8480-6"}]}, "valueQuantity": {"value": 120}},
                {"code": {"coding": [{"code": "8462-4"}]}, "valueQuantity": {"value": 80}}
            ]
        })),
        Utc::now(),
    );

    let row = outcome.row().expect("row emitted");
    assert_eq!(row.get("systolic").and_then(|v| v.as_f64()), Some(120.0));
}

#[test]
fn test_missing_intermediate_segment_is_empty_not_error() {
    let mapper = observation_mapper();
    let outcome = mapper.transform(
        record(json!({"resourceType": "Observation", "id": "42"})),
        Utc::now(),
    );

    let row = outcome.row().expect("absence is not a failure");
    assert_eq!(row.get("code"), Some(&serde_json::Value::Null));
    assert_eq!(row.get("systolic"), Some(&serde_json::Value::Null));
}

#[test]
fn test_batch_isolates_failing_records() {
    let mapper = observation_mapper();
    let records = vec![
        record(json!({"resourceType": "Observation", "id": "a", "code": {"coding": [{"code": "1-1"}]}})),
        record(json!({"resourceType": "Patient", "id": "b"})),
        record(json!({"resourceType": "Observation"})),
        record(json!({"resourceType": "Observation", "id": "d"})),
    ];

    let outcome = transform_batch(&mapper, records, Utc::now());

    assert_eq!(outcome.total(), 4);
    assert_eq!(outcome.rows.len(), 2);
    assert_eq!(outcome.rejected.len(), 2);
    for rejected in &outcome.rejected {
        assert_eq!(rejected.stage, TransformStage::Init);
        assert_eq!(rejected.kind, ErrorKind::Structural);
        assert!(!rejected.results.is_empty());
    }
}

#[test]
fn test_custom_transformer_wins_over_generic_spec() {
    let patient_spec = MappingSpec::from_toml_str(
        "resource_type = \"Patient\"\nversion = 7\n\n[[columns]]\nname = \"id\"\npath = \"id\"\n",
    )
    .unwrap();
    let registry = TransformRegistry::builder()
        .customs(builtin_transformers())
        .spec(Arc::new(patient_spec))
        .spec(Arc::new(MappingSpec::from_toml_str(OBSERVATION_V1).unwrap()))
        .build()
        .unwrap();

    let patient = ResourceType::new("Patient").unwrap();
    match registry.resolve(&patient) {
        Resolution::Custom(transformer) => {
            assert_ne!(transformer.schema().mapping_version, 7);
            let outcome = transformer.transform(
                record(json!({
                    "resourceType": "Patient",
                    "id": "p1",
                    "name": [{"use": "official", "family": "Chalmers", "given": ["Peter", "James"]}],
                    "gender": "male",
                    "birthDate": "1974-12-25"
                })),
                Utc::now(),
            );
            let row = outcome.row().expect("row emitted");
            assert_eq!(row.get("family_name"), Some(&json!("Chalmers")));
            assert_eq!(row.get("given_names"), Some(&json!(["Peter", "James"])));
        }
        other => panic!("expected custom transformer, got {other:?}"),
    }

    assert!(matches!(
        registry.resolve(&ResourceType::new("Observation").unwrap()),
        Resolution::Generic(_)
    ));
    assert!(!registry.resolve(&ResourceType::new("Encounter").unwrap()).is_supported());
}

#[test]
fn test_loader_reads_toml_and_json_and_picks_highest_version() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("observation.v1.toml"), OBSERVATION_V1).unwrap();
    std::fs::write(
        dir.path().join("observation.v2.json"),
        json!({
            "resource_type": "Observation",
            "version": 2,
            "columns": [
                {"name": "id", "path": "id"},
                {"name": "status", "path": "status"}
            ]
        })
        .to_string(),
    )
    .unwrap();
    std::fs::write(dir.path().join("README.md"), "ignored").unwrap();

    let loader = MappingLoader::new(dir.path());
    let catalog = loader.load_all().unwrap();
    assert_eq!(catalog.len(), 1);

    let observation = ResourceType::new("Observation").unwrap();
    let latest = loader.load(&observation).unwrap().expect("spec loaded");
    assert_eq!(latest.version(), 2);
    assert_eq!(catalog.load_version(&observation, 1).unwrap().columns().len(), 3);
    assert!(loader.load(&ResourceType::new("Patient").unwrap()).unwrap().is_none());
}

#[test]
fn test_malformed_spec_fails_at_load_time() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("bad.toml"),
        "resource_type = \"Observation\"\nversion = 1\n\n[[columns]]\nname = \"code\"\npath = \"code..coding\"\n",
    )
    .unwrap();

    let err = MappingLoader::new(dir.path()).load_all().unwrap_err();
    assert!(matches!(err, StrataError::Configuration(_)));
}
