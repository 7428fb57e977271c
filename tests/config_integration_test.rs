//! Integration tests for configuration loading and validation
//!
//! Tests that touch environment variables hold `ENV_MUTEX` so they do not
//! interfere with each other.

use secrecy::ExposeSecret;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use strata::config::{load_config, load_config_str};
use strata::core::pipeline::Pipeline;
use tempfile::NamedTempFile;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

const OVERRIDE_VARS: &[&str] = &[
    "STRATA_APPLICATION_LOG_LEVEL",
    "STRATA_APPLICATION_DRY_RUN",
    "STRATA_FHIR_BASE_URL",
    "STRATA_FHIR_BEARER_TOKEN",
    "STRATA_FHIR_PAGE_SIZE",
    "STRATA_FHIR_MAX_RECORDS",
    "STRATA_MAPPING_RESOURCE_TYPES",
    "STRATA_STORAGE_OUTPUT_DIR",
    "TEST_STRATA_TOKEN",
];

fn env_lock() -> MutexGuard<'static, ()> {
    let guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    for var in OVERRIDE_VARS {
        std::env::remove_var(var);
    }
    guard
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(contents.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

#[test]
fn test_load_complete_config() {
    let _lock = env_lock();
    let file = write_config(
        r#"
[application]
log_level = "debug"
dry_run = true

[fhir]
base_url = "https://fhir.example.com/r4"
bearer_token = "token-123"
timeout_seconds = 30
page_size = 250
max_records = 5000

[fhir.retry]
max_attempts = 5
initial_delay_ms = 250
max_delay_ms = 10000
backoff_multiplier = 3.0

[fhir.rate_limit]
requests_per_second = 20
burst = 40

[mapping]
spec_dir = "/etc/strata/mappings"
resource_types = ["Patient", "Observation"]
cache_capacity = 0

[storage]
output_dir = "/data/silver"
state_file = "/data/state/cursors.json"

[logging]
local_enabled = true
local_path = "/tmp/strata"
local_rotation = "hourly"
"#,
    );

    let config = load_config(file.path()).expect("Failed to load config");

    assert_eq!(config.application.log_level, "debug");
    assert!(config.application.dry_run);

    assert_eq!(config.fhir.base_url, "https://fhir.example.com/r4");
    let token: &str = config.fhir.bearer_token.as_ref().unwrap().expose_secret().as_ref();
    assert_eq!(token, "token-123");
    assert_eq!(config.fhir.timeout_seconds, 30);
    assert_eq!(config.fhir.page_size, 250);
    assert_eq!(config.fhir.max_records, Some(5000));
    assert_eq!(config.fhir.retry.max_attempts, 5);
    assert_eq!(config.fhir.retry.backoff_multiplier, 3.0);
    assert_eq!(config.fhir.rate_limit.burst, 40);

    assert_eq!(config.mapping.spec_dir, PathBuf::from("/etc/strata/mappings"));
    assert_eq!(config.mapping.resource_types, vec!["Patient", "Observation"]);
    assert_eq!(config.mapping.cache_capacity, 0);

    assert_eq!(config.storage.output_dir, PathBuf::from("/data/silver"));
    assert!(config.logging.local_enabled);
    assert_eq!(config.logging.local_rotation, "hourly");
}

#[test]
fn test_load_minimal_config_with_defaults() {
    let _lock = env_lock();
    let config = load_config_str(
        r#"
[fhir]
base_url = "http://localhost:8080/fhir"
"#,
    )
    .expect("Failed to load config");

    assert_eq!(config.application.log_level, "info");
    assert!(!config.application.dry_run);
    assert!(config.fhir.bearer_token.is_none());
    assert_eq!(config.fhir.page_size, 100);
    assert_eq!(config.fhir.max_records, None);
    assert_eq!(config.fhir.retry.max_attempts, 4);
    assert_eq!(config.fhir.rate_limit.requests_per_second, 10);
    assert_eq!(config.mapping.spec_dir, PathBuf::from("mappings"));
    assert!(config.mapping.resource_types.is_empty());
    assert_eq!(config.mapping.cache_capacity, 1024);
    assert_eq!(config.storage.state_file, PathBuf::from("data/state/cursors.json"));
    assert!(!config.logging.local_enabled);
}

#[test]
fn test_env_var_substitution() {
    let _lock = env_lock();
    std::env::set_var("TEST_STRATA_TOKEN", "substituted-secret");

    let config = load_config_str(
        r#"
# bearer_token = "${TEST_STRATA_UNUSED}"
[fhir]
base_url = "https://fhir.example.com/r4"
bearer_token = "${TEST_STRATA_TOKEN}"
"#,
    )
    .expect("Failed to load config");

    let token: &str = config.fhir.bearer_token.as_ref().unwrap().expose_secret().as_ref();
    assert_eq!(token, "substituted-secret");
    assert!(!format!("{config:?}").contains("substituted-secret"));

    std::env::remove_var("TEST_STRATA_TOKEN");
}

#[test]
fn test_missing_env_var_is_reported() {
    let _lock = env_lock();
    let err = load_config_str(
        r#"
[fhir]
base_url = "https://fhir.example.com/r4"
bearer_token = "${TEST_STRATA_TOKEN}"
"#,
    )
    .unwrap_err();

    assert!(err.to_string().contains("TEST_STRATA_TOKEN"));
}

#[test]
fn test_env_var_overrides() {
    let _lock = env_lock();
    std::env::set_var("STRATA_APPLICATION_LOG_LEVEL", "warn");
    std::env::set_var("STRATA_APPLICATION_DRY_RUN", "true");
    std::env::set_var("STRATA_FHIR_BASE_URL", "https://override.example.com/fhir");
    std::env::set_var("STRATA_FHIR_PAGE_SIZE", "50");
    std::env::set_var("STRATA_FHIR_MAX_RECORDS", "10");
    std::env::set_var("STRATA_MAPPING_RESOURCE_TYPES", "Patient, Encounter,");
    std::env::set_var("STRATA_STORAGE_OUTPUT_DIR", "/override/silver");

    let result = load_config_str(
        r#"
[application]
log_level = "debug"

[fhir]
base_url = "https://fhir.example.com/r4"
page_size = 500
"#,
    );
    for var in OVERRIDE_VARS {
        std::env::remove_var(var);
    }
    let config = result.expect("Failed to load config");

    assert_eq!(config.application.log_level, "warn");
    assert!(config.application.dry_run);
    assert_eq!(config.fhir.base_url, "https://override.example.com/fhir");
    assert_eq!(config.fhir.page_size, 50);
    assert_eq!(config.fhir.max_records, Some(10));
    assert_eq!(config.mapping.resource_types, vec!["Patient", "Encounter"]);
    assert_eq!(config.storage.output_dir, PathBuf::from("/override/silver"));
}

#[test]
fn test_unparseable_override_is_rejected() {
    let _lock = env_lock();
    std::env::set_var("STRATA_FHIR_PAGE_SIZE", "lots");

    let result = load_config_str("[fhir]\nbase_url = \"https://fhir.example.com\"\n");
    std::env::remove_var("STRATA_FHIR_PAGE_SIZE");

    assert!(result.unwrap_err().to_string().contains("STRATA_FHIR_PAGE_SIZE"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let _lock = env_lock();

    let bad_url = load_config_str("[fhir]\nbase_url = \"fhir.example.com\"\n");
    assert!(bad_url.unwrap_err().to_string().contains("validation failed"));

    let bad_level = load_config_str(
        "[application]\nlog_level = \"loud\"\n[fhir]\nbase_url = \"https://fhir.example.com\"\n",
    );
    assert!(bad_level.is_err());

    let bad_type = load_config_str(
        "[fhir]\nbase_url = \"https://fhir.example.com\"\n[mapping]\nresource_types = [\"patient\"]\n",
    );
    assert!(bad_type.unwrap_err().to_string().contains("mapping.resource_types"));

    assert!(load_config_str("[fhir\nbase_url = 1").is_err());
    assert!(load_config("/nonexistent/strata.toml").is_err());
}

#[test]
fn test_pipeline_from_config_loads_mapping_dir() {
    let _lock = env_lock();
    let specs = tempfile::tempdir().unwrap();
    std::fs::write(
        specs.path().join("observation.toml"),
        "resource_type = \"Observation\"\nversion = 1\n\n[[columns]]\nname = \"id\"\npath = \"id\"\n",
    )
    .unwrap();
    let data = tempfile::tempdir().unwrap();

    let config = load_config_str(&format!(
        r#"
[fhir]
base_url = "https://fhir.example.com/r4"

[mapping]
spec_dir = "{}"

[storage]
output_dir = "{}"
state_file = "{}"
"#,
        specs.path().display(),
        data.path().join("silver").display(),
        data.path().join("cursors.json").display(),
    ))
    .expect("Failed to load config");

    let pipeline = Pipeline::from_config(&config).expect("pipeline builds");
    let names: Vec<&str> = pipeline.resource_types().iter().map(|rt| rt.as_str()).collect();
    assert_eq!(names, vec!["Observation", "Patient"]);
}
