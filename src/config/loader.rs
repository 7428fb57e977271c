//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::StrataConfig;
use super::secret::secret_string;
use crate::domain::errors::StrataError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into StrataConfig
/// 4. Applies environment variable overrides (STRATA_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - A referenced environment variable is not set
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use strata::config::loader::load_config;
///
/// let config = load_config("strata.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<StrataConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(StrataError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        StrataError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    load_config_str(&contents)
}

/// Same as [`load_config`] for configuration text already in memory
pub fn load_config_str(contents: &str) -> Result<StrataConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: StrataConfig = toml::from_str(&contents)
        .map_err(|e| StrataError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        StrataError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are copied untouched.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| StrataError::Configuration(e.to_string()))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    processed_line = processed_line.replace(&cap[0], &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(StrataError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(val) => val.trim().parse().map(Some).map_err(|_| {
            StrataError::Configuration(format!("Invalid value for {name}: '{val}'"))
        }),
        Err(_) => Ok(None),
    }
}

/// Applies environment variable overrides using the STRATA_* prefix
///
/// Environment variables follow the pattern: STRATA_<SECTION>_<KEY>
/// For example: STRATA_FHIR_BASE_URL, STRATA_APPLICATION_DRY_RUN
fn apply_env_overrides(config: &mut StrataConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("STRATA_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = env_parse("STRATA_APPLICATION_DRY_RUN")? {
        config.application.dry_run = val;
    }

    // FHIR overrides
    if let Ok(val) = std::env::var("STRATA_FHIR_BASE_URL") {
        config.fhir.base_url = val;
    }
    if let Ok(val) = std::env::var("STRATA_FHIR_BEARER_TOKEN") {
        config.fhir.bearer_token = Some(secret_string(val));
    }
    if let Some(val) = env_parse("STRATA_FHIR_TIMEOUT_SECONDS")? {
        config.fhir.timeout_seconds = val;
    }
    if let Some(val) = env_parse("STRATA_FHIR_PAGE_SIZE")? {
        config.fhir.page_size = val;
    }
    if let Some(val) = env_parse("STRATA_FHIR_MAX_RECORDS")? {
        config.fhir.max_records = Some(val);
    }
    if let Some(val) = env_parse("STRATA_FHIR_RETRY_MAX_ATTEMPTS")? {
        config.fhir.retry.max_attempts = val;
    }
    if let Some(val) = env_parse("STRATA_FHIR_RATE_LIMIT_REQUESTS_PER_SECOND")? {
        config.fhir.rate_limit.requests_per_second = val;
    }

    // Mapping overrides
    if let Ok(val) = std::env::var("STRATA_MAPPING_SPEC_DIR") {
        config.mapping.spec_dir = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("STRATA_MAPPING_RESOURCE_TYPES") {
        config.mapping.resource_types = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    // Storage overrides
    if let Ok(val) = std::env::var("STRATA_STORAGE_OUTPUT_DIR") {
        config.storage.output_dir = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("STRATA_STORAGE_STATE_FILE") {
        config.storage.state_file = PathBuf::from(val);
    }

    // Logging overrides
    if let Some(val) = env_parse("STRATA_LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = val;
    }
    if let Ok(val) = std::env::var("STRATA_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}
