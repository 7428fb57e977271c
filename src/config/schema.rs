//! Configuration schema types
//!
//! This module defines the configuration structure for Strata. Every section
//! validates itself; [`StrataConfig::validate`] runs them in file order.

use crate::config::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main Strata configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrataConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// FHIR server configuration
    pub fhir: FhirConfig,

    /// Mapping specification settings
    #[serde(default)]
    pub mapping: MappingConfig,

    /// Output dataset and cursor state locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StrataConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.fhir.validate()?;
        self.mapping.validate()?;
        self.storage.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Dry run mode: extract, transform and validate without writing rows or cursors
    #[serde(default)]
    pub dry_run: bool,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dry_run: false,
        }
    }
}

/// Retry configuration for FHIR requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 || self.max_attempts > 10 {
            return Err(format!(
                "fhir.retry.max_attempts must be between 1 and 10, got {}",
                self.max_attempts
            ));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(format!(
                "fhir.retry.initial_delay_ms ({}) must not exceed max_delay_ms ({})",
                self.initial_delay_ms, self.max_delay_ms
            ));
        }
        if !(self.backoff_multiplier >= 1.0) {
            return Err(format!(
                "fhir.retry.backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            ));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Client-side request rate limit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained requests per second
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Requests allowed in a burst
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl RateLimitConfig {
    fn validate(&self) -> Result<(), String> {
        if self.requests_per_second == 0 {
            return Err("fhir.rate_limit.requests_per_second must be > 0".to_string());
        }
        if self.burst == 0 {
            return Err("fhir.rate_limit.burst must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
        }
    }
}

/// FHIR server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FhirConfig {
    /// Base URL of the FHIR server (e.g. `https://fhir.example.com/r4`)
    pub base_url: String,

    /// Static bearer token (optional)
    /// Stored securely in memory and automatically zeroized on drop
    #[serde(default)]
    pub bearer_token: Option<SecretString>,

    /// Timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// `_count` requested per search page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Cap on records extracted per resource type per run (unset = no cap)
    #[serde(default)]
    pub max_records: Option<usize>,

    /// Retry configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Rate limit configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl FhirConfig {
    fn validate(&self) -> Result<(), String> {
        use secrecy::ExposeSecret;

        if self.base_url.is_empty() {
            return Err("fhir.base_url cannot be empty".to_string());
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("fhir.base_url must start with http:// or https://".to_string());
        }

        if let Some(token) = &self.bearer_token {
            if token.expose_secret().is_empty() {
                return Err("fhir.bearer_token cannot be empty when set".to_string());
            }
        }

        if self.timeout_seconds == 0 {
            return Err("fhir.timeout_seconds must be > 0".to_string());
        }

        if !(1..=1000).contains(&self.page_size) {
            return Err(format!(
                "fhir.page_size must be between 1 and 1000, got {}",
                self.page_size
            ));
        }

        if self.max_records == Some(0) {
            return Err("fhir.max_records must be > 0 when set".to_string());
        }

        self.retry.validate()?;
        self.rate_limit.validate()?;
        Ok(())
    }
}

impl Default for FhirConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/fhir".to_string(),
            bearer_token: None,
            timeout_seconds: default_timeout_seconds(),
            page_size: default_page_size(),
            max_records: None,
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Mapping specification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Directory holding `*.toml` / `*.json` mapping specifications
    #[serde(default = "default_spec_dir")]
    pub spec_dir: PathBuf,

    /// Resource types to run (empty = every loaded spec and custom transformer)
    #[serde(default)]
    pub resource_types: Vec<String>,

    /// Path evaluator result cache capacity (0 disables the cache)
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl MappingConfig {
    fn validate(&self) -> Result<(), String> {
        if self.spec_dir.as_os_str().is_empty() {
            return Err("mapping.spec_dir cannot be empty".to_string());
        }
        for name in &self.resource_types {
            crate::domain::ResourceType::new(name.as_str())
                .map_err(|e| format!("mapping.resource_types: {e}"))?;
        }
        Ok(())
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            spec_dir: default_spec_dir(),
            resource_types: vec![],
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// Output and state storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of the silver dataset
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Cursor state document
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

impl StorageConfig {
    fn validate(&self) -> Result<(), String> {
        if self.output_dir.as_os_str().is_empty() {
            return Err("storage.output_dir cannot be empty".to_string());
        }
        if self.state_file.as_os_str().is_empty() {
            return Err("storage.state_file cannot be empty".to_string());
        }
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            state_file: default_state_file(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local JSON file logging
    #[serde(default)]
    pub local_enabled: bool,

    /// Directory for log files
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log file rotation (daily, hourly, never)
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        if self.local_enabled && self.local_path.is_empty() {
            return Err("logging.local_path cannot be empty when local_enabled".to_string());
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_page_size() -> usize {
    100
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_requests_per_second() -> u32 {
    10
}

fn default_burst() -> u32 {
    10
}

fn default_spec_dir() -> PathBuf {
    PathBuf::from("mappings")
}

fn default_cache_capacity() -> usize {
    1024
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/silver")
}

fn default_state_file() -> PathBuf {
    PathBuf::from("data/state/cursors.json")
}

fn default_local_path() -> String {
    "/var/log/strata".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;

    #[test]
    fn test_application_config_validation() {
        let mut config = ApplicationConfig {
            log_level: "info".to_string(),
            dry_run: false,
        };

        assert!(config.validate().is_ok());

        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fhir_config_validation() {
        let mut config = FhirConfig {
            base_url: "https://fhir.example.com/r4".to_string(),
            bearer_token: Some(secret_string("token".to_string())),
            ..FhirConfig::default()
        };
        assert!(config.validate().is_ok());

        config.base_url = "fhir.example.com".to_string();
        assert!(config.validate().unwrap_err().contains("http://"));

        config.base_url = "https://fhir.example.com/r4".to_string();
        config.bearer_token = Some(secret_string(String::new()));
        assert!(config.validate().is_err());

        config.bearer_token = None;
        config.page_size = 0;
        assert!(config.validate().is_err());

        config.page_size = 100;
        config.max_records = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_config_validation() {
        let mut config = RetryConfig::default();
        assert!(config.validate().is_ok());

        config.max_attempts = 0;
        assert!(config.validate().is_err());

        config.max_attempts = 3;
        config.initial_delay_ms = 60_000;
        assert!(config.validate().is_err());

        config.initial_delay_ms = 100;
        config.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_limit_validation() {
        let mut config = RateLimitConfig::default();
        assert!(config.validate().is_ok());
        config.burst = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mapping_config_rejects_bad_resource_type() {
        let config = MappingConfig {
            resource_types: vec!["observation".to_string()],
            ..MappingConfig::default()
        };
        assert!(config.validate().unwrap_err().contains("mapping.resource_types"));
    }

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert!(!config.local_enabled);
        assert_eq!(config.local_path, "/var/log/strata");
        assert_eq!(config.local_rotation, "daily");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        assert_eq!(default_log_level(), "info");
        assert_eq!(default_page_size(), 100);
        assert_eq!(default_max_attempts(), 4);
        assert_eq!(default_spec_dir(), PathBuf::from("mappings"));
        assert_eq!(default_state_file(), PathBuf::from("data/state/cursors.json"));
    }
}
