//! Mapping specification loader
//!
//! Specs live as `*.toml` or `*.json` files in one directory. The loader reads
//! the whole directory once into a [`MappingCatalog`]; the catalog is immutable,
//! so every row produced in a run carries one consistent mapping version.

use super::spec::MappingSpec;
use crate::domain::{ResourceType, Result, StrataError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reads mapping specs from a directory
#[derive(Debug, Clone)]
pub struct MappingLoader {
    dir: PathBuf,
}

impl MappingLoader {
    /// Create a loader over `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory the loader reads
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load every spec in the directory
    ///
    /// # Errors
    ///
    /// Fails on the first unreadable or malformed file, and when two files declare
    /// the same `(resource_type, version)` with different content.
    pub fn load_all(&self) -> Result<MappingCatalog> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            StrataError::Configuration(format!(
                "cannot read mapping directory {}: {e}",
                self.dir.display()
            ))
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .filter(|p| matches!(extension(p), Some("toml") | Some("json")))
            .collect();
        paths.sort();

        let mut catalog = MappingCatalog::default();
        for path in paths {
            let spec = load_file(&path)?;
            tracing::debug!(
                path = %path.display(),
                resource_type = %spec.resource_type(),
                version = spec.version(),
                "Loaded mapping spec"
            );
            catalog.insert(spec)?;
        }

        tracing::info!(
            dir = %self.dir.display(),
            resource_types = catalog.len(),
            "Mapping catalog loaded"
        );
        Ok(catalog)
    }

    /// Load the highest version for one resource type
    pub fn load(&self, resource_type: &ResourceType) -> Result<Option<Arc<MappingSpec>>> {
        Ok(self.load_all()?.load(resource_type))
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

/// Parse one spec file by extension
pub fn load_file(path: &Path) -> Result<MappingSpec> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        StrataError::Configuration(format!("cannot read mapping spec {}: {e}", path.display()))
    })?;
    let parsed = match extension(path) {
        Some("json") => MappingSpec::from_json_str(&source),
        _ => MappingSpec::from_toml_str(&source),
    };
    parsed.map_err(|e| match e {
        StrataError::Configuration(msg) => {
            StrataError::Configuration(format!("{}: {msg}", path.display()))
        }
        other => other,
    })
}

/// Immutable set of loaded specs keyed by `(resource_type, version)`
#[derive(Debug, Clone, Default)]
pub struct MappingCatalog {
    specs: BTreeMap<ResourceType, BTreeMap<u32, Arc<MappingSpec>>>,
}

impl MappingCatalog {
    /// Build a catalog from already-parsed specs
    pub fn from_specs(specs: impl IntoIterator<Item = MappingSpec>) -> Result<Self> {
        let mut catalog = Self::default();
        for spec in specs {
            catalog.insert(spec)?;
        }
        Ok(catalog)
    }

    fn insert(&mut self, spec: MappingSpec) -> Result<()> {
        let versions = self.specs.entry(spec.resource_type().clone()).or_default();
        if let Some(existing) = versions.get(&spec.version()) {
            if existing.content_hash() != spec.content_hash() {
                return Err(StrataError::Configuration(format!(
                    "mapping spec {} version {} is declared twice with different content",
                    spec.resource_type(),
                    spec.version()
                )));
            }
            return Ok(());
        }
        versions.insert(spec.version(), Arc::new(spec));
        Ok(())
    }

    /// Highest version for a resource type
    pub fn load(&self, resource_type: &ResourceType) -> Option<Arc<MappingSpec>> {
        self.specs
            .get(resource_type)
            .and_then(|versions| versions.values().next_back())
            .cloned()
    }

    /// A specific version
    pub fn load_version(&self, resource_type: &ResourceType, version: u32) -> Option<Arc<MappingSpec>> {
        self.specs
            .get(resource_type)
            .and_then(|versions| versions.get(&version))
            .cloned()
    }

    /// Resource types with at least one spec
    pub fn resource_types(&self) -> impl Iterator<Item = &ResourceType> {
        self.specs.keys()
    }

    /// Number of resource types
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn spec_toml(version: u32, code_path: &str) -> String {
        format!(
            "resource_type = \"Observation\"\nversion = {version}\n\n[[columns]]\nname = \"id\"\npath = \"id\"\n\n[[columns]]\nname = \"code\"\npath = \"{code_path}\"\n"
        )
    }

    #[test]
    fn test_load_highest_version() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("obs_v1.toml"), spec_toml(1, "code.coding.code")).unwrap();
        fs::write(dir.path().join("obs_v2.toml"), spec_toml(2, "code.coding.first().code")).unwrap();
        fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let loader = MappingLoader::new(dir.path());
        let observation = ResourceType::new("Observation").unwrap();
        let spec = loader.load(&observation).unwrap().unwrap();
        assert_eq!(spec.version(), 2);

        let catalog = loader.load_all().unwrap();
        assert_eq!(catalog.load_version(&observation, 1).unwrap().version(), 1);
        assert!(catalog
            .load(&ResourceType::new("Patient").unwrap())
            .is_none());
    }

    #[test]
    fn test_json_spec_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("patient.json"),
            r#"{"resource_type": "Patient", "version": 1, "columns": [{"name": "id", "path": "id"}]}"#,
        )
        .unwrap();
        let catalog = MappingLoader::new(dir.path()).load_all().unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_conflicting_version_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.toml"), spec_toml(1, "code.coding.code")).unwrap();
        fs::write(dir.path().join("b.toml"), spec_toml(1, "code.text")).unwrap();
        let err = MappingLoader::new(dir.path()).load_all().unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn test_identical_duplicate_is_accepted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.toml"), spec_toml(1, "code.coding.code")).unwrap();
        fs::write(dir.path().join("b.toml"), spec_toml(1, "code.coding.code")).unwrap();
        assert_eq!(MappingLoader::new(dir.path()).load_all().unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_spec_fails_loading() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bad.toml"), spec_toml(1, "code..x")).unwrap();
        let err = MappingLoader::new(dir.path()).load_all().unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_missing_directory() {
        let err = MappingLoader::new("/nonexistent/strata/specs").load_all().unwrap_err();
        assert!(matches!(err, StrataError::Configuration(_)));
    }
}
