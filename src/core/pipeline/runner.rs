//! Pipeline runner - drives every configured resource type through
//! extraction, transformation and commit

use super::manifest::{ResourceRunReport, RunManifest, RunStatus};
use crate::adapters::storage::{Dataset, FileStateStorage, LocalDataset, StateStorage};
use crate::config::StrataConfig;
use crate::core::extract::Extractor;
use crate::core::mapping::MappingLoader;
use crate::core::state::StateManager;
use crate::core::transform::{builtin_transformers, transform_batch, Resolution, TransformRegistry};
use crate::core::write::{CommitBatch, CommitStatus, WriteCoordinator};
use crate::domain::{ErrorKind, ResourceType, Result, StrataError};
use crate::{log_run_complete, log_run_start};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

/// Ingestion pipeline
///
/// Resource types run one after another. A failure in one resource type is
/// recorded in the manifest and never stops the others.
pub struct Pipeline {
    extractor: Extractor,
    registry: TransformRegistry,
    writer: WriteCoordinator,
    state: StateManager,
    resource_types: Vec<ResourceType>,
}

impl Pipeline {
    /// Assemble a pipeline from its parts
    ///
    /// An empty `resource_types` list runs every type the registry knows.
    pub fn new(
        extractor: Extractor,
        registry: TransformRegistry,
        writer: WriteCoordinator,
        state: StateManager,
        resource_types: Vec<ResourceType>,
    ) -> Self {
        let resource_types = if resource_types.is_empty() {
            registry.resource_types()
        } else {
            resource_types
        };
        Self {
            extractor,
            registry,
            writer,
            state,
            resource_types,
        }
    }

    /// Build the pipeline described by a configuration
    ///
    /// Loads every mapping spec from `mapping.spec_dir`, registers the built-in
    /// custom transformers and writes through the local storage adapters.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Configuration`] if the configuration is invalid, a
    /// mapping spec fails to load, or a resource type name is malformed.
    pub fn from_config(config: &StrataConfig) -> Result<Self> {
        config.validate().map_err(StrataError::Configuration)?;

        let catalog = MappingLoader::new(&config.mapping.spec_dir).load_all()?;
        let registry = TransformRegistry::builder()
            .customs(builtin_transformers())
            .catalog(&catalog)
            .cache_capacity(config.mapping.cache_capacity)
            .build()?;

        let resource_types = config
            .mapping
            .resource_types
            .iter()
            .map(|name| ResourceType::new(name.as_str()).map_err(StrataError::Configuration))
            .collect::<Result<Vec<_>>>()?;

        let dataset: Arc<dyn Dataset> = Arc::new(LocalDataset::new(&config.storage.output_dir));
        let state_storage: Arc<dyn StateStorage + Send + Sync> =
            Arc::new(FileStateStorage::new(&config.storage.state_file));
        let state = StateManager::new(state_storage);
        let writer = WriteCoordinator::new(dataset, state.clone(), config.application.dry_run);

        Ok(Self::new(
            Extractor::from_config(&config.fhir)?,
            registry,
            writer,
            state,
            resource_types,
        ))
    }

    /// Resource types this pipeline runs, in order
    pub fn resource_types(&self) -> &[ResourceType] {
        &self.resource_types
    }

    /// Run every resource type and return the manifest
    pub async fn run(&self) -> RunManifest {
        let mut manifest = RunManifest::new(self.writer.is_dry_run());
        tracing::info!(
            run_id = %manifest.run_id,
            resource_types = self.resource_types.len(),
            dry_run = manifest.dry_run,
            "Starting ingestion run"
        );

        for resource_type in &self.resource_types {
            let report = self.run_resource_type(resource_type).await;
            manifest.insert(resource_type.as_str(), report);
        }

        manifest.finish();
        manifest.log_summary();
        manifest
    }

    /// Extract, transform and commit one resource type
    pub async fn run_resource_type(&self, resource_type: &ResourceType) -> ResourceRunReport {
        let start = Instant::now();
        let mut report = ResourceRunReport::new(RunStatus::Success);

        let transformer = match self.registry.resolve(resource_type) {
            Resolution::NotSupported(rt) => {
                tracing::warn!(resource_type = %rt, "No transformer or mapping spec; skipping");
                report.status = RunStatus::Skipped;
                report.count_error(ErrorKind::NotSupported);
                report.error = Some(format!("no transformer or mapping spec for {rt}"));
                return finish(report, resource_type, start);
            }
            resolution => match resolution.transformer() {
                Some(t) => t,
                None => return finish(report, resource_type, start),
            },
        };
        report.mapping_version = Some(transformer.schema().mapping_version);

        let mut cursor = match self.state.load_or_new(resource_type).await {
            Ok(cursor) => cursor,
            Err(e) => {
                report.fail(e.kind(), format!("cannot load cursor: {e}"));
                return finish(report, resource_type, start);
            }
        };
        report.watermark_before = cursor.last_successful_watermark;
        report.watermark_after = cursor.last_successful_watermark;
        log_run_start!(resource_type, cursor.last_successful_watermark);

        let extracted_at = Utc::now();
        let batch = match self.extractor.extract(resource_type, &cursor).collect().await {
            Ok(batch) => batch,
            Err(e) => {
                let error = StrataError::from(e);
                tracing::error!(resource_type = %resource_type, error = %error, "Extraction aborted");
                report.fail(error.kind(), error.to_string());
                return finish(report, resource_type, start);
            }
        };
        report.extracted = batch.records.len();

        let outcome = transform_batch(transformer.as_ref(), batch.records, extracted_at);
        report.transformed = outcome.rows.len();
        report.warnings = outcome.warnings.len();
        let rejected = outcome.rejected.len();
        let violations = outcome
            .rejected
            .iter()
            .filter(|r| r.kind == ErrorKind::SchemaViolation)
            .count();
        report.add_rejects(outcome.rejected);

        // Output outside the pinned columns means the transformer is broken, not the record
        if violations > 0 {
            tracing::error!(
                resource_type = %resource_type,
                violations,
                "Transformer produced undeclared columns; nothing committed"
            );
            report.fail(
                ErrorKind::SchemaViolation,
                format!("{violations} record(s) produced columns outside the declared schema"),
            );
            return finish(report, resource_type, start);
        }

        let result = self
            .writer
            .commit(
                &mut cursor,
                CommitBatch {
                    schema: transformer.schema().clone(),
                    rows: outcome.rows,
                    new_watermark: batch.new_watermark,
                    rejected,
                },
            )
            .await;

        report.written = result.written;
        report.duplicates_skipped = result.duplicates_skipped;
        report.watermark_after = cursor.last_successful_watermark;
        report.status = match result.status {
            CommitStatus::Success => RunStatus::Success,
            CommitStatus::Partial => RunStatus::Partial,
            CommitStatus::Failed => {
                report.fail(
                    result.error_kind.unwrap_or(ErrorKind::Other),
                    result.message.unwrap_or_default(),
                );
                RunStatus::Failed
            }
        };

        finish(report, resource_type, start)
    }
}

fn finish(mut report: ResourceRunReport, resource_type: &ResourceType, start: Instant) -> ResourceRunReport {
    let elapsed = start.elapsed();
    report.duration_ms = elapsed.as_millis() as u64;
    log_run_complete!(resource_type, report.status, report.written, elapsed);
    report
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("registry", &self.registry)
            .field("writer", &self.writer)
            .field("resource_types", &self.resource_types)
            .finish_non_exhaustive()
    }
}
