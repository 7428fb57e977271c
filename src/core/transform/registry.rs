//! Resource type to transformer dispatch
//!
//! The registry is built once per run and never changes afterwards. Resolution
//! order is fixed: a custom transformer wins over a mapping spec for the same
//! resource type, and a type with neither is reported as not supported.

use super::generic::GenericMapper;
use super::hooks::Hooks;
use super::Transformer;
use crate::core::mapping::{MappingCatalog, MappingSpec};
use crate::core::path::PathEvaluator;
use crate::domain::{ResourceType, Result, StrataError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of [`TransformRegistry::resolve`]
#[derive(Clone)]
pub enum Resolution {
    /// A registered custom transformer
    Custom(Arc<dyn Transformer>),
    /// A generic mapper wrapping the resource type's mapping spec
    Generic(Arc<GenericMapper>),
    /// Nothing can transform this type; the run records it and skips it
    NotSupported(ResourceType),
}

impl Resolution {
    /// The transformer to drive, if any
    pub fn transformer(&self) -> Option<Arc<dyn Transformer>> {
        match self {
            Resolution::Custom(t) => Some(Arc::clone(t)),
            Resolution::Generic(mapper) => Some(Arc::clone(mapper) as Arc<dyn Transformer>),
            Resolution::NotSupported(_) => None,
        }
    }

    /// Whether the type resolved to a transformer
    pub fn is_supported(&self) -> bool {
        !matches!(self, Resolution::NotSupported(_))
    }
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Custom(t) => f
                .debug_tuple("Custom")
                .field(&t.resource_type().as_str())
                .finish(),
            Resolution::Generic(mapper) => f
                .debug_tuple("Generic")
                .field(&mapper.spec().resource_type().as_str())
                .field(&mapper.spec().version())
                .finish(),
            Resolution::NotSupported(rt) => f.debug_tuple("NotSupported").field(&rt.as_str()).finish(),
        }
    }
}

/// Immutable dispatch table
#[derive(Clone, Default)]
pub struct TransformRegistry {
    custom: BTreeMap<ResourceType, Arc<dyn Transformer>>,
    generic: BTreeMap<ResourceType, Arc<GenericMapper>>,
}

impl TransformRegistry {
    /// Start building a registry
    pub fn builder() -> TransformRegistryBuilder {
        TransformRegistryBuilder::new()
    }

    /// Select the transformer for a resource type
    pub fn resolve(&self, resource_type: &ResourceType) -> Resolution {
        if let Some(custom) = self.custom.get(resource_type) {
            return Resolution::Custom(Arc::clone(custom));
        }
        if let Some(mapper) = self.generic.get(resource_type) {
            return Resolution::Generic(Arc::clone(mapper));
        }
        Resolution::NotSupported(resource_type.clone())
    }

    /// Every resource type with a transformer, sorted
    pub fn resource_types(&self) -> Vec<ResourceType> {
        let mut types: Vec<ResourceType> = self
            .custom
            .keys()
            .chain(self.generic.keys())
            .cloned()
            .collect();
        types.sort();
        types.dedup();
        types
    }
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("custom", &self.custom.keys().map(ResourceType::as_str).collect::<Vec<_>>())
            .field("generic", &self.generic.keys().map(ResourceType::as_str).collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`TransformRegistry`]
///
/// # Example
///
/// ```
/// use strata::core::mapping::MappingSpec;
/// use strata::core::transform::{builtin_transformers, Resolution, TransformRegistry};
/// use strata::domain::ResourceType;
/// use std::sync::Arc;
///
/// # fn example() -> strata::domain::Result<()> {
/// let spec = MappingSpec::from_toml_str(r#"
/// resource_type = "Observation"
/// version = 1
///
/// [[columns]]
/// name = "id"
/// path = "id"
/// "#)?;
///
/// let registry = TransformRegistry::builder()
///     .customs(builtin_transformers())
///     .spec(Arc::new(spec))
///     .build()?;
///
/// let rt = ResourceType::new("Observation").unwrap();
/// assert!(matches!(registry.resolve(&rt), Resolution::Generic(_)));
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct TransformRegistryBuilder {
    custom: Vec<Arc<dyn Transformer>>,
    specs: Vec<Arc<MappingSpec>>,
    hooks: Vec<(ResourceType, Hooks)>,
    cache_capacity: usize,
}

impl TransformRegistryBuilder {
    /// Empty builder with the path cache disabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom transformer
    pub fn custom(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.custom.push(transformer);
        self
    }

    /// Register several custom transformers
    pub fn customs(mut self, transformers: impl IntoIterator<Item = Arc<dyn Transformer>>) -> Self {
        self.custom.extend(transformers);
        self
    }

    /// Register a mapping spec
    pub fn spec(mut self, spec: Arc<MappingSpec>) -> Self {
        self.specs.push(spec);
        self
    }

    /// Register the highest version of every spec in a catalog
    pub fn catalog(mut self, catalog: &MappingCatalog) -> Self {
        self.specs
            .extend(catalog.resource_types().filter_map(|rt| catalog.load(rt)));
        self
    }

    /// Attach hooks to the generic mapper of a resource type
    pub fn hooks(mut self, resource_type: ResourceType, hooks: Hooks) -> Self {
        self.hooks.push((resource_type, hooks));
        self
    }

    /// Capacity of the path result cache shared by generic mappers; `0` disables it
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Build the registry
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Configuration`] when two custom transformers or two
    /// specs claim the same resource type, or when hooks target a resource type
    /// without a generic mapper.
    pub fn build(self) -> Result<TransformRegistry> {
        let mut custom = BTreeMap::new();
        for transformer in self.custom {
            let rt = transformer.resource_type().clone();
            if custom.insert(rt.clone(), transformer).is_some() {
                return Err(StrataError::Configuration(format!(
                    "custom transformer for {rt} registered twice"
                )));
            }
        }

        let mut specs: BTreeMap<ResourceType, Arc<MappingSpec>> = BTreeMap::new();
        for spec in self.specs {
            let rt = spec.resource_type().clone();
            if let Some(existing) = specs.get(&rt) {
                if existing.content_hash() != spec.content_hash() {
                    return Err(StrataError::Configuration(format!(
                        "more than one mapping spec registered for {rt} (versions {} and {})",
                        existing.version(),
                        spec.version()
                    )));
                }
                continue;
            }
            specs.insert(rt, spec);
        }

        let mut hooks: BTreeMap<ResourceType, Hooks> = BTreeMap::new();
        for (rt, h) in self.hooks {
            if custom.contains_key(&rt) || !specs.contains_key(&rt) {
                return Err(StrataError::Configuration(format!(
                    "hooks registered for {rt}, which is not handled by a mapping spec"
                )));
            }
            let merged = hooks.remove(&rt).unwrap_or_default().merge(h);
            hooks.insert(rt, merged);
        }

        let evaluator = Arc::new(PathEvaluator::with_cache(self.cache_capacity));
        let generic = specs
            .into_iter()
            .map(|(rt, spec)| {
                let mut mapper = GenericMapper::with_evaluator(spec, Arc::clone(&evaluator));
                if let Some(h) = hooks.remove(&rt) {
                    mapper = mapper.with_hooks(h);
                }
                (rt, Arc::new(mapper))
            })
            .collect();

        for rt in custom.keys() {
            tracing::debug!(resource_type = %rt, "Registered custom transformer");
        }

        Ok(TransformRegistry { custom, generic })
    }
}
