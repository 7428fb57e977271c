//! Path expression language
//!
//! A small navigation and filter language over nested FHIR JSON:
//!
//! - dotted navigation: `code.coding.code`
//! - list flattening and indexing: `name[].given`, `identifier[0].value`
//! - choice fields: `value[x]` probes `valueQuantity`, `valueString`, ...
//! - filtering: `telecom.where(system='phone')`
//! - terminal functions: `first()`, `last()`, `exists()`, `empty()`, `count()`
//!
//! Absence is a normal outcome: evaluation never fails, it returns an empty list.
//!
//! # Examples
//!
//! ```
//! use strata::core::path::PathEvaluator;
//! use serde_json::json;
//!
//! let record = json!({"code": {"coding": [{"code": "8480-6"}]}});
//! let values = PathEvaluator::new().evaluate_str(&record, "code.coding.first().code").unwrap();
//! assert_eq!(values, vec![json!("8480-6")]);
//! ```

pub mod cache;
pub mod eval;
pub mod parser;

pub use cache::EvalCache;
pub use eval::CHOICE_SUFFIXES;
pub use parser::{CompareOp, PathExpr, PathParseError, Predicate, Step};

use crate::domain::Record;
use serde_json::Value;
use std::borrow::Cow;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Evaluates parsed expressions, optionally through a bounded result cache
#[derive(Debug, Default)]
pub struct PathEvaluator {
    cache: Option<EvalCache>,
}

impl PathEvaluator {
    /// Evaluator without a cache
    pub fn new() -> Self {
        Self { cache: None }
    }

    /// Evaluator with an LRU cache of `capacity` results; `0` disables caching
    pub fn with_cache(capacity: usize) -> Self {
        Self {
            cache: NonZeroUsize::new(capacity).map(EvalCache::new),
        }
    }

    /// The result cache, if enabled
    pub fn cache(&self) -> Option<&EvalCache> {
        self.cache.as_ref()
    }

    /// Evaluate an expression against a record
    ///
    /// Results for records with an identity are served from the cache when present.
    pub fn evaluate(&self, record: &Record, expr: &PathExpr) -> Vec<Value> {
        let (Some(cache), Some(identity)) = (&self.cache, record.identity()) else {
            return self.evaluate_value(record.value(), expr);
        };

        if let Some(hit) = cache.get(expr.source(), &identity) {
            return hit.as_ref().clone();
        }
        let values = self.evaluate_value(record.value(), expr);
        cache.put(expr.source(), &identity, Arc::new(values.clone()));
        values
    }

    /// Evaluate an expression against an arbitrary JSON value, bypassing the cache
    pub fn evaluate_value(&self, value: &Value, expr: &PathExpr) -> Vec<Value> {
        eval::evaluate_steps(value, expr.steps())
            .into_iter()
            .map(Cow::into_owned)
            .collect()
    }

    /// Parse and evaluate in one call
    pub fn evaluate_str(&self, value: &Value, source: &str) -> Result<Vec<Value>, PathParseError> {
        let expr = PathExpr::parse(source)?;
        Ok(self.evaluate_value(value, &expr))
    }
}
