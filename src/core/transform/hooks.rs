//! Pre- and post-mapping hooks
//!
//! Hooks are pure functions: a pre-hook receives the record and returns the
//! record to map, a post-hook receives the mapped values and returns the values
//! to enforce. They are shared across records and must not touch shared state.

use crate::domain::Record;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Column values produced by the map step
pub type MappedValues = BTreeMap<String, Value>;

/// Adjusts a record before mapping; an `Err` rejects the record as a mapping failure
pub type PreHook = Arc<dyn Fn(Record) -> Result<Record, String> + Send + Sync>;

/// Adjusts mapped values before schema enforcement
pub type PostHook = Arc<dyn Fn(MappedValues) -> MappedValues + Send + Sync>;

/// Hooks attached to one resource type, applied in registration order
#[derive(Clone, Default)]
pub struct Hooks {
    pre: Vec<PreHook>,
    post: Vec<PostHook>,
}

impl Hooks {
    /// No hooks
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pre-hook
    pub fn with_pre(mut self, hook: PreHook) -> Self {
        self.pre.push(hook);
        self
    }

    /// Append a post-hook
    pub fn with_post(mut self, hook: PostHook) -> Self {
        self.post.push(hook);
        self
    }

    /// Append every hook of `other` after this set's hooks
    pub fn merge(mut self, other: Hooks) -> Self {
        self.pre.extend(other.pre);
        self.post.extend(other.post);
        self
    }

    /// Whether no hook is attached
    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }

    /// Run every pre-hook in order
    pub fn apply_pre(&self, record: Record) -> Result<Record, String> {
        self.pre.iter().try_fold(record, |record, hook| hook(record))
    }

    /// Run every post-hook in order
    pub fn apply_post(&self, values: MappedValues) -> MappedValues {
        self.post.iter().fold(values, |values, hook| hook(values))
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("pre", &self.pre.len())
            .field("post", &self.post.len())
            .finish()
    }
}

/// Post-hook that trims and lower-cases string values of `columns`
///
/// Lists are normalized element-wise; other values are left alone.
pub fn standardize_codes(columns: Vec<String>) -> PostHook {
    Arc::new(move |mut values: MappedValues| {
        for column in &columns {
            if let Some(value) = values.get_mut(column) {
                normalize(value);
            }
        }
        values
    })
}

fn normalize(value: &mut Value) {
    match value {
        Value::String(s) => *s = s.trim().to_lowercase(),
        Value::Array(items) => items.iter_mut().for_each(normalize),
        _ => {}
    }
}

/// Pre-hook that drops the XHTML narrative (`text`) and `contained` resources
pub fn drop_narrative() -> PreHook {
    Arc::new(|record: Record| {
        let mut value = record.into_value();
        if let Some(obj) = value.as_object_mut() {
            obj.remove("text");
            obj.remove("contained");
        }
        Ok(Record::new(value))
    })
}
