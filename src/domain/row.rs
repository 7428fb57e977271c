//! Transformed rows and their provenance

use crate::domain::ids::ResourceType;
use crate::domain::schema::{EXTRACTED_AT, MAPPING_VERSION, SOURCE_LAST_UPDATED, SOURCE_RESOURCE_ID};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Where a row came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Logical id of the source resource
    pub source_resource_id: String,
    /// Mapping version that produced the row
    pub mapping_version: u32,
    /// When the source record was extracted
    pub extracted_at: DateTime<Utc>,
    /// `meta.lastUpdated` of the source record, if it had one
    pub source_last_updated: Option<DateTime<Utc>>,
}

/// Identity used to de-duplicate rows on replay
///
/// A replay of the same resource version produces the same key; a genuine update
/// of the resource carries a newer `source_last_updated` and is appended.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey {
    /// Logical id of the source resource
    pub source_resource_id: String,
    /// `meta.lastUpdated` of the source record
    pub source_last_updated: Option<DateTime<Utc>>,
}

impl RowKey {
    /// Read the key back out of a stored row document
    pub fn from_stored(doc: &Value) -> Option<Self> {
        let source_resource_id = doc.get(SOURCE_RESOURCE_ID)?.as_str()?.to_string();
        let source_last_updated = doc
            .get(SOURCE_LAST_UPDATED)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Some(Self {
            source_resource_id,
            source_last_updated,
        })
    }
}

/// One flat output row
///
/// Values are scalars, lists of scalars, or `Null`. Column order follows the
/// declaring schema, not this map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Resource type of the source record
    pub resource_type: ResourceType,
    /// Provenance tags
    pub provenance: Provenance,
    /// Mapped column values
    pub values: BTreeMap<String, Value>,
}

impl Row {
    /// De-duplication key of this row
    pub fn key(&self) -> RowKey {
        RowKey {
            source_resource_id: self.provenance.source_resource_id.clone(),
            source_last_updated: self.provenance.source_last_updated,
        }
    }

    /// Value of a mapped column
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Flatten provenance and values into one JSON object for storage
    pub fn to_document(&self) -> Value {
        let mut doc = Map::new();
        doc.insert(
            SOURCE_RESOURCE_ID.to_string(),
            Value::String(self.provenance.source_resource_id.clone()),
        );
        doc.insert(
            MAPPING_VERSION.to_string(),
            Value::from(self.provenance.mapping_version),
        );
        doc.insert(
            EXTRACTED_AT.to_string(),
            Value::String(self.provenance.extracted_at.to_rfc3339()),
        );
        doc.insert(
            SOURCE_LAST_UPDATED.to_string(),
            self.provenance
                .source_last_updated
                .map(|dt| Value::String(dt.to_rfc3339()))
                .unwrap_or(Value::Null),
        );
        for (name, value) in &self.values {
            doc.insert(name.clone(), value.clone());
        }
        Value::Object(doc)
    }
}
