//! Raw FHIR resource records
//!
//! A [`Record`] wraps one resource exactly as the source API returned it. The
//! tree is never mutated in place; hooks produce new trees, and the dispatch key
//! (`resourceType`) is read once at construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One FHIR resource instance
///
/// # Examples
///
/// ```
/// use strata::domain::Record;
/// use serde_json::json;
///
/// let record = Record::new(json!({
///     "resourceType": "Observation",
///     "id": "42",
///     "meta": {"lastUpdated": "2024-03-01T10:00:00Z"}
/// }));
///
/// assert_eq!(record.resource_type(), Some("Observation"));
/// assert_eq!(record.id(), Some("42"));
/// assert!(record.last_updated().is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    value: Value,
}

impl Record {
    /// Wrap a raw JSON resource
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// The raw resource tree
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consume the record and return the raw tree
    pub fn into_value(self) -> Value {
        self.value
    }

    /// The `resourceType` dispatch key, if present and a string
    pub fn resource_type(&self) -> Option<&str> {
        self.value.get("resourceType").and_then(Value::as_str)
    }

    /// The logical id, if present and a string
    pub fn id(&self) -> Option<&str> {
        self.value.get("id").and_then(Value::as_str)
    }

    /// `meta.versionId`, if present
    pub fn version_id(&self) -> Option<&str> {
        self.value
            .get("meta")
            .and_then(|m| m.get("versionId"))
            .and_then(Value::as_str)
    }

    /// Raw `meta.lastUpdated` string, if present
    pub fn last_updated_raw(&self) -> Option<&str> {
        self.value
            .get("meta")
            .and_then(|m| m.get("lastUpdated"))
            .and_then(Value::as_str)
    }

    /// `meta.lastUpdated` parsed as an RFC 3339 instant
    ///
    /// Returns `None` when absent or unparsable; such records never move a watermark.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated_raw()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Identity used for caching path results
    ///
    /// Only records with a resource type, an id and a version marker
    /// (`meta.versionId` or `meta.lastUpdated`) have one; two records with the same
    /// identity are assumed to have identical content.
    pub fn identity(&self) -> Option<RecordIdentity> {
        let resource_type = self.resource_type()?;
        let id = self.id()?;
        let version = self.version_id().or_else(|| self.last_updated_raw())?;
        Some(RecordIdentity {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
            version: version.to_string(),
        })
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

/// Content identity of a record version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordIdentity {
    /// Resource type
    pub resource_type: String,
    /// Logical id
    pub id: String,
    /// Version marker (`meta.versionId`, falling back to `meta.lastUpdated`)
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_accessors() {
        let record = Record::new(json!({
            "resourceType": "Patient",
            "id": "p1",
            "meta": {"versionId": "3", "lastUpdated": "2024-01-02T03:04:05+01:00"}
        }));

        assert_eq!(record.resource_type(), Some("Patient"));
        assert_eq!(record.id(), Some("p1"));
        assert_eq!(record.version_id(), Some("3"));
        assert_eq!(
            record.last_updated().unwrap().to_rfc3339(),
            "2024-01-02T02:04:05+00:00"
        );
    }

    #[test]
    fn test_record_missing_fields() {
        let record = Record::new(json!({"resourceType": 5}));
        assert_eq!(record.resource_type(), None);
        assert_eq!(record.id(), None);
        assert_eq!(record.last_updated(), None);
        assert!(record.identity().is_none());
    }

    #[test]
    fn test_unparsable_last_updated() {
        let record = Record::new(json!({
            "resourceType": "Patient",
            "id": "p1",
            "meta": {"lastUpdated": "yesterday"}
        }));
        assert_eq!(record.last_updated_raw(), Some("yesterday"));
        assert_eq!(record.last_updated(), None);
    }

    #[test]
    fn test_identity_requires_version_marker() {
        let unversioned = Record::new(json!({"resourceType": "Patient", "id": "p1"}));
        assert!(unversioned.identity().is_none());

        let versioned = Record::new(json!({
            "resourceType": "Patient",
            "id": "p1",
            "meta": {"lastUpdated": "2024-01-01T00:00:00Z"}
        }));
        let identity = versioned.identity().unwrap();
        assert_eq!(identity.version, "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_record_serializes_transparently() {
        let raw = json!({"resourceType": "Patient", "id": "p1"});
        let record = Record::new(raw.clone());
        assert_eq!(serde_json::to_value(&record).unwrap(), raw);
    }
}
