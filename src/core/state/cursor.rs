//! Per-resource-type extraction cursor
//!
//! One cursor exists per resource type. It records the highest source-side
//! `meta.lastUpdated` that has been durably written, and moves forward only
//! through [`Cursor::advance`]. Rolling it back is an operator action
//! (see [`StateManager::reset_cursor`](super::StateManager::reset_cursor)).

use crate::domain::ResourceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of the last run that persisted this cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CursorStatus {
    /// No batch has been committed yet
    #[default]
    NotStarted,
    /// The last commit wrote every record of its batch
    Success,
    /// The last commit succeeded but some records were rejected
    Partial,
}

/// Extraction cursor for one resource type
///
/// # Examples
///
/// ```
/// use strata::core::state::{CursorBuilder, CursorStatus};
/// use strata::domain::ResourceType;
///
/// let cursor = CursorBuilder::new(ResourceType::new("Observation").unwrap())
///     .rows_written_total(10)
///     .build();
///
/// assert_eq!(cursor.id, "Observation");
/// assert!(cursor.last_successful_watermark.is_none());
/// assert_eq!(cursor.last_run_status, CursorStatus::NotStarted);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    /// Document id (the resource type name)
    pub id: String,

    /// Resource type this cursor tracks
    pub resource_type: ResourceType,

    /// Highest durably written source update timestamp
    pub last_successful_watermark: Option<DateTime<Utc>>,

    /// Outcome of the last committed run
    pub last_run_status: CursorStatus,

    /// Mapping version of the last committed batch
    pub mapping_version: Option<u32>,

    /// Total rows written across all runs
    pub rows_written_total: u64,

    /// When the cursor was first created
    pub created_at: DateTime<Utc>,

    /// When the cursor was last persisted
    pub updated_at: DateTime<Utc>,
}

impl Cursor {
    /// A fresh cursor with no watermark
    pub fn new(resource_type: ResourceType) -> Self {
        CursorBuilder::new(resource_type).build()
    }

    /// Whether any batch has been committed
    pub fn has_watermark(&self) -> bool {
        self.last_successful_watermark.is_some()
    }

    /// Advance after a durable write
    ///
    /// The watermark never decreases: a candidate older than the current value
    /// leaves it in place. Returns whether the watermark moved.
    pub fn advance(
        &mut self,
        candidate: Option<DateTime<Utc>>,
        rows_written: u64,
        mapping_version: u32,
        status: CursorStatus,
    ) -> bool {
        let moved = match (self.last_successful_watermark, candidate) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(current), Some(new)) => new > current,
        };
        if moved {
            self.last_successful_watermark = candidate;
        }
        self.rows_written_total += rows_written;
        self.mapping_version = Some(mapping_version);
        self.last_run_status = status;
        self.updated_at = Utc::now();
        moved
    }

    /// Replace the watermark unconditionally (operator override only)
    pub(crate) fn set_watermark(&mut self, watermark: Option<DateTime<Utc>>) {
        self.last_successful_watermark = watermark;
        if watermark.is_none() {
            self.last_run_status = CursorStatus::NotStarted;
        }
        self.updated_at = Utc::now();
    }
}

/// Builder for creating Cursor instances
pub struct CursorBuilder {
    resource_type: ResourceType,
    last_successful_watermark: Option<DateTime<Utc>>,
    last_run_status: CursorStatus,
    mapping_version: Option<u32>,
    rows_written_total: u64,
}

impl CursorBuilder {
    /// Create a new CursorBuilder
    pub fn new(resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            last_successful_watermark: None,
            last_run_status: CursorStatus::NotStarted,
            mapping_version: None,
            rows_written_total: 0,
        }
    }

    /// Set the watermark
    pub fn last_successful_watermark(mut self, watermark: DateTime<Utc>) -> Self {
        self.last_successful_watermark = Some(watermark);
        self
    }

    /// Set the last run status
    pub fn last_run_status(mut self, status: CursorStatus) -> Self {
        self.last_run_status = status;
        self
    }

    /// Set the mapping version
    pub fn mapping_version(mut self, version: u32) -> Self {
        self.mapping_version = Some(version);
        self
    }

    /// Set the total rows written
    pub fn rows_written_total(mut self, count: u64) -> Self {
        self.rows_written_total = count;
        self
    }

    /// Build the Cursor instance
    pub fn build(self) -> Cursor {
        let now = Utc::now();
        Cursor {
            id: self.resource_type.to_string(),
            resource_type: self.resource_type,
            last_successful_watermark: self.last_successful_watermark,
            last_run_status: self.last_run_status,
            mapping_version: self.mapping_version,
            rows_written_total: self.rows_written_total,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn observation() -> ResourceType {
        ResourceType::new("Observation").unwrap()
    }

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_cursor_builder() {
        let cursor = CursorBuilder::new(observation())
            .last_successful_watermark(t(3))
            .last_run_status(CursorStatus::Success)
            .mapping_version(2)
            .build();

        assert_eq!(cursor.id, "Observation");
        assert_eq!(cursor.last_successful_watermark, Some(t(3)));
        assert_eq!(cursor.mapping_version, Some(2));
        assert!(cursor.has_watermark());
    }

    #[test]
    fn test_first_advance() {
        let mut cursor = Cursor::new(observation());
        assert!(cursor.advance(Some(t(1)), 5, 1, CursorStatus::Success));
        assert_eq!(cursor.last_successful_watermark, Some(t(1)));
        assert_eq!(cursor.rows_written_total, 5);
        assert_eq!(cursor.last_run_status, CursorStatus::Success);
    }

    #[test]
    fn test_advance_is_monotonic() {
        let mut cursor = CursorBuilder::new(observation())
            .last_successful_watermark(t(5))
            .build();

        assert!(!cursor.advance(Some(t(2)), 1, 1, CursorStatus::Partial));
        assert_eq!(cursor.last_successful_watermark, Some(t(5)));
        assert_eq!(cursor.last_run_status, CursorStatus::Partial);

        assert!(!cursor.advance(None, 0, 1, CursorStatus::Success));
        assert_eq!(cursor.last_successful_watermark, Some(t(5)));

        assert!(cursor.advance(Some(t(6)), 1, 1, CursorStatus::Success));
        assert_eq!(cursor.last_successful_watermark, Some(t(6)));
        assert_eq!(cursor.rows_written_total, 2);
    }

    #[test]
    fn test_set_watermark_can_roll_back() {
        let mut cursor = CursorBuilder::new(observation())
            .last_successful_watermark(t(5))
            .last_run_status(CursorStatus::Success)
            .build();
        cursor.set_watermark(Some(t(1)));
        assert_eq!(cursor.last_successful_watermark, Some(t(1)));

        cursor.set_watermark(None);
        assert_eq!(cursor.last_run_status, CursorStatus::NotStarted);
    }

    #[test]
    fn test_cursor_serialization() {
        let cursor = CursorBuilder::new(observation())
            .last_successful_watermark(t(3))
            .rows_written_total(100)
            .build();

        let json = serde_json::to_string(&cursor).unwrap();
        assert!(json.contains("\"resource_type\":\"Observation\""));
        assert!(json.contains("\"last_run_status\":\"not_started\""));

        let back: Cursor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cursor);
    }
}
