//! State manager for cursor persistence

use crate::adapters::storage::StateStorage;
use crate::core::state::cursor::Cursor;
use crate::domain::{ResourceType, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// State manager for cursor persistence
///
/// Loads and saves cursors through a [`StateStorage`] backend. Within a run the
/// write coordinator is the only caller of [`StateManager::save`]; the reset and
/// override operations exist for operators and are logged at `WARN`.
#[derive(Clone)]
pub struct StateManager {
    storage: Arc<dyn StateStorage + Send + Sync>,
}

impl StateManager {
    /// Create a new StateManager with a state storage backend
    pub fn new(storage: Arc<dyn StateStorage + Send + Sync>) -> Self {
        Self { storage }
    }

    /// Load the cursor for a resource type
    ///
    /// Returns `Ok(None)` if no cursor has been persisted yet.
    pub async fn load(&self, resource_type: &ResourceType) -> Result<Option<Cursor>> {
        self.storage.load_cursor(resource_type).await
    }

    /// Load the cursor, or create a fresh in-memory one on first extraction
    pub async fn load_or_new(&self, resource_type: &ResourceType) -> Result<Cursor> {
        Ok(self
            .load(resource_type)
            .await?
            .unwrap_or_else(|| Cursor::new(resource_type.clone())))
    }

    /// Persist a cursor
    pub async fn save(&self, cursor: &Cursor) -> Result<()> {
        tracing::debug!(
            resource_type = %cursor.resource_type,
            watermark = ?cursor.last_successful_watermark,
            rows_written_total = cursor.rows_written_total,
            "Saving cursor"
        );
        self.storage.save_cursor(cursor).await
    }

    /// All persisted cursors
    pub async fn list(&self) -> Result<Vec<Cursor>> {
        self.storage.list_cursors().await
    }

    /// Clear the watermark so the next run re-extracts everything
    ///
    /// Returns the reset cursor, or `None` if none existed.
    pub async fn reset_cursor(&self, resource_type: &ResourceType) -> Result<Option<Cursor>> {
        let Some(mut cursor) = self.load(resource_type).await? else {
            return Ok(None);
        };
        tracing::warn!(
            resource_type = %resource_type,
            previous_watermark = ?cursor.last_successful_watermark,
            "Operator reset of cursor"
        );
        cursor.set_watermark(None);
        self.storage.save_cursor(&cursor).await?;
        Ok(Some(cursor))
    }

    /// Set the watermark to an explicit value, forwards or backwards
    pub async fn override_watermark(
        &self,
        resource_type: &ResourceType,
        watermark: DateTime<Utc>,
    ) -> Result<Cursor> {
        let mut cursor = self.load_or_new(resource_type).await?;
        tracing::warn!(
            resource_type = %resource_type,
            previous_watermark = ?cursor.last_successful_watermark,
            new_watermark = %watermark,
            "Operator override of cursor watermark"
        );
        cursor.set_watermark(Some(watermark));
        self.storage.save_cursor(&cursor).await?;
        Ok(cursor)
    }
}
