//! Storage abstraction traits
//!
//! The core writes through these traits and never handles storage paths or file
//! formats itself.

use crate::core::state::Cursor;
use crate::domain::{ResourceType, Result, Row, RowKey, TableSchema};
use async_trait::async_trait;
use std::collections::HashSet;

/// Output dataset for transformed rows
///
/// One logical table per resource type. The first successful append pins the
/// table's schema; later appends are checked against it by the caller.
#[async_trait]
pub trait Dataset: Send + Sync {
    /// Read the pinned schema of a resource type's table
    ///
    /// Returns `Ok(None)` when nothing has been written yet.
    async fn read_schema(&self, resource_type: &ResourceType) -> Result<Option<TableSchema>>;

    /// De-duplication keys of every row already stored for a resource type
    async fn existing_keys(&self, resource_type: &ResourceType) -> Result<HashSet<RowKey>>;

    /// Append rows, pinning `schema` if the table has none
    ///
    /// All-or-nothing: on error no row of the batch is visible to later reads.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows cannot be durably written.
    async fn append(&self, schema: &TableSchema, rows: &[Row]) -> Result<()>;

    /// Number of stored rows for a resource type
    async fn row_count(&self, resource_type: &ResourceType) -> Result<usize>;
}

/// State storage trait for cursor persistence
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Load a cursor
    ///
    /// Returns `Ok(None)` if not found.
    async fn load_cursor(&self, resource_type: &ResourceType) -> Result<Option<Cursor>>;

    /// Save (create or replace) a cursor atomically
    async fn save_cursor(&self, cursor: &Cursor) -> Result<()>;

    /// All stored cursors, ordered by resource type
    async fn list_cursors(&self) -> Result<Vec<Cursor>>;
}
