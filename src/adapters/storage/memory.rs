//! In-memory storage backends
//!
//! Used by tests and embedding hosts. [`InMemoryDataset::fail_next_append`] injects a
//! single write failure to exercise the commit failure path.

use super::traits::{Dataset, StateStorage};
use crate::core::state::Cursor;
use crate::domain::{ResourceType, Result, Row, RowKey, StorageError, StrataError, TableSchema};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Table {
    schema: Option<TableSchema>,
    rows: Vec<Row>,
}

/// Dataset held in process memory
#[derive(Debug, Default)]
pub struct InMemoryDataset {
    tables: RwLock<HashMap<ResourceType, Table>>,
    fail_next: AtomicBool,
}

impl InMemoryDataset {
    /// Empty dataset
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `append` fail without writing anything
    pub fn fail_next_append(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Snapshot of stored rows for a resource type
    pub async fn rows(&self, resource_type: &ResourceType) -> Vec<Row> {
        self.tables
            .read()
            .await
            .get(resource_type)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Dataset for InMemoryDataset {
    async fn read_schema(&self, resource_type: &ResourceType) -> Result<Option<TableSchema>> {
        Ok(self
            .tables
            .read()
            .await
            .get(resource_type)
            .and_then(|t| t.schema.clone()))
    }

    async fn existing_keys(&self, resource_type: &ResourceType) -> Result<HashSet<RowKey>> {
        Ok(self
            .tables
            .read()
            .await
            .get(resource_type)
            .map(|t| t.rows.iter().map(Row::key).collect())
            .unwrap_or_default())
    }

    async fn append(&self, schema: &TableSchema, rows: &[Row]) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StrataError::Storage(StorageError::WriteFailed(
                "injected append failure".to_string(),
            )));
        }
        let mut tables = self.tables.write().await;
        let table = tables.entry(schema.resource_type.clone()).or_default();
        if table.schema.is_none() {
            table.schema = Some(schema.clone());
        }
        table.rows.extend_from_slice(rows);
        Ok(())
    }

    async fn row_count(&self, resource_type: &ResourceType) -> Result<usize> {
        Ok(self
            .tables
            .read()
            .await
            .get(resource_type)
            .map(|t| t.rows.len())
            .unwrap_or(0))
    }
}

/// Cursor storage held in process memory
#[derive(Debug, Default)]
pub struct InMemoryStateStorage {
    cursors: RwLock<BTreeMap<ResourceType, Cursor>>,
}

impl InMemoryStateStorage {
    /// Empty storage
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStorage for InMemoryStateStorage {
    async fn load_cursor(&self, resource_type: &ResourceType) -> Result<Option<Cursor>> {
        Ok(self.cursors.read().await.get(resource_type).cloned())
    }

    async fn save_cursor(&self, cursor: &Cursor) -> Result<()> {
        self.cursors
            .write()
            .await
            .insert(cursor.resource_type.clone(), cursor.clone());
        Ok(())
    }

    async fn list_cursors(&self) -> Result<Vec<Cursor>> {
        Ok(self.cursors.read().await.values().cloned().collect())
    }
}
