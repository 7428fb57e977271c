//! Local filesystem storage backends
//!
//! [`LocalDataset`] keeps one JSON Lines file per resource type
//! (`<dir>/<Type>.jsonl`) next to a pinned schema sidecar (`<dir>/<Type>.schema.json`).
//! [`FileStateStorage`] keeps every cursor in one JSON document.
//!
//! Documents are replaced through a synced temporary file renamed over the
//! target. Row files are only ever appended to: one synced write per batch,
//! truncated back to the previous length when the batch fails.

use super::traits::{Dataset, StateStorage};
use crate::core::state::Cursor;
use crate::domain::{ResourceType, Result, Row, RowKey, StorageError, StrataError, TableSchema};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

fn write_err(path: &Path, e: impl std::fmt::Display) -> StrataError {
    StrataError::Storage(StorageError::WriteFailed(format!("{}: {e}", path.display())))
}

fn read_err(path: &Path, e: impl std::fmt::Display) -> StrataError {
    StrataError::Storage(StorageError::ReadFailed(format!("{}: {e}", path.display())))
}

fn corrupt(path: &Path, e: impl std::fmt::Display) -> StrataError {
    StrataError::Storage(StorageError::Corrupt(format!("{}: {e}", path.display())))
}

/// Read a file, treating "not found" as `None`
async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(read_err(path, e)),
    }
}

async fn write_and_sync(file: &mut File, contents: &[u8]) -> std::io::Result<()> {
    file.write_all(contents).await?;
    file.sync_all().await
}

/// Flush a directory entry so a create or rename inside it survives a crash
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<()> {
    let handle = File::open(dir).await.map_err(|e| write_err(dir, e))?;
    handle.sync_all().await.map_err(|e| write_err(dir, e))
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Write to a synced temp file, rename it over `path`, then sync the directory
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = parent_dir(path);
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| write_err(dir, e))?;

    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)
        .await
        .map_err(|e| write_err(&temp_path, e))?;
    write_and_sync(&mut file, contents)
        .await
        .map_err(|e| write_err(&temp_path, e))?;
    drop(file);

    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|e| write_err(path, e))?;
    sync_dir(dir).await
}

async fn ends_with_newline(path: &Path, len: u64) -> Result<bool> {
    let mut reader = File::open(path).await.map_err(|e| read_err(path, e))?;
    reader
        .seek(SeekFrom::Start(len.saturating_sub(1)))
        .await
        .map_err(|e| read_err(path, e))?;
    let mut last = [0u8; 1];
    reader.read_exact(&mut last).await.map_err(|e| read_err(path, e))?;
    Ok(last[0] == b'\n')
}

/// Append `contents` to the file at `path` and sync it
///
/// A trailing partial line left by an interrupted write is cut off first. If
/// the write fails the file is truncated back to its previous length. Returns
/// that length so a later failure can undo the append too.
async fn append_synced(path: &Path, contents: &[u8]) -> Result<u64> {
    let dir = parent_dir(path);
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| write_err(dir, e))?;

    let created = !tokio::fs::try_exists(path).await.map_err(|e| write_err(path, e))?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| write_err(path, e))?;
    let mut original = file.metadata().await.map_err(|e| write_err(path, e))?.len();

    if original > 0 && !ends_with_newline(path, original).await? {
        let existing = tokio::fs::read(path).await.map_err(|e| read_err(path, e))?;
        let keep = existing.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
        tracing::warn!(
            path = %path.display(),
            discarded_bytes = existing.len() - keep,
            "Discarding unterminated trailing row"
        );
        original = keep as u64;
        file.set_len(original).await.map_err(|e| write_err(path, e))?;
    }

    if let Err(e) = write_and_sync(&mut file, contents).await {
        if let Err(undo) = file.set_len(original).await {
            tracing::error!(path = %path.display(), error = %undo, "Cannot truncate failed append");
        }
        return Err(write_err(path, e));
    }
    if created {
        sync_dir(dir).await?;
    }
    Ok(original)
}

async fn truncate(path: &Path, len: u64) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(|e| write_err(path, e))?;
    file.set_len(len).await.map_err(|e| write_err(path, e))?;
    file.sync_all().await.map_err(|e| write_err(path, e))
}

/// JSON Lines dataset in a local directory
#[derive(Debug)]
pub struct LocalDataset {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalDataset {
    /// Create a dataset rooted at `dir`; the directory is created on first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of a resource type's row file
    pub fn rows_path(&self, resource_type: &ResourceType) -> PathBuf {
        self.dir.join(format!("{resource_type}.jsonl"))
    }

    /// Path of a resource type's schema sidecar
    pub fn schema_path(&self, resource_type: &ResourceType) -> PathBuf {
        self.dir.join(format!("{resource_type}.schema.json"))
    }

    async fn read_rows(&self, resource_type: &ResourceType) -> Result<Vec<serde_json::Value>> {
        let path = self.rows_path(resource_type);
        let Some(contents) = read_optional(&path).await? else {
            return Ok(Vec::new());
        };
        let terminated = contents.ends_with('\n');
        let lines: Vec<&str> = contents.lines().collect();
        let last = lines.len().saturating_sub(1);

        let mut rows = Vec::with_capacity(lines.len());
        for (n, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(row) => rows.push(row),
                // an interrupted append; the next append cuts it off
                Err(_) if n == last && !terminated => {
                    tracing::warn!(path = %path.display(), line = n + 1, "Ignoring unterminated trailing row");
                }
                Err(e) => return Err(corrupt(&path, format!("line {}: {e}", n + 1))),
            }
        }
        Ok(rows)
    }

    async fn pin_schema(&self, schema: &TableSchema) -> Result<()> {
        let path = self.schema_path(&schema.resource_type);
        let doc = serde_json::to_vec_pretty(schema)?;
        write_atomic(&path, &doc).await?;
        tracing::info!(
            resource_type = %schema.resource_type,
            mapping_version = schema.mapping_version,
            path = %path.display(),
            "Pinned dataset schema"
        );
        Ok(())
    }
}

#[async_trait]
impl Dataset for LocalDataset {
    async fn read_schema(&self, resource_type: &ResourceType) -> Result<Option<TableSchema>> {
        let path = self.schema_path(resource_type);
        match read_optional(&path).await? {
            None => Ok(None),
            Some(contents) => serde_json::from_str(&contents)
                .map(Some)
                .map_err(|e| corrupt(&path, e)),
        }
    }

    async fn existing_keys(&self, resource_type: &ResourceType) -> Result<HashSet<RowKey>> {
        Ok(self
            .read_rows(resource_type)
            .await?
            .iter()
            .filter_map(RowKey::from_stored)
            .collect())
    }

    async fn append(&self, schema: &TableSchema, rows: &[Row]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let resource_type = &schema.resource_type;
        let pinned = read_optional(&self.schema_path(resource_type)).await?.is_some();

        // Rows land before the schema is pinned; a failed pin takes them back out
        let rows_path = self.rows_path(resource_type);
        let previous_len = if rows.is_empty() {
            None
        } else {
            let mut contents = Vec::new();
            for row in rows {
                serde_json::to_writer(&mut contents, &row.to_document())?;
                contents.push(b'\n');
            }
            Some(append_synced(&rows_path, &contents).await?)
        };

        if !pinned {
            if let Err(e) = self.pin_schema(schema).await {
                if let Some(len) = previous_len {
                    if let Err(undo) = truncate(&rows_path, len).await {
                        tracing::error!(
                            resource_type = %resource_type,
                            error = %undo,
                            "Cannot roll back rows after failed schema pin"
                        );
                    }
                }
                return Err(e);
            }
        }

        if previous_len.is_some() {
            tracing::debug!(
                resource_type = %resource_type,
                rows = rows.len(),
                path = %rows_path.display(),
                "Appended rows"
            );
        }
        Ok(())
    }

    async fn row_count(&self, resource_type: &ResourceType) -> Result<usize> {
        Ok(self.read_rows(resource_type).await?.len())
    }
}

/// Cursor storage in a single JSON document
#[derive(Debug)]
pub struct FileStateStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStateStorage {
    /// Create storage backed by the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the state document
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, Cursor>> {
        match read_optional(&self.path).await? {
            None => Ok(BTreeMap::new()),
            Some(contents) => {
                serde_json::from_str(&contents).map_err(|e| corrupt(&self.path, e))
            }
        }
    }
}

#[async_trait]
impl StateStorage for FileStateStorage {
    async fn load_cursor(&self, resource_type: &ResourceType) -> Result<Option<Cursor>> {
        Ok(self.read_all().await?.remove(resource_type.as_str()))
    }

    async fn save_cursor(&self, cursor: &Cursor) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut cursors = self.read_all().await?;
        cursors.insert(cursor.id.clone(), cursor.clone());
        let contents = serde_json::to_vec_pretty(&cursors)?;
        write_atomic(&self.path, &contents).await
    }

    async fn list_cursors(&self) -> Result<Vec<Cursor>> {
        Ok(self.read_all().await?.into_values().collect())
    }
}
