//! Record store persisted to a single JSON file.
//!
//! Every mutation rewrites the file atomically through a temp file, so a
//! crash leaves either the old or the new contents on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::table::Table;
use super::{RecordStore, from_row, to_row, zero_row};
use crate::error::{Result, SyncError};
use crate::record::Record;

/// Record store backed by a JSON file on disk.
#[derive(Debug)]
pub struct JsonFileStore {
    /// Location of the store file.
    path: PathBuf,

    /// Loaded tables, keyed by table name.
    tables: RwLock<HashMap<String, Table>>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading existing contents.
    ///
    /// Parent directories are created if needed; a missing file starts an
    /// empty store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let tables = match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(SyncError::Io(e)),
        };

        info!("Opened record store: {}", path.display());
        Ok(Self {
            path,
            tables: RwLock::new(tables),
        })
    }

    /// Location of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, tables: &HashMap<String, Table>) -> Result<()> {
        let content = serde_json::to_string_pretty(tables)?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &self.path).await?;

        debug!("Saved record store: {}", self.path.display());
        Ok(())
    }

    /// Apply `mutate` and persist, rolling back the in-memory state if the
    /// write fails.
    async fn mutate<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut HashMap<String, Table>) -> Result<()> + Send,
    {
        let mut tables = self.tables.write().await;
        let snapshot = tables.clone();

        mutate(&mut *tables)?;
        if let Err(e) = self.persist(&*tables).await {
            *tables = snapshot;
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn insert<R: Record>(&self, record: R) -> Result<()> {
        let schema = R::schema();
        let zero = zero_row::<R>()?;
        let row = to_row(&record)?;

        self.mutate(|tables| {
            tables
                .entry(schema.table.clone())
                .or_default()
                .insert(&schema, &zero, row)
                .map(|_| ())
        })
        .await
    }

    async fn find_matching<R: Record>(&self, filter: &R) -> Result<Vec<R>> {
        let table = R::schema().table;
        let zero = zero_row::<R>()?;
        let filter = to_row(filter)?;

        let rows = {
            let tables = self.tables.read().await;
            tables
                .get(&table)
                .map(|t| t.find(&zero, &filter))
                .unwrap_or_default()
        };

        rows.into_iter().map(from_row).collect()
    }

    async fn delete<R: Record>(&self, record: &R) -> Result<()> {
        let schema = R::schema();
        let zero = zero_row::<R>()?;
        let row = to_row(record)?;

        self.mutate(|tables| {
            if let Some(table) = tables.get_mut(&schema.table) {
                let removed = table.delete(&schema, &zero, &row);
                debug!("Deleted {removed} row(s) from {}", schema.table);
            }
            Ok(())
        })
        .await
    }

    async fn all<R: Record>(&self) -> Result<Vec<R>> {
        let table = R::schema().table;
        let rows = {
            let tables = self.tables.read().await;
            tables
                .get(&table)
                .map(|t| t.rows().to_vec())
                .unwrap_or_default()
        };

        rows.into_iter().map(from_row).collect()
    }
}
