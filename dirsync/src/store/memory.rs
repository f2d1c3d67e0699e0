//! In-memory record store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::table::Table;
use super::{RecordStore, from_row, to_row, zero_row};
use crate::error::Result;
use crate::record::Record;

/// Record store that keeps every table in memory.
///
/// Integer primary keys are assigned from a per-table counter and
/// `CreatedAt` timestamps are stamped on insert.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows stored for `R`.
    pub async fn len<R: Record>(&self) -> usize {
        let table = R::schema().table;
        self.tables.read().await.get(&table).map_or(0, Table::len)
    }

    /// Whether no rows are stored for `R`.
    pub async fn is_empty<R: Record>(&self) -> bool {
        self.len::<R>().await == 0
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert<R: Record>(&self, record: R) -> Result<()> {
        let schema = R::schema();
        let zero = zero_row::<R>()?;
        let row = to_row(&record)?;

        let mut tables = self.tables.write().await;
        let table = tables.entry(schema.table.clone()).or_default();
        table.insert(&schema, &zero, row)?;
        Ok(())
    }

    async fn find_matching<R: Record>(&self, filter: &R) -> Result<Vec<R>> {
        let schema = R::schema();
        let zero = zero_row::<R>()?;
        let filter = to_row(filter)?;

        let rows = {
            let tables = self.tables.read().await;
            tables
                .get(&schema.table)
                .map(|table| table.find(&zero, &filter))
                .unwrap_or_default()
        };

        rows.into_iter().map(from_row).collect()
    }

    async fn delete<R: Record>(&self, record: &R) -> Result<()> {
        let schema = R::schema();
        let zero = zero_row::<R>()?;
        let row = to_row(record)?;

        let mut tables = self.tables.write().await;
        if let Some(table) = tables.get_mut(&schema.table) {
            let removed = table.delete(&schema, &zero, &row);
            debug!("Deleted {removed} row(s) from {}", schema.table);
        }
        Ok(())
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
