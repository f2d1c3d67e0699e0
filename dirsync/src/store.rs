//! Record stores: the persistence side of synchronization.
//!
//! Watch workers only need three operations from a store: insert a record,
//! find records matching a filter record, and delete a record. Matching
//! follows struct-condition semantics: a field of the filter takes part in
//! the match only when it differs from the same field of `R::default()`.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::record::Record;

mod json;
mod memory;
mod table;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

/// Persistence layer consumed by watch workers.
///
/// Implementations must be safe to share between workers.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Insert a new record.
    async fn insert<R: Record>(&self, record: R) -> Result<()>;

    /// Find every stored record matching `filter`.
    async fn find_matching<R: Record>(&self, filter: &R) -> Result<Vec<R>>;

    /// Delete a stored record.
    async fn delete<R: Record>(&self, record: &R) -> Result<()>;

    /// Every record stored for `R`, in insertion order.
    async fn all<R: Record>(&self) -> Result<Vec<R>>;
}

/// Serialize a record into a store row.
pub(crate) fn to_row<R: Record>(record: &R) -> Result<Value> {
    let row = serde_json::to_value(record)?;
    if !row.is_object() {
        return Err(SyncError::Store(format!(
            "{} does not serialize to an object",
            R::type_name()
        )));
    }
    Ok(row)
}

/// Deserialize a store row back into a record.
pub(crate) fn from_row<R: Record>(row: Value) -> Result<R> {
    Ok(serde_json::from_value(row)?)
}

/// The serialized zero value of `R`, used to tell set fields from unset ones.
pub(crate) fn zero_row<R: Record>() -> Result<Value> {
    to_row(&R::default())
}
