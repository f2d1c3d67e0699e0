//! # Directory Sync
//!
//! This crate mirrors the files in watched directories into records of a
//! persistent store. A file appearing in a watched directory inserts a
//! record whose path field holds the file's path; a file going away deletes
//! the matching records.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         SyncManager                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Record::schema() ──► validate ──► Notifier::subscribe          │
//! │                                          │                      │
//! │                                          ▼                      │
//! │                          EventStream ──► Worker ──► RecordStore │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dirsync::{MemoryStore, SyncManager};
//!
//! let store = Arc::new(MemoryStore::new());
//! let manager = SyncManager::new(Arc::clone(&store));
//! manager.add_watch::<Document>("/srv/inbox").await?;
//!
//! // ... files come and go ...
//!
//! manager.close().await;
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod manager;
pub mod record;
pub mod schema;
pub mod store;
pub mod subscription;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use event::{FsEvent, FsEventKind};
pub use manager::{SyncManager, SyncStats, WatchInfo, WatchStats, WatchTemplate};
pub use record::{Record, validate_record};
pub use schema::{
    FieldAnnotation, FieldDescriptor, FieldType, PathField, RecordSchema, TemplateKind, validate,
};
pub use store::{JsonFileStore, MemoryStore, RecordStore};
pub use subscription::{
    EventSink, EventStream, FsNotifier, Notifier, StreamItem, Subscription, SubscriptionHandle,
    TransportError,
};
