//! Filesystem events delivered to watch workers.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A filesystem event observed under a watched directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsEvent {
    /// The kind of event.
    pub kind: FsEventKind,

    /// Path to the affected file or directory.
    pub path: PathBuf,

    /// When the event was received.
    pub timestamp: DateTime<Utc>,
}

impl FsEvent {
    /// Create a new event stamped with the current time.
    pub fn new(kind: FsEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            timestamp: Utc::now(),
        }
    }

    /// Shorthand for a creation event.
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(FsEventKind::Created, path)
    }

    /// Shorthand for a removal event.
    pub fn removed(path: impl Into<PathBuf>) -> Self {
        Self::new(FsEventKind::Removed, path)
    }

    /// The affected path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Kind of filesystem event, as far as synchronization is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsEventKind {
    /// A file or directory appeared.
    Created,

    /// A file or directory went away.
    Removed,

    /// Anything else: writes, metadata, renames, access.
    Other,
}

impl From<notify::EventKind> for FsEventKind {
    fn from(kind: notify::EventKind) -> Self {
        match kind {
            notify::EventKind::Create(_) => Self::Created,
            notify::EventKind::Remove(_) => Self::Removed,
            _ => Self::Other,
        }
    }
}
