//! Error types for directory synchronization.

use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while setting up or running a directory sync.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The record template does not describe a structured record.
    #[error("record template {0} must be a struct-shaped record")]
    InvalidTemplateKind(String),

    /// No field carries the path annotation.
    #[error("record template {0} has no field annotated as the path field")]
    MissingPathField(String),

    /// More than one field carries the path annotation.
    #[error("record template {template} annotates more than one path field: {fields:?}")]
    AmbiguousPathField {
        template: String,
        fields: Vec<String>,
    },

    /// The path field is not a string.
    #[error("path field {field} of record template {template} must have string type")]
    PathFieldWrongType { template: String, field: String },

    /// Directory not found.
    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    /// Path exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The manager has already been closed.
    #[error("sync manager is closed")]
    Closed,

    /// Notify error.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record store error.
    #[error("store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Whether this error was raised by schema validation.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTemplateKind(_)
                | Self::MissingPathField(_)
                | Self::AmbiguousPathField { .. }
                | Self::PathFieldWrongType { .. }
        )
    }
}
