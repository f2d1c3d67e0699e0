//! Configuration for directory synchronization.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Default capacity of the per-watch event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 1000;

/// Default time `close` waits for workers to finish in-flight events.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings shared by every watch a manager opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Ask the notifier for a recursive watch, if it supports one.
    pub recursive: bool,

    /// Insert records for created directories as well as files.
    pub include_directories: bool,

    /// Capacity of the channel between the notifier and a watch worker.
    pub event_buffer: usize,

    /// How long `close` waits for workers before detaching them.
    pub drain_timeout: Duration,
}

impl SyncConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch subdirectories too.
    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    /// Record created directories alongside regular files.
    pub fn include_directories(mut self) -> Self {
        self.include_directories = true;
        self
    }

    /// Set the event channel capacity.
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    /// Set how long `close` waits for in-flight events.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer == 0 {
            return Err(SyncError::Config(
                "event_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            recursive: false,
            include_directories: false,
            event_buffer: DEFAULT_EVENT_BUFFER,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}
