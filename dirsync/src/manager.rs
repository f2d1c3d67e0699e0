//! Watch manager: one worker per watched directory, each translating
//! filesystem events into record store mutations.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::event::{FsEvent, FsEventKind};
use crate::record::{self, Record};
use crate::schema::{PathField, RecordSchema};
use crate::store::RecordStore;
use crate::subscription::{EventStream, FsNotifier, Notifier, StreamItem, SubscriptionHandle};

/// Mirrors files in watched directories into a record store.
///
/// Each call to [`add_watch`](Self::add_watch) opens one subscription and
/// spawns one worker task. Workers run until [`close`](Self::close) is
/// called or the manager is dropped.
pub struct SyncManager<S: RecordStore, N: Notifier = FsNotifier> {
    /// Shared record store.
    store: Arc<S>,

    /// Source of directory subscriptions.
    notifier: N,

    /// Settings applied to every watch.
    config: SyncConfig,

    /// Active watches.
    registry: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    entries: Vec<WatchEntry>,
    closed: bool,
}

/// Bookkeeping for one active directory watch.
struct WatchEntry {
    directory: PathBuf,
    template: WatchTemplate,
    handle: SubscriptionHandle,
    worker: JoinHandle<()>,
    counters: Arc<WatchCounters>,
}

/// The validated record template a watch synchronizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchTemplate {
    /// Rust type name of the record.
    pub type_name: String,

    /// Declared schema.
    pub schema: RecordSchema,

    /// Field stamped with each file's path.
    pub path_field: PathField,
}

/// Snapshot of one active watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchInfo {
    /// Watched directory (absolute).
    pub directory: PathBuf,

    /// Record template in use.
    pub template: WatchTemplate,

    /// Event counters so far.
    pub stats: WatchStats,
}

/// Event counters for one watch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchStats {
    /// Records inserted.
    pub inserted: u64,

    /// Records deleted.
    pub deleted: u64,

    /// Events ignored (other kinds, directories).
    pub ignored: u64,

    /// Store operations that failed.
    pub failures: u64,

    /// Errors reported by the notification source.
    pub transport_errors: u64,
}

/// Aggregate statistics across all watches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Number of active watches.
    pub watches: usize,

    /// Totals across every watch.
    pub totals: WatchStats,
}

#[derive(Debug, Default)]
struct WatchCounters {
    inserted: AtomicU64,
    deleted: AtomicU64,
    ignored: AtomicU64,
    failures: AtomicU64,
    transport_errors: AtomicU64,
}

impl WatchCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> WatchStats {
        WatchStats {
            inserted: self.inserted.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }
}

impl<S: RecordStore> SyncManager<S> {
    /// Create a manager using the native file watcher and default settings.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_notifier(store, FsNotifier::new(), SyncConfig::default())
    }
}

impl<S: RecordStore, N: Notifier> SyncManager<S, N> {
    /// Create a manager with an explicit notifier and config.
    pub fn with_notifier(store: Arc<S>, notifier: N, config: SyncConfig) -> Self {
        Self {
            store,
            notifier,
            config,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Start mirroring `directory` into records of type `R`.
    ///
    /// Validation and subscription failures are returned here; nothing is
    /// registered when this returns an error. Failures while processing
    /// events later on are logged and never surface to the caller.
    pub async fn add_watch<R: Record>(&self, directory: impl AsRef<Path>) -> Result<()> {
        let path_field = record::validate_record::<R>()?;
        self.config.validate()?;
        let directory = resolve_directory(directory.as_ref())?;

        let mut registry = self.registry.lock().await;
        if registry.closed {
            return Err(SyncError::Closed);
        }

        let subscription = self.notifier.subscribe(&directory, &self.config)?;
        let (handle, stream) = subscription.into_parts();

        let counters = Arc::new(WatchCounters::default());
        let worker = Worker::<S, R> {
            directory: directory.clone(),
            store: Arc::clone(&self.store),
            path_field: path_field.clone(),
            include_directories: self.config.include_directories,
            counters: Arc::clone(&counters),
            _record: PhantomData,
        };
        let worker = tokio::spawn(worker.run(stream));

        info!(
            "Watching {} as {} records",
            directory.display(),
            R::type_name()
        );
        registry.entries.push(WatchEntry {
            directory,
            template: WatchTemplate {
                type_name: R::type_name().to_string(),
                schema: R::schema(),
                path_field,
            },
            handle,
            worker,
            counters,
        });

        Ok(())
    }

    /// Stop every watch.
    ///
    /// Closes each subscription, then waits for its worker to finish the
    /// event it is processing. Workers still busy once
    /// [`SyncConfig::drain_timeout`] has elapsed are detached and left to
    /// finish on their own. Calling this again is a no-op, and later
    /// [`add_watch`](Self::add_watch) calls fail with [`SyncError::Closed`].
    pub async fn close(&self) {
        let mut entries = {
            let mut registry = self.registry.lock().await;
            registry.closed = true;
            std::mem::take(&mut registry.entries)
        };

        if entries.is_empty() {
            debug!("No directory watches to close");
            return;
        }

        for entry in &mut entries {
            entry.handle.close();
        }

        let count = entries.len();
        let deadline = Instant::now() + self.config.drain_timeout;
        let mut detached = 0;
        for entry in entries {
            match tokio::time::timeout_at(deadline, entry.worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    "Watch worker for {} ended abnormally: {e}",
                    entry.directory.display()
                ),
                Err(_) => {
                    detached += 1;
                    warn!(
                        "Watch worker for {} still busy after {:?}; detaching",
                        entry.directory.display(),
                        self.config.drain_timeout
                    );
                }
            }
        }

        if detached > 0 {
            info!("Closed {count} directory watch(es), {detached} detached");
        } else {
            info!("Closed {count} directory watch(es)");
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub async fn is_closed(&self) -> bool {
        self.registry.lock().await.closed
    }

    /// Active watches in registration order.
    pub async fn watches(&self) -> Vec<WatchInfo> {
        self.registry
            .lock()
            .await
            .entries
            .iter()
            .map(|entry| WatchInfo {
                directory: entry.directory.clone(),
                template: entry.template.clone(),
                stats: entry.counters.snapshot(),
            })
            .collect()
    }

    /// Statistics across all active watches.
    pub async fn stats(&self) -> SyncStats {
        let registry = self.registry.lock().await;

        let mut totals = WatchStats::default();
        for entry in &registry.entries {
            let s = entry.counters.snapshot();
            totals.inserted += s.inserted;
            totals.deleted += s.deleted;
            totals.ignored += s.ignored;
            totals.failures += s.failures;
            totals.transport_errors += s.transport_errors;
        }

        SyncStats {
            watches: registry.entries.len(),
            totals,
        }
    }
}

/// Make `directory` absolute and check it is an existing directory.
fn resolve_directory(directory: &Path) -> Result<PathBuf> {
    let directory = std::path::absolute(directory)?;

    if !directory.exists() {
        return Err(SyncError::DirectoryNotFound(
            directory.display().to_string(),
        ));
    }

    if !directory.is_dir() {
        return Err(SyncError::NotADirectory(directory.display().to_string()));
    }

    Ok(directory)
}

/// Event loop for one watch.
struct Worker<S, R> {
    directory: PathBuf,
    store: Arc<S>,
    path_field: PathField,
    include_directories: bool,
    counters: Arc<WatchCounters>,
    _record: PhantomData<fn() -> R>,
}

impl<S: RecordStore, R: Record> Worker<S, R> {
    async fn run(self, mut stream: EventStream) {
        while let Some(item) = stream.next().await {
            match item {
                StreamItem::Event(event) => self.handle_event(event).await,
                StreamItem::Error(e) => {
                    WatchCounters::bump(&self.counters.transport_errors);
                    warn!("Watch error on {}: {e}", self.directory.display());
                }
            }
        }

        debug!("Watch worker stopped: {}", self.directory.display());
    }

    async fn handle_event(&self, event: FsEvent) {
        match event.kind {
            FsEventKind::Created => self.on_created(&event.path).await,
            FsEventKind::Removed => self.on_removed(&event.path).await,
            FsEventKind::Other => {
                trace!("Ignoring event for {}", event.path.display());
                WatchCounters::bump(&self.counters.ignored);
            }
        }
    }

    async fn on_created(&self, path: &Path) {
        if !self.include_directories && path.is_dir() {
            trace!("Ignoring created directory {}", path.display());
            WatchCounters::bump(&self.counters.ignored);
            return;
        }

        let record = match self.record_for(path) {
            Ok(record) => record,
            Err(e) => return self.fail("build record", path, &e),
        };

        match self.store.insert(record).await {
            Ok(()) => {
                debug!("Inserted {} for {}", R::type_name(), path.display());
                WatchCounters::bump(&self.counters.inserted);
            }
            Err(e) => self.fail("insert", path, &e),
        }
    }

    async fn on_removed(&self, path: &Path) {
        let filter = match self.record_for(path) {
            Ok(filter) => filter,
            Err(e) => return self.fail("build filter", path, &e),
        };

        let matches = match self.store.find_matching(&filter).await {
            Ok(matches) => matches,
            Err(e) => return self.fail("find", path, &e),
        };

        if matches.is_empty() {
            debug!("No {} records for {}", R::type_name(), path.display());
            return;
        }

        for stored in &matches {
            match self.store.delete(stored).await {
                Ok(()) => WatchCounters::bump(&self.counters.deleted),
                Err(e) => self.fail("delete", path, &e),
            }
        }
        debug!(
            "Deleted {} {} record(s) for {}",
            matches.len(),
            R::type_name(),
            path.display()
        );
    }

    fn record_for(&self, path: &Path) -> Result<R> {
        record::with_path(&self.path_field, &path.to_string_lossy())
    }

    fn fail(&self, op: &str, path: &Path, e: &SyncError) {
        WatchCounters::bump(&self.counters.failures);
        error!("Failed to {op} {} record for {}: {e}", R::type_name(), path.display());
    }
}
