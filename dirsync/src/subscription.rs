//! Directory subscriptions: the seam between a notification source and a
//! watch worker.
//!
//! A [`Notifier`] turns a directory into a [`Subscription`]. The subscription
//! splits into a [`SubscriptionHandle`], owned by the manager and closed at
//! teardown, and an [`EventStream`], consumed by the worker.

use std::fmt;
use std::path::{Path, PathBuf};

use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::SyncConfig;
use crate::error::Result;
use crate::event::{FsEvent, FsEventKind};

/// Source of directory subscriptions.
pub trait Notifier: Send + Sync + 'static {
    /// Start delivering events for `directory`.
    fn subscribe(&self, directory: &Path, config: &SyncConfig) -> Result<Subscription>;
}

/// A non-fatal error reported by the notification source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    /// Human-readable description.
    pub message: String,

    /// Paths the error refers to, if any.
    pub paths: Vec<PathBuf>,
}

impl TransportError {
    /// Create an error with no associated paths.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            paths: Vec::new(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.paths.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} ({:?})", self.message, self.paths)
        }
    }
}

impl From<notify::Error> for TransportError {
    fn from(mut err: notify::Error) -> Self {
        let paths = std::mem::take(&mut err.paths);
        Self {
            message: err.to_string(),
            paths,
        }
    }
}

/// One item pulled from an [`EventStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    /// A filesystem event.
    Event(FsEvent),

    /// A transport error; the subscription stays open.
    Error(TransportError),
}

/// Producer side of a subscription, handed to the notification source.
#[derive(Debug, Clone)]
pub struct EventSink {
    events: mpsc::Sender<FsEvent>,
    errors: mpsc::Sender<TransportError>,
}

impl EventSink {
    /// Deliver an event from a non-async thread. Returns false once the
    /// subscription is gone.
    pub fn blocking_send_event(&self, event: FsEvent) -> bool {
        self.events.blocking_send(event).is_ok()
    }

    /// Deliver an error from a non-async thread.
    pub fn blocking_send_error(&self, error: TransportError) -> bool {
        self.errors.blocking_send(error).is_ok()
    }

    /// Deliver an event from async code.
    pub async fn send_event(&self, event: FsEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Deliver an error from async code.
    pub async fn send_error(&self, error: TransportError) -> bool {
        self.errors.send(error).await.is_ok()
    }

    /// Whether the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

/// Create a subscription for `directory` and the sink that feeds it.
pub fn channel(directory: impl Into<PathBuf>, capacity: usize) -> (EventSink, Subscription) {
    let (event_tx, event_rx) = mpsc::channel(capacity);
    let (error_tx, error_rx) = mpsc::channel(capacity);
    let cancel = CancellationToken::new();
    let directory = directory.into();

    let sink = EventSink {
        events: event_tx,
        errors: error_tx,
    };
    let subscription = Subscription {
        handle: SubscriptionHandle {
            directory,
            cancel: cancel.clone(),
            guard: None,
            closed: false,
        },
        stream: EventStream {
            events: event_rx,
            errors: error_rx,
            errors_open: true,
            cancel,
        },
    };

    (sink, subscription)
}

/// A live subscription to one directory.
#[derive(Debug)]
pub struct Subscription {
    handle: SubscriptionHandle,
    stream: EventStream,
}

impl Subscription {
    /// Keep `guard` alive until the subscription is closed. Notification
    /// sources use this to tie their watcher's lifetime to the handle.
    pub fn with_guard(mut self, guard: impl Send + 'static) -> Self {
        self.handle.guard = Some(Box::new(guard));
        self
    }

    /// The subscribed directory.
    pub fn directory(&self) -> &Path {
        &self.handle.directory
    }

    /// Split into the closable handle and the consumable stream.
    pub fn into_parts(self) -> (SubscriptionHandle, EventStream) {
        (self.handle, self.stream)
    }
}

/// Owning handle to a subscription. Closing it ends the paired stream.
pub struct SubscriptionHandle {
    directory: PathBuf,
    cancel: CancellationToken,
    guard: Option<Box<dyn Send>>,
    closed: bool,
}

impl SubscriptionHandle {
    /// The subscribed directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Close the subscription. Returns false if it was already closed.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.cancel.cancel();
        // Dropping the guard stops the underlying watcher.
        self.guard = None;
        debug!("Closed subscription: {}", self.directory.display());
        true
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("directory", &self.directory)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Consumer side of a subscription.
#[derive(Debug)]
pub struct EventStream {
    events: mpsc::Receiver<FsEvent>,
    errors: mpsc::Receiver<TransportError>,
    errors_open: bool,
    cancel: CancellationToken,
}

impl EventStream {
    /// Wait for the next event or error.
    ///
    /// Events and errors are picked fairly when both are ready. Returns
    /// `None` once the handle is closed, even with items still queued, or
    /// once the event channel is drained and disconnected.
    pub async fn next(&mut self) -> Option<StreamItem> {
        let Self {
            events,
            errors,
            errors_open,
            cancel,
        } = self;

        loop {
            if cancel.is_cancelled() {
                return None;
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                event = events.recv() => return event.map(StreamItem::Event),
                error = errors.recv(), if *errors_open => match error {
                    Some(error) => return Some(StreamItem::Error(error)),
                    None => *errors_open = false,
                },
            }
        }
    }
}

/// Notifier backed by the platform's native file watcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsNotifier;

impl FsNotifier {
    /// Create a new notifier.
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for FsNotifier {
    fn subscribe(&self, directory: &Path, config: &SyncConfig) -> Result<Subscription> {
        let (sink, subscription) = channel(directory, config.event_buffer);

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    let kind = FsEventKind::from(event.kind);
                    for path in event.paths {
                        if !sink.blocking_send_event(FsEvent::new(kind, path)) {
                            trace!("Dropped event for closed subscription");
                            return;
                        }
                    }
                }
                Err(e) => {
                    if !sink.blocking_send_error(TransportError::from(e)) {
                        trace!("Dropped error for closed subscription");
                    }
                }
            },
        )?;

        let mode = if config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(directory, mode)?;
        debug!("Started watching: {}", directory.display());

        Ok(subscription.with_guard(watcher))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_stream_delivers_events_and_errors() {
        let (sink, subscription) = channel("/watched", 8);
        let (_handle, mut stream) = subscription.into_parts();

        assert!(sink.send_error(TransportError::new("queue overflow")).await);
        assert!(sink.send_event(FsEvent::created("/watched/a")).await);

        let mut seen = Vec::new();
        for _ in 0..2 {
            seen.push(stream.next().await.unwrap());
        }

        assert!(seen.contains(&StreamItem::Error(TransportError::new("queue overflow"))));
        assert!(seen.iter().any(|item| matches!(
            item,
            StreamItem::Event(e) if e.path == Path::new("/watched/a")
        )));
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let (sink, subscription) = channel("/watched", 8);
        let (mut handle, mut stream) = subscription.into_parts();

        assert!(handle.close());
        assert!(!handle.close());
        assert!(handle.is_closed());
        assert_eq!(stream.next().await, None);

        drop(stream);
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn test_errors_not_starved_by_events() {
        let (sink, subscription) = channel("/watched", 64);
        let (_handle, mut stream) = subscription.into_parts();

        for i in 0..64 {
            assert!(sink.send_event(FsEvent::created(format!("/watched/{i}"))).await);
        }
        assert!(sink.send_error(TransportError::new("rescan needed")).await);

        let mut events_before_error = 0;
        loop {
            match stream.next().await.unwrap() {
                StreamItem::Event(_) => events_before_error += 1,
                StreamItem::Error(_) => break,
            }
        }
        assert!(events_before_error < 64, "error delivered only after every event");
    }

    #[tokio::test]
    async fn test_close_drops_queued_items() {
        let (sink, subscription) = channel("/watched", 8);
        let (mut handle, mut stream) = subscription.into_parts();

        assert!(sink.send_event(FsEvent::created("/watched/a")).await);
        assert!(sink.send_error(TransportError::new("overflow")).await);
        handle.close();

        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_stream_ends_when_sink_dropped() {
        let (sink, subscription) = channel("/watched", 8);
        let (_handle, mut stream) = subscription.into_parts();

        drop(sink);
        let next = tokio::time::timeout(Duration::from_secs(1), stream.next()).await;
        assert_eq!(next.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fs_notifier_rejects_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");

        let result = FsNotifier::new().subscribe(&missing, &SyncConfig::default());
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fs_notifier_reports_created_file() {
        let temp_dir = TempDir::new().unwrap();
        let subscription = FsNotifier::new()
            .subscribe(temp_dir.path(), &SyncConfig::default())
            .unwrap();
        assert_eq!(subscription.directory(), temp_dir.path());
        let (_handle, mut stream) = subscription.into_parts();

        let file = temp_dir.path().join("hello.txt");
        std::fs::write(&file, "hello").unwrap();

        let created = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(item) = stream.next().await {
                if let StreamItem::Event(event) = item {
                    if event.kind == FsEventKind::Created {
                        return Some(event.path);
                    }
                }
            }
            None
        })
        .await
        .unwrap();

        assert_eq!(created, Some(file));
    }
}
