//! Source watcher with debounced change detection.
//!
//! This module provides the [`SourceWatcher`] type that bridges a
//! synchronous `notify` backend to async snapshot streams. A dedicated
//! thread debounces the backend's events: a burst of writes settles into one
//! re-read of the file.
//!
//! # Lifecycle
//!
//! 1. **Activation**: [`SourceWatcher::activate`] resolves the path, reads
//!    the current contents, and starts watching the parent directory.
//! 2. **Subscription**: [`SourceWatcher::subscribe`] hands out a
//!    [`SnapshotStream`] whose first item is read on the spot.
//! 3. **Change**: after the debounce window settles, the file is re-read on
//!    the debounce thread and the new snapshot replaces the previous one.
//! 4. **Deactivation**: [`SourceWatcher::deactivate`] (or drop) releases the
//!    OS watch and ends every open stream.
//!
//! # Usage
//!
//! ```no_run
//! use ds_watcher::SourceWatcher;
//! use ds_core::WatchConfig;
//! use camino::Utf8Path;
//! use futures_util::StreamExt;
//!
//! # async fn example() -> Result<(), ds_watcher::WatchError> {
//! let mut watcher = SourceWatcher::activate(
//!     Utf8Path::new("static/data/quotes.json"),
//!     &WatchConfig::default(),
//! )?;
//!
//! let mut snapshots = watcher.subscribe();
//! if let Some(snapshot) = snapshots.next().await {
//!     println!("{} quotes", snapshot.len());
//! }
//!
//! watcher.deactivate();
//! # Ok(())
//! # }
//! ```

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ds_core::{Snapshot, WatchConfig};
use notify::{Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::watch;

use crate::error::WatchError;
use crate::events::{SourceEvent, SourceEventKind};
use crate::filter::{FileFilter, SourceFileFilter};
use crate::stream::SnapshotStream;

/// The running notify backend.
///
/// Dropping it stops the OS watch, which in turn ends the debounce thread.
enum Backend {
    Native(RecommendedWatcher),
    Poll(PollWatcher),
}

impl Backend {
    const fn name(&self) -> &'static str {
        match self {
            Self::Native(_) => "native",
            Self::Poll(_) => "poll",
        }
    }

    fn watch(&mut self, dir: &Utf8Path) -> notify::Result<()> {
        match self {
            Self::Native(watcher) => watcher.watch(dir.as_std_path(), RecursiveMode::NonRecursive),
            Self::Poll(watcher) => watcher.watch(dir.as_std_path(), RecursiveMode::NonRecursive),
        }
    }
}

/// Watches one data source file and publishes a snapshot per settled change.
///
/// Every subscriber receives the same immutable [`Snapshot`] values; none is
/// mutated after publication.
pub struct SourceWatcher {
    /// Absolute path of the watched file.
    path: Utf8PathBuf,

    /// The notify backend. `None` once deactivated.
    backend: Option<Backend>,

    /// Publishes snapshots to subscribers. `None` once deactivated.
    ///
    /// The debounce thread only holds a weak reference, so dropping this
    /// ends every open stream.
    snapshots: Option<Arc<watch::Sender<Snapshot>>>,
}

impl std::fmt::Debug for SourceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceWatcher")
            .field("path", &self.path)
            .field("backend", &self.backend.as_ref().map(Backend::name))
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl SourceWatcher {
    /// Starts watching the file at `path`.
    ///
    /// The file itself may be missing (its snapshot is then empty until it
    /// appears), but its parent directory must exist.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::PathNotFound`] if the parent directory does not
    /// exist, [`WatchError::NotAFile`] if `path` has no file name,
    /// [`WatchError::Notify`] if the backend fails to start, and
    /// [`WatchError::Io`] if the debounce thread cannot be spawned.
    pub fn activate(path: &Utf8Path, config: &WatchConfig) -> Result<Self, WatchError> {
        let path = resolve_target(path)?;

        let initial = Snapshot::load(&path);
        let snapshots = Arc::new(watch::Sender::new(initial));

        let (raw_tx, raw_rx) = mpsc::channel();
        let handler = forward_relevant(SourceFileFilter::new(&path), raw_tx);
        let mut backend = match config.poll_interval() {
            None => Backend::Native(RecommendedWatcher::new(handler, notify::Config::default())?),
            Some(interval) => {
                let notify_config = notify::Config::default()
                    .with_poll_interval(interval)
                    .with_compare_contents(true);
                Backend::Poll(PollWatcher::new(handler, notify_config)?)
            }
        };

        // The parent always exists here; resolve_target canonicalized it.
        let dir = path.parent().unwrap_or(path.as_path());
        backend.watch(dir)?;

        let window = config.debounce();
        let target = path.clone();
        let publisher = Arc::downgrade(&snapshots);
        std::thread::Builder::new()
            .name("ds-watcher-debounce".to_owned())
            .spawn(move || debounce(&raw_rx, window, &target, &publisher))?;

        tracing::info!(
            source = %path,
            backend = backend.name(),
            debounce_ms = config.debounce_ms,
            "Source watcher started"
        );

        Ok(Self {
            path,
            backend: Some(backend),
            snapshots: Some(snapshots),
        })
    }

    /// Returns a new snapshot stream for this source.
    ///
    /// The stream's first item is read from disk now, not taken from the
    /// last published change. A deactivated watcher yields that one item and
    /// then ends.
    ///
    /// This performs blocking file I/O.
    #[must_use]
    pub fn subscribe(&self) -> SnapshotStream {
        // Subscribe before reading so a change racing the read is not lost.
        let rx = self.receiver();
        SnapshotStream::new(Snapshot::load(&self.path), rx)
    }

    /// Returns a receiver for changes published from now on.
    pub(crate) fn receiver(&self) -> watch::Receiver<Snapshot> {
        match &self.snapshots {
            Some(tx) => tx.subscribe(),
            None => watch::channel(Snapshot::empty()).1,
        }
    }

    /// Releases the OS watch resources.
    ///
    /// Idempotent; calling it on an inactive watcher does nothing.
    pub fn deactivate(&mut self) {
        let Some(backend) = self.backend.take() else {
            return;
        };
        self.snapshots = None;
        let name = backend.name();
        drop(backend);
        tracing::info!(source = %self.path, backend = name, "Source watcher stopped");
    }

    /// Returns `true` until [`deactivate`](Self::deactivate) is called.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.backend.is_some()
    }

    /// Returns the absolute path of the watched file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the number of live snapshot streams.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.snapshots.as_ref().map_or(0, |tx| tx.receiver_count())
    }
}

impl Drop for SourceWatcher {
    fn drop(&mut self) {
        self.deactivate();
    }
}

/// Canonicalizes the parent directory of `path` and re-attaches the file name.
///
/// The file itself is not canonicalized: it may not exist yet, and symlinks
/// swapped into place should still be followed on every read.
pub(crate) fn resolve_target(path: &Utf8Path) -> Result<Utf8PathBuf, WatchError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| WatchError::NotAFile(path.to_path_buf()))?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    if !parent.is_dir() {
        return Err(WatchError::path_not_found(parent));
    }

    let parent = parent.canonicalize_utf8()?;
    Ok(parent.join(file_name))
}

/// Builds the backend callback: forwards a tick for every relevant event.
fn forward_relevant(
    filter: SourceFileFilter,
    tx: mpsc::Sender<()>,
) -> impl FnMut(notify::Result<Event>) + Send + 'static {
    move |result| match result {
        Ok(event) => {
            if is_relevant(&filter, &event) && tx.send(()).is_err() {
                tracing::trace!(source = %filter.target(), "Debounce thread gone, dropping event");
            }
        }
        Err(error) => {
            tracing::error!(source = %filter.target(), error = %error, "Watcher error");
        }
    }
}

/// Returns `true` if `event` may have changed the contents of the filtered file.
///
/// Access events are dropped: reading the file to publish a snapshot
/// reports one, and it must not schedule another read.
fn is_relevant(filter: &impl FileFilter, event: &Event) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event.paths.iter().any(|path| match Utf8Path::from_path(path) {
        Some(path) => filter.should_process(path),
        None => {
            tracing::warn!(path = %path.display(), "Skipping non-UTF-8 path in file event");
            false
        }
    })
}

/// Debounce thread body.
///
/// Waits for a first event, then keeps absorbing events until `window`
/// passes without one, and publishes once for the whole burst. Returns when
/// the backend is dropped or the watcher is deactivated.
fn debounce(
    rx: &mpsc::Receiver<()>,
    window: Duration,
    target: &Utf8Path,
    publisher: &Weak<watch::Sender<Snapshot>>,
) {
    while rx.recv().is_ok() {
        let mut burst = 1_usize;
        loop {
            match rx.recv_timeout(window) {
                Ok(()) => burst += 1,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }

        let Some(tx) = publisher.upgrade() else {
            return;
        };
        publish_settled(target, burst, &tx);
    }
}

/// Re-reads the source after a settled burst of changes.
fn publish_settled(target: &Utf8Path, burst: usize, tx: &watch::Sender<Snapshot>) {
    let event = SourceEvent::classify(target);
    match event.kind {
        SourceEventKind::Changed => {
            tracing::info!(source = %event.path, events = burst, "File event detected, updating data");
            tx.send_replace(Snapshot::load(&event.path));
        }
        SourceEventKind::Removed => {
            tracing::warn!(source = %event.path, "Source file was deleted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use serde_json::json;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(5);
    const QUIET: Duration = Duration::from_millis(600);

    /// Polling keeps most of these tests independent of inotify availability.
    fn test_config() -> WatchConfig {
        WatchConfig {
            debounce_ms: 100,
            poll_interval_ms: Some(20),
        }
    }

    fn native_config() -> WatchConfig {
        WatchConfig {
            debounce_ms: 100,
            poll_interval_ms: None,
        }
    }

    fn fixture(contents: &str) -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("feed.json")).expect("UTF-8 path");
        fs::write(&path, contents).expect("Failed to write fixture");
        (dir, path)
    }

    async fn next(stream: &mut SnapshotStream) -> Snapshot {
        tokio::time::timeout(WAIT, stream.next())
            .await
            .expect("Timed out waiting for snapshot")
            .expect("Stream ended")
    }

    #[tokio::test]
    async fn test_first_snapshot_is_current_contents() {
        let (_dir, path) = fixture(r#"{"reels": [{"program": "BFA"}]}"#);
        let watcher = SourceWatcher::activate(&path, &test_config()).expect("activate");

        let mut stream = watcher.subscribe();
        let first = next(&mut stream).await;
        assert_eq!(first.records(), &[json!({"program": "BFA"})]);
        assert!(watcher.is_active());
        assert_eq!(watcher.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let dir = TempDir::new().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("later.json")).expect("UTF-8 path");

        let watcher = SourceWatcher::activate(&path, &test_config()).expect("activate");
        let mut stream = watcher.subscribe();
        assert!(next(&mut stream).await.is_empty());

        fs::write(&path, "[1, 2]").expect("write");
        assert_eq!(next(&mut stream).await.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let result = SourceWatcher::activate(
            Utf8Path::new("/nonexistent/path/that/does/not/exist/feed.json"),
            &test_config(),
        );
        assert!(matches!(result, Err(WatchError::PathNotFound(_))));
    }

    #[tokio::test]
    async fn test_modification_emits_snapshot() {
        let (_dir, path) = fixture("[1]");
        let watcher = SourceWatcher::activate(&path, &test_config()).expect("activate");
        let mut stream = watcher.subscribe();
        let _ = next(&mut stream).await;

        fs::write(&path, "[1, 2, 3]").expect("write");
        assert_eq!(next(&mut stream).await.len(), 3);
    }

    #[tokio::test]
    async fn test_rapid_writes_coalesce() {
        let (_dir, path) = fixture("[]");
        let watcher = SourceWatcher::activate(&path, &test_config()).expect("activate");
        let mut stream = watcher.subscribe();
        let _ = next(&mut stream).await;

        fs::write(&path, "[1]").expect("write");
        fs::write(&path, "[1, 2]").expect("write");
        fs::write(&path, "[1, 2, 3]").expect("write");

        assert_eq!(next(&mut stream).await.len(), 3);
        assert_quiet(&mut stream).await;
    }

    #[tokio::test]
    async fn test_malformed_contents_emit_empty_snapshot() {
        let (_dir, path) = fixture("[1]");
        let watcher = SourceWatcher::activate(&path, &test_config()).expect("activate");
        let mut stream = watcher.subscribe();
        let _ = next(&mut stream).await;

        fs::write(&path, "{ not json").expect("write");
        assert!(next(&mut stream).await.is_empty());
    }

    async fn assert_quiet(stream: &mut SnapshotStream) {
        let extra = tokio::time::timeout(QUIET, stream.next()).await;
        assert!(extra.is_err(), "unexpected snapshot: {extra:?}");
    }

    async fn idle_source_stays_quiet(config: WatchConfig) {
        let (_dir, path) = fixture("[1]");
        let watcher = SourceWatcher::activate(&path, &config).expect("activate");
        let mut stream = watcher.subscribe();
        let _ = next(&mut stream).await;

        // Reading the file for a second subscriber must not count as a change.
        let mut other = watcher.subscribe();
        let _ = next(&mut other).await;

        assert_quiet(&mut stream).await;
        assert_quiet(&mut stream).await;
    }

    async fn replacement_in_one_window_emits_once(config: WatchConfig) {
        let (_dir, path) = fixture("[1]");
        let watcher = SourceWatcher::activate(&path, &config).expect("activate");
        let mut stream = watcher.subscribe();
        let _ = next(&mut stream).await;

        fs::remove_file(&path).expect("remove");
        fs::write(&path, "[1, 2]").expect("recreate");

        assert_eq!(next(&mut stream).await.len(), 2);
        assert_quiet(&mut stream).await;
    }

    async fn rename_into_place_emits_once(config: WatchConfig) {
        let (dir, path) = fixture("[1]");
        let watcher = SourceWatcher::activate(&path, &config).expect("activate");
        let mut stream = watcher.subscribe();
        let _ = next(&mut stream).await;

        let staged = dir.path().join("feed.json.tmp");
        fs::write(&staged, "[1, 2, 3]").expect("write staged");
        fs::rename(&staged, &path).expect("rename");

        assert_eq!(next(&mut stream).await.len(), 3);
        assert_quiet(&mut stream).await;
    }

    #[tokio::test]
    async fn test_idle_source_stays_quiet() {
        idle_source_stays_quiet(test_config()).await;
    }

    #[tokio::test]
    async fn test_idle_source_stays_quiet_native() {
        idle_source_stays_quiet(native_config()).await;
    }

    #[tokio::test]
    async fn test_native_modification_emits_once() {
        let (_dir, path) = fixture("[1]");
        let watcher = SourceWatcher::activate(&path, &native_config()).expect("activate");
        let mut stream = watcher.subscribe();
        let _ = next(&mut stream).await;

        fs::write(&path, "[1, 2]").expect("write");
        assert_eq!(next(&mut stream).await.len(), 2);
        assert_quiet(&mut stream).await;
    }

    #[tokio::test]
    async fn test_replacement_in_one_window_emits_once() {
        replacement_in_one_window_emits_once(test_config()).await;
    }

    #[tokio::test]
    async fn test_replacement_in_one_window_emits_once_native() {
        replacement_in_one_window_emits_once(native_config()).await;
    }

    #[tokio::test]
    async fn test_rename_into_place_emits_once() {
        rename_into_place_emits_once(test_config()).await;
    }

    #[tokio::test]
    async fn test_rename_into_place_emits_once_native() {
        rename_into_place_emits_once(native_config()).await;
    }

    #[test]
    fn test_access_events_are_not_relevant() {
        use notify::event::{
            AccessKind, AccessMode, CreateKind, DataChange, ModifyKind, RenameMode,
        };

        let filter = SourceFileFilter::new(Utf8Path::new("/srv/static/data/feed.json"));
        let target = std::path::PathBuf::from("/srv/static/data/feed.json");
        let sibling = std::path::PathBuf::from("/srv/static/data/feed.json.tmp");

        let open = Event::new(EventKind::Access(AccessKind::Open(AccessMode::Any)))
            .add_path(target.clone());
        let closed = Event::new(EventKind::Access(AccessKind::Close(AccessMode::Write)))
            .add_path(target.clone());
        assert!(!is_relevant(&filter, &open));
        assert!(!is_relevant(&filter, &closed));

        let written = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Any)))
            .add_path(target.clone());
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(target.clone());
        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(sibling.clone())
            .add_path(target);
        assert!(is_relevant(&filter, &written));
        assert!(is_relevant(&filter, &created));
        assert!(is_relevant(&filter, &renamed));

        let staged = Event::new(EventKind::Create(CreateKind::File)).add_path(sibling);
        assert!(!is_relevant(&filter, &staged));
    }

    #[tokio::test]
    async fn test_deletion_then_replacement() {
        let (_dir, path) = fixture("[1]");
        let watcher = SourceWatcher::activate(&path, &test_config()).expect("activate");
        let mut stream = watcher.subscribe();
        let _ = next(&mut stream).await;

        fs::remove_file(&path).expect("remove");
        let during_gap = tokio::time::timeout(QUIET, stream.next()).await;
        assert!(during_gap.is_err(), "deletion must not emit, got {during_gap:?}");

        fs::write(&path, r#"{"items": [1, 2]}"#).expect("recreate");
        assert_eq!(next(&mut stream).await.len(), 2);
    }

    #[tokio::test]
    async fn test_sibling_changes_are_ignored() {
        let (dir, path) = fixture("[1]");
        let watcher = SourceWatcher::activate(&path, &test_config()).expect("activate");
        let mut stream = watcher.subscribe();
        let _ = next(&mut stream).await;

        fs::write(dir.path().join("other.json"), "[9, 9]").expect("write sibling");
        assert_quiet(&mut stream).await;
    }

    #[tokio::test]
    async fn test_deactivate_is_idempotent_and_ends_streams() {
        let (_dir, path) = fixture("[1]");
        let mut watcher = SourceWatcher::activate(&path, &test_config()).expect("activate");
        let mut stream = watcher.subscribe();
        let _ = next(&mut stream).await;

        watcher.deactivate();
        watcher.deactivate();
        assert!(!watcher.is_active());
        assert_eq!(watcher.subscriber_count(), 0);

        let end = tokio::time::timeout(WAIT, stream.next()).await.expect("stream should end");
        assert!(end.is_none());

        let mut late = watcher.subscribe();
        assert_eq!(next(&mut late).await.len(), 1);
        assert!(late.next().await.is_none());
    }

    #[test]
    fn test_resolve_target_relative() {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8Path::from_path(dir.path()).expect("UTF-8 path");
        let resolved = resolve_target(&root.join("feed.json")).expect("resolve");
        assert!(resolved.is_absolute());
        assert_eq!(resolved.file_name(), Some("feed.json"));

        assert!(matches!(resolve_target(Utf8Path::new("/")), Err(WatchError::NotAFile(_))));
    }
}
