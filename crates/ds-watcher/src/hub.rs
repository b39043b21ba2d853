//! One watcher per distinct source, shared by every subscriber.
//!
//! [`SourceHub::acquire`] returns a [`SourceLease`]. Leases for the same file
//! share one [`SourceWatcher`], so N subscribers cost one OS watch and one
//! re-read per change. Each lease is still independent: dropping it affects
//! no other subscriber, and dropping the last one deactivates the watcher
//! before the drop returns.
//!
//! # Examples
//!
//! ```no_run
//! use ds_watcher::SourceHub;
//! use ds_core::{Snapshot, WatchConfig};
//! use camino::Utf8Path;
//!
//! # fn example() -> Result<(), ds_watcher::WatchError> {
//! let hub = SourceHub::new(WatchConfig::default());
//!
//! let a = hub.acquire(Utf8Path::new("static/data/reels.json"))?;
//! let b = hub.acquire(Utf8Path::new("static/data/reels.json"))?;
//! assert_eq!(hub.active_sources(), 1);
//!
//! drop(a);
//! drop(b); // watcher released here
//! assert_eq!(hub.active_sources(), 0);
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Weak};

use camino::{Utf8Path, Utf8PathBuf};
use ds_core::{Snapshot, WatchConfig};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::WatchError;
use crate::stream::SnapshotStream;
use crate::watcher::{resolve_target, SourceWatcher};

type Registry = Mutex<FxHashMap<Utf8PathBuf, Weak<SharedSource>>>;

/// Registry of active source watchers.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct SourceHub {
    config: WatchConfig,
    sources: Arc<Registry>,
}

impl std::fmt::Debug for SourceHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHub")
            .field("config", &self.config)
            .field("active_sources", &self.active_sources())
            .finish()
    }
}

impl SourceHub {
    /// Creates an empty hub whose watchers use `config`.
    #[must_use]
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            sources: Arc::new(Mutex::new(FxHashMap::default())),
        }
    }

    /// Returns a lease on the watcher for `path`, activating it if needed.
    ///
    /// Activation performs blocking file I/O; call this from a blocking
    /// context when running inside an async runtime. The registry is not
    /// locked while a watcher activates, so a slow source never holds up
    /// acquisition of another.
    ///
    /// # Errors
    ///
    /// Returns any [`WatchError`] from [`SourceWatcher::activate`].
    pub fn acquire(&self, path: &Utf8Path) -> Result<SourceLease, WatchError> {
        let key = resolve_target(path)?;

        if let Some(shared) = self.lookup(&key) {
            tracing::debug!(source = %key, "Sharing existing source watcher");
            return Ok(SourceLease { shared });
        }

        let watcher = SourceWatcher::activate(&key, &self.config)?;

        let mut sources = self.sources.lock();
        if let Some(shared) = sources.get(&key).and_then(Weak::upgrade) {
            drop(sources);
            tracing::debug!(source = %key, "Another subscriber activated this source first");
            drop(watcher);
            return Ok(SourceLease { shared });
        }

        let shared = Arc::new(SharedSource {
            key: key.clone(),
            watcher: Mutex::new(watcher),
            registry: Arc::downgrade(&self.sources),
        });
        sources.insert(key, Arc::downgrade(&shared));

        Ok(SourceLease { shared })
    }

    fn lookup(&self, key: &Utf8Path) -> Option<Arc<SharedSource>> {
        self.sources.lock().get(key).and_then(Weak::upgrade)
    }

    /// Returns the number of sources with at least one live lease.
    #[must_use]
    pub fn active_sources(&self) -> usize {
        self.sources
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Returns the watch configuration used for new watchers.
    #[must_use]
    pub const fn config(&self) -> &WatchConfig {
        &self.config
    }
}

/// A watcher plus its registry slot.
struct SharedSource {
    key: Utf8PathBuf,
    watcher: Mutex<SourceWatcher>,
    registry: Weak<Registry>,
}

impl Drop for SharedSource {
    fn drop(&mut self) {
        self.watcher.get_mut().deactivate();

        if let Some(registry) = self.registry.upgrade() {
            let mut sources = registry.lock();
            // A racing acquire may already have installed a fresh watcher.
            if sources
                .get(&self.key)
                .is_some_and(|weak| weak.strong_count() == 0)
            {
                sources.remove(&self.key);
            }
        }
    }
}

/// One subscriber's claim on a shared source watcher.
///
/// Dropping the lease is the subscriber's cancellation. The last lease to
/// go deactivates the watcher synchronously.
pub struct SourceLease {
    shared: Arc<SharedSource>,
}

impl std::fmt::Debug for SourceLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceLease")
            .field("path", &self.shared.key)
            .field("leases", &self.lease_count())
            .finish()
    }
}

impl SourceLease {
    /// Returns a new snapshot stream; see [`SourceWatcher::subscribe`].
    ///
    /// This performs blocking file I/O.
    #[must_use]
    pub fn snapshots(&self) -> SnapshotStream {
        // Subscribe before reading so a change racing the read is not lost.
        let rx = self.shared.watcher.lock().receiver();
        SnapshotStream::new(Snapshot::load(&self.shared.key), rx)
    }

    /// Returns the absolute path of the watched file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.shared.key
    }

    /// Returns the number of live leases on this source, this one included.
    #[must_use]
    pub fn lease_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_hub() -> SourceHub {
        SourceHub::new(WatchConfig {
            debounce_ms: 50,
            poll_interval_ms: Some(20),
        })
    }

    fn fixture() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("events.json")).expect("UTF-8 path");
        std::fs::write(&path, "[1]").expect("write");
        (dir, path)
    }

    #[test]
    fn test_leases_share_one_watcher() {
        let (_dir, path) = fixture();
        let hub = test_hub();

        let a = hub.acquire(&path).expect("acquire");
        let b = hub.acquire(&path).expect("acquire");

        assert_eq!(hub.active_sources(), 1);
        assert_eq!(a.lease_count(), 2);
        assert_eq!(a.path(), b.path());

        drop(a);
        assert_eq!(hub.active_sources(), 1);
        assert_eq!(b.lease_count(), 1);

        drop(b);
        assert_eq!(hub.active_sources(), 0);
    }

    #[test]
    fn test_equivalent_paths_share_a_key() {
        let (dir, path) = fixture();
        let hub = test_hub();

        let dotted = Utf8PathBuf::from_path_buf(dir.path().join(".").join("events.json"))
            .expect("UTF-8 path");
        let _a = hub.acquire(&path).expect("acquire");
        let _b = hub.acquire(&dotted).expect("acquire");
        assert_eq!(hub.active_sources(), 1);
    }

    #[test]
    fn test_reacquire_after_release() {
        let (_dir, path) = fixture();
        let hub = test_hub();

        drop(hub.acquire(&path).expect("acquire"));
        assert_eq!(hub.active_sources(), 0);

        let again = hub.acquire(&path).expect("acquire");
        assert_eq!(again.lease_count(), 1);
        assert_eq!(hub.active_sources(), 1);
    }

    #[test]
    fn test_concurrent_acquires_share_one_watcher() {
        let (_dir, path) = fixture();
        let hub = test_hub();
        let barrier = std::sync::Barrier::new(8);

        let leases: Vec<SourceLease> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        hub.acquire(&path).expect("acquire")
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("join")).collect()
        });

        assert_eq!(hub.active_sources(), 1);
        assert!(leases.iter().all(|lease| lease.lease_count() == 8));
        drop(leases);
        assert_eq!(hub.active_sources(), 0);
    }

    /// A FIFO with no writer blocks the initial read, standing in for a slow
    /// disk.
    #[cfg(unix)]
    #[test]
    fn test_slow_source_does_not_block_other_sources() {
        use std::sync::mpsc;

        let slow_dir = TempDir::new().expect("temp dir");
        let fifo = Utf8PathBuf::from_path_buf(slow_dir.path().join("slow.json"))
            .expect("UTF-8 path");
        let status = std::process::Command::new("mkfifo")
            .arg(fifo.as_str())
            .status()
            .expect("run mkfifo");
        assert!(status.success());

        let (_dir, fast) = fixture();
        let hub = SourceHub::new(WatchConfig {
            debounce_ms: 50,
            poll_interval_ms: None,
        });

        let slow_hub = hub.clone();
        let slow_path = fifo.clone();
        let slow = std::thread::spawn(move || slow_hub.acquire(&slow_path));
        std::thread::sleep(Duration::from_millis(200));

        let (tx, rx) = mpsc::channel();
        let fast_hub = hub.clone();
        std::thread::spawn(move || {
            tx.send(fast_hub.acquire(&fast).map(|lease| lease.lease_count()))
                .ok();
        });
        let fast_result = rx.recv_timeout(Duration::from_secs(3));

        // Unblock the slow read before asserting so the test never hangs.
        std::fs::write(&fifo, "[1, 2]").expect("write fifo");
        let slow_lease = slow.join().expect("join").expect("acquire slow");

        assert_eq!(fast_result.expect("fast source waited on slow one").ok(), Some(1));
        assert_eq!(slow_lease.lease_count(), 1);
    }

    #[test]
    fn test_acquire_missing_directory() {
        let hub = test_hub();
        let result = hub.acquire(Utf8Path::new("/nonexistent/dir/events.json"));
        assert!(matches!(result, Err(WatchError::PathNotFound(_))));
        assert_eq!(hub.active_sources(), 0);
    }

    #[tokio::test]
    async fn test_each_lease_gets_every_change() {
        let (_dir, path) = fixture();
        let hub = test_hub();

        let a = hub.acquire(&path).expect("acquire");
        let b = hub.acquire(&path).expect("acquire");
        let mut sa = a.snapshots();
        let mut sb = b.snapshots();
        assert_eq!(sa.next().await.map(|s| s.len()), Some(1));
        assert_eq!(sb.next().await.map(|s| s.len()), Some(1));

        std::fs::write(&path, "[1, 2]").expect("write");

        let wait = Duration::from_secs(5);
        let na = tokio::time::timeout(wait, sa.next()).await.expect("a timed out");
        let nb = tokio::time::timeout(wait, sb.next()).await.expect("b timed out");
        assert_eq!(na.map(|s| s.len()), Some(2));
        assert_eq!(nb.map(|s| s.len()), Some(2));

        // Cancelling one subscriber leaves the other streaming.
        drop(sa);
        drop(a);
        std::fs::write(&path, "[1, 2, 3]").expect("write");
        let nb = tokio::time::timeout(wait, sb.next()).await.expect("b timed out");
        assert_eq!(nb.map(|s| s.len()), Some(3));
    }
}
