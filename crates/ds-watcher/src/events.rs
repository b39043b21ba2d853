//! Settled change events for a watched source.
//!
//! The debounce thread only learns that *something* happened to a path.
//! This module turns that into a [`SourceEvent`] by checking what is on disk
//! once the writes have settled.
//!
//! # Event Flow
//!
//! ```text
//! File System Change (modify, create, delete, rename)
//!        │
//!        ▼
//! notify backend ── access events dropped
//!        │
//!        ▼
//! debounce thread (quiet window)
//!        │
//!        ▼
//! SourceEvent::classify
//!        │
//!        ├── Changed  ──► re-read, emit snapshot
//!        └── Removed  ──► log, keep waiting
//! ```

use camino::{Utf8Path, Utf8PathBuf};

/// What a settled change left on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceEventKind {
    /// The file exists: it was modified, created, or replaced.
    Changed,

    /// The file no longer exists.
    Removed,
}

/// A settled change to a watched source.
///
/// # Examples
///
/// ```
/// use ds_watcher::{SourceEvent, SourceEventKind};
/// use camino::Utf8Path;
///
/// let event = SourceEvent::classify(Utf8Path::new("/definitely/not/here.json"));
/// assert_eq!(event.kind, SourceEventKind::Removed);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEvent {
    /// The source file.
    pub path: Utf8PathBuf,

    /// What the change left on disk.
    pub kind: SourceEventKind,
}

impl SourceEvent {
    /// Classifies a settled change by checking whether `path` still exists.
    #[must_use]
    pub fn classify(path: &Utf8Path) -> Self {
        let kind = if path.is_file() {
            SourceEventKind::Changed
        } else {
            SourceEventKind::Removed
        };
        Self {
            path: path.to_path_buf(),
            kind,
        }
    }
}
