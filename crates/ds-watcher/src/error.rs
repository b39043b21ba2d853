//! Error types for the ds-watcher crate.
//!
//! This module provides the [`WatchError`] type for errors that can occur
//! while activating a source watcher.

use camino::Utf8PathBuf;

/// Errors that can occur while activating a source watcher.
///
/// Once a watcher is running it never fails outward: read and parse
/// problems become empty snapshots and backend errors are logged.
///
/// Every variant is fatal to the activation that raised it. A missing
/// directory or a bare directory path is the caller's mistake
/// ([`WatchError::is_not_found`]); the rest are environment failures.
///
/// # Examples
///
/// ```
/// use ds_watcher::WatchError;
///
/// fn handle_error(err: WatchError) {
///     match err {
///         WatchError::PathNotFound(p) => eprintln!("No such directory: {p}"),
///         other if other.is_not_found() => eprintln!("Nothing to watch: {other}"),
///         other => eprintln!("Watcher failed: {other}"),
///     }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum WatchError {
    /// Failed to initialize the notify watcher.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The directory holding the source does not exist.
    #[error("path does not exist: {0}")]
    PathNotFound(Utf8PathBuf),

    /// The path has no file name component.
    #[error("path does not name a file: {0}")]
    NotAFile(Utf8PathBuf),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchError {
    /// Creates a new [`WatchError::PathNotFound`] error.
    #[inline]
    pub fn path_not_found(path: impl Into<Utf8PathBuf>) -> Self {
        Self::PathNotFound(path.into())
    }

    /// Returns `true` if the requested path names nothing that can be watched.
    #[inline]
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::PathNotFound(_) | Self::NotAFile(_))
    }
}
