//! Filtering of raw watch events.
//!
//! A source watcher observes the whole parent directory, so it sees events
//! for sibling files too. Filters decide which of those events concern the
//! watched source before any file is re-read.
//!
//! # Examples
//!
//! ```
//! use ds_watcher::{FileFilter, SourceFileFilter};
//! use camino::Utf8Path;
//!
//! let filter = SourceFileFilter::new(Utf8Path::new("/srv/static/data/reels.json"));
//!
//! assert!(filter.should_process(Utf8Path::new("/srv/static/data/reels.json")));
//! assert!(!filter.should_process(Utf8Path::new("/srv/static/data/quotes.json")));
//! ```

use camino::{Utf8Path, Utf8PathBuf};

/// A filter for determining which file events to process.
///
/// Filters run on the notify backend thread, so they must be [`Send`],
/// [`Sync`], and `'static`.
pub trait FileFilter: Send + Sync + 'static {
    /// Returns `true` if an event for `path` should be processed.
    fn should_process(&self, path: &Utf8Path) -> bool;
}

/// Accepts events for exactly one file.
///
/// Editors often save through a temporary sibling (`.reels.json.swp`,
/// `reels.json~`) and rename it into place; only the final path matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFileFilter {
    target: Utf8PathBuf,
}

impl SourceFileFilter {
    /// Creates a filter for `target`.
    ///
    /// `target` should be absolute and canonical, matching the paths the
    /// watcher backend reports.
    #[must_use]
    pub fn new(target: &Utf8Path) -> Self {
        Self {
            target: target.to_path_buf(),
        }
    }

    /// Returns the accepted path.
    #[must_use]
    pub fn target(&self) -> &Utf8Path {
        &self.target
    }
}

impl FileFilter for SourceFileFilter {
    #[inline]
    fn should_process(&self, path: &Utf8Path) -> bool {
        path == self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_filter_exact_match() {
        let filter = SourceFileFilter::new(Utf8Path::new("/srv/static/data/reels.json"));
        assert!(filter.should_process(Utf8Path::new("/srv/static/data/reels.json")));
        assert_eq!(filter.target().as_str(), "/srv/static/data/reels.json");
    }

    #[test]
    fn test_source_filter_rejects_siblings_and_temp_files() {
        let filter = SourceFileFilter::new(Utf8Path::new("/srv/static/data/reels.json"));
        for path in [
            "/srv/static/data/reels.json~",
            "/srv/static/data/.reels.json.swp",
            "/srv/static/data/quotes.json",
            "/srv/static/data",
        ] {
            assert!(!filter.should_process(Utf8Path::new(path)), "{path}");
        }
    }
}
