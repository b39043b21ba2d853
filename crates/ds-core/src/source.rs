//! Validated references to watchable data sources.
//!
//! A [`DataSourceRef`] is built once from the `data_source` request
//! parameter and is immutable afterwards. Construction goes through
//! [`DataSourceRef::parse`], which applies a [`TrustPolicy`]: the value must
//! live under the trusted directory, end in the trusted extension, and be a
//! plain relative path that cannot climb out of that directory.
//!
//! # Examples
//!
//! ```
//! use ds_core::{DataSourceRef, TrustPolicy};
//!
//! let policy = TrustPolicy::default();
//!
//! let source = DataSourceRef::parse("static/data/reels.json", &policy).unwrap();
//! assert_eq!(source.as_str(), "static/data/reels.json");
//!
//! assert!(DataSourceRef::parse("static/data/../secrets.json", &policy).is_err());
//! assert!(DataSourceRef::parse("static/data/reels.yaml", &policy).is_err());
//! ```

use std::fmt;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// The trust boundary for `data_source` values.
///
/// Defaults to the `static/data/` directory and the `.json` extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustPolicy {
    /// Directory prefix every data source must start with.
    ///
    /// Compared as a string prefix; a trailing `/` is implied.
    pub trusted_dir: String,

    /// File extension every data source must end with, including the dot.
    pub extension: String,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            trusted_dir: "static/data/".to_owned(),
            extension: ".json".to_owned(),
        }
    }
}

impl TrustPolicy {
    /// Creates a policy for the given directory and extension.
    #[must_use]
    pub fn new(trusted_dir: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            trusted_dir: trusted_dir.into(),
            extension: extension.into(),
        }
    }

    /// Returns the trusted directory with exactly one trailing `/`.
    #[must_use]
    pub fn dir_prefix(&self) -> String {
        format!("{}/", self.trusted_dir.trim_end_matches('/'))
    }

    /// The plain-text reason sent to clients whose value was rejected.
    #[must_use]
    pub fn rejection_message(&self) -> String {
        format!(
            "Invalid data source path. Must be within {} directory and be a {} file",
            self.dir_prefix(),
            self.extension
        )
    }
}

/// An opaque, validated identifier for a watchable file.
///
/// Holds the relative path exactly as the client sent it. Use
/// [`resolve`](Self::resolve) to anchor it to the directory the server
/// serves from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataSourceRef {
    relative: Utf8PathBuf,
}

impl DataSourceRef {
    /// Validates `value` against `policy`.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] describing the first rule the value breaks.
    pub fn parse(value: &str, policy: &TrustPolicy) -> Result<Self, SourceError> {
        if value.is_empty() {
            return Err(SourceError::Missing);
        }

        if value.contains(['\\', '\0']) {
            return Err(SourceError::DisallowedComponent {
                value: value.to_owned(),
            });
        }

        let prefix = policy.dir_prefix();
        if !value.starts_with(&prefix) {
            return Err(SourceError::OutsideTrustedDir {
                value: value.to_owned(),
                trusted_dir: prefix,
            });
        }

        let path = Utf8Path::new(value);
        let has_stem = path
            .file_name()
            .is_some_and(|name| name.len() > policy.extension.len());
        if !value.ends_with(&policy.extension) || !has_stem {
            return Err(SourceError::WrongExtension {
                value: value.to_owned(),
                extension: policy.extension.clone(),
            });
        }

        if !path
            .components()
            .all(|component| matches!(component, Utf8Component::Normal(_)))
        {
            return Err(SourceError::DisallowedComponent {
                value: value.to_owned(),
            });
        }

        Ok(Self {
            relative: path.to_path_buf(),
        })
    }

    /// Returns the value as the client sent it.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.relative.as_str()
    }

    /// Returns the relative path.
    #[must_use]
    pub fn as_path(&self) -> &Utf8Path {
        &self.relative
    }

    /// Anchors the relative path to `root`.
    #[must_use]
    pub fn resolve(&self, root: &Utf8Path) -> Utf8PathBuf {
        root.join(&self.relative)
    }
}

impl fmt::Display for DataSourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<Utf8Path> for DataSourceRef {
    fn as_ref(&self) -> &Utf8Path {
        &self.relative
    }
}
