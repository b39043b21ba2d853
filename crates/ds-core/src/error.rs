//! Error types for the ds-core crate.
//!
//! This module provides three error types:
//!
//! - [`SourceError`] - a `data_source` value failed the trust policy
//! - [`SnapshotError`] - a data source could not be read or parsed
//! - [`ConfigError`] - configuration loading or validation failed

use camino::Utf8PathBuf;

/// A `data_source` value was rejected by the [`TrustPolicy`](crate::TrustPolicy).
///
/// Validation errors are fatal to the request that carried the value: the
/// server answers with HTTP 400 and never opens a stream.
///
/// # Examples
///
/// ```
/// use ds_core::{DataSourceRef, SourceError, TrustPolicy};
///
/// let policy = TrustPolicy::default();
/// let err = DataSourceRef::parse("etc/passwd", &policy).unwrap_err();
/// assert!(matches!(err, SourceError::OutsideTrustedDir { .. }));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SourceError {
    /// No value was supplied.
    #[error("data source is missing")]
    Missing,

    /// The value does not start with the trusted directory.
    #[error("data source '{value}' is not within {trusted_dir}")]
    OutsideTrustedDir {
        /// The rejected value.
        value: String,
        /// The trusted directory prefix.
        trusted_dir: String,
    },

    /// The value does not name a file with the trusted extension.
    #[error("data source '{value}' is not a {extension} file")]
    WrongExtension {
        /// The rejected value.
        value: String,
        /// The trusted extension, including the leading dot.
        extension: String,
    },

    /// The value contains a component that could escape the trusted directory.
    #[error("data source '{value}' contains a disallowed path component")]
    DisallowedComponent {
        /// The rejected value.
        value: String,
    },
}

impl SourceError {
    /// Returns the rejected value, if one was supplied.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Missing => None,
            Self::OutsideTrustedDir { value, .. }
            | Self::WrongExtension { value, .. }
            | Self::DisallowedComponent { value } => Some(value),
        }
    }
}

/// A data source could not be turned into a [`Snapshot`](crate::Snapshot).
///
/// These errors are never surfaced to a subscriber. Callers that stream
/// snapshots use [`Snapshot::load`](crate::Snapshot::load), which logs the
/// error and substitutes the empty snapshot.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SnapshotError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file that failed to read.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The contents are not valid JSON.
    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The JSON is valid but holds no array of records.
    #[error("invalid JSON data format: no array found in {found}")]
    NoRecords {
        /// The kind of JSON value found at the top level.
        found: &'static str,
    },
}

impl SnapshotError {
    /// Returns `true` if the file simply does not exist.
    ///
    /// A missing file is expected between the delete and re-create halves
    /// of a file replacement.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Errors that can occur during configuration loading and validation.
///
/// # Examples
///
/// ```
/// use ds_core::ConfigError;
///
/// let error = ConfigError::InvalidOption {
///     option: "watch.debounce_ms".to_owned(),
///     reason: "must be greater than zero".to_owned(),
/// };
/// assert!(error.to_string().contains("debounce_ms"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration option has an invalid value.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// The name of the invalid option.
        option: String,
        /// Explanation of why the option is invalid.
        reason: String,
    },

    /// An I/O error occurred while reading configuration.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates a new [`ConfigError::InvalidOption`] error.
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }
}
