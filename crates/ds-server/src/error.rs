//! Error types for the ds-server crate.
//!
//! [`ServerError`] covers everything that can stop a stream from opening,
//! plus listener failures. Errors raised *after* a stream has opened never
//! reach this type: read and parse problems become empty snapshots, and a
//! transport failure simply ends the connection.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use ds_core::SourceError;
use ds_watcher::WatchError;
use thiserror::Error;

/// Errors that can occur while opening a stream or running the server.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
    /// The `data_source` parameter failed the trust policy.
    #[error("{message}")]
    InvalidSource {
        /// The specific rule that was broken (logged, not sent).
        #[source]
        source: SourceError,
        /// The plain-text reason sent to the client.
        message: String,
    },

    /// The watcher for a valid source could not be started.
    #[error("watcher error: {0}")]
    Watch(#[from] WatchError),

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The listener could not be bound or failed while serving.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Creates a validation error carrying the client-facing `message`.
    pub fn invalid_source(source: SourceError, message: impl Into<String>) -> Self {
        Self::InvalidSource {
            source,
            message: message.into(),
        }
    }

    /// Returns the HTTP status this error maps to.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidSource { .. } => StatusCode::BAD_REQUEST,
            Self::Watch(err) if err.is_not_found() => StatusCode::NOT_FOUND,
            Self::Watch(_) | Self::Task(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` if the client caused the error.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// Returns `true` if the server can keep serving after this error.
    ///
    /// Only listener failures are fatal; everything else is confined to
    /// one request.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }

    /// Returns `true` if the server cannot continue.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    fn client_message(&self) -> String {
        match self {
            Self::InvalidSource { message, .. } => message.clone(),
            Self::Watch(err) if err.is_not_found() => "Data source not found".to_owned(),
            Self::Watch(_) | Self::Task(_) | Self::Io(_) => "Internal server error".to_owned(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::InvalidSource { source, .. } => {
                tracing::warn!(reason = %source, "Rejected stream request");
            }
            other if other.is_client_error() => {
                tracing::warn!(error = %other, "Rejected stream request");
            }
            other => tracing::error!(error = %other, "Failed to open stream"),
        }
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.client_message(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn test_invalid_source_is_bad_request() {
        let err = ServerError::invalid_source(SourceError::Missing, "Invalid data source path");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "Invalid data source path");
    }

    #[test]
    fn test_missing_directory_is_not_found() {
        let err = ServerError::from(WatchError::PathNotFound(Utf8PathBuf::from("static/data")));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.client_message(), "Data source not found");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_io_is_internal() {
        let err = ServerError::from(std::io::Error::other("boom"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.is_client_error());
        assert!(err.is_fatal());
        assert_eq!(err.client_message(), "Internal server error");
    }

    #[test]
    fn test_into_response_status() {
        let response = ServerError::invalid_source(SourceError::Missing, "nope").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }
}
