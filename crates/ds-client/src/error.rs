//! Error types for the ds-client crate.
//!
//! [`TransportError`] is what a single connection attempt can fail with;
//! the subscriber answers every one of them with its retry schedule.
//! [`ClientError`] is what reaches the caller.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised by a [`Transport`](crate::Transport) while opening or
/// reading a stream.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with something other than `200 OK`.
    #[error("unexpected status: {0}")]
    Status(StatusCode),

    /// The server answered `200 OK` but not with an event stream.
    #[error("unexpected content type: {0}")]
    ContentType(String),

    /// The server closed the stream.
    #[error("stream closed by server")]
    Closed,

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Creates an [`Other`](Self::Other) error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Returns the HTTP status, if the server sent one.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status(status) => Some(*status),
            Self::Request(err) => err.status(),
            _ => None,
        }
    }
}

/// Errors surfaced to users of the client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The endpoint URL could not be parsed.
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The rejected endpoint.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The HTTP client could not be built.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Every reconnect attempt failed.
    #[error("gave up after {attempts} reconnect attempts")]
    Exhausted {
        /// Reconnect attempts made after the first connection.
        attempts: u32,
    },
}

impl ClientError {
    /// Creates an [`InvalidEndpoint`](Self::InvalidEndpoint) error.
    pub fn invalid_endpoint(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` if subscribing again might succeed.
    ///
    /// Exhaustion is recoverable: it only means the retry budget ran out.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// Returns `true` if the request itself is malformed.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_status() {
        let err = TransportError::Status(StatusCode::BAD_REQUEST);
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(err.to_string(), "unexpected status: 400 Bad Request");
        assert_eq!(TransportError::Closed.status(), None);
    }

    #[test]
    fn test_client_error_classification() {
        let exhausted = ClientError::Exhausted { attempts: 5 };
        assert!(exhausted.is_recoverable());
        assert_eq!(exhausted.to_string(), "gave up after 5 reconnect attempts");

        let invalid = ClientError::invalid_endpoint("nope", "relative URL without a base");
        assert!(invalid.is_fatal());
        assert_eq!(
            invalid.to_string(),
            "invalid endpoint 'nope': relative URL without a base"
        );
    }
}
