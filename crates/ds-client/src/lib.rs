//! Reconnecting subscriber for datastream event streams.
//!
//! [`subscribe`] opens `GET <endpoint>?data_source=<path>`, decodes every
//! snapshot frame, runs it through a caller-supplied transform, and writes
//! the result to a [`SnapshotSink`]. When the connection fails it retries
//! with exponential backoff (`base_interval * 2^attempt`) until the retry
//! budget runs out; a successful connection resets the budget.
//!
//! The returned [`Subscription`] closes everything, pending retry timers
//! included, when closed or dropped.
//!
//! # Modules
//!
//! - [`subscriber`] - the state machine task and its [`Subscription`] handle
//! - [`retry`] - backoff bookkeeping
//! - [`transport`] - the [`Transport`] seam and the `reqwest` implementation
//! - [`sink`] - where transformed snapshots go

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod retry;
pub mod sink;
pub mod state;
pub mod subscriber;
pub mod transport;

pub use error::{ClientError, TransportError};
pub use retry::RetryState;
pub use sink::SnapshotSink;
pub use state::SubscriberState;
pub use subscriber::{subscribe, SubscribeOptions, Subscription, DEFAULT_LOG_PREFIX};
pub use transport::{ByteStream, HttpTransport, Transport};
