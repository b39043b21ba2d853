//! Core types, errors, and wire frames for the datastream live-update bridge.
//!
//! This crate provides the foundational types shared by the server and the
//! client halves of the bridge:
//!
//! - [`DataSourceRef`] and [`TrustPolicy`] - validated references to watchable files
//! - [`Snapshot`] - one immutable, fully parsed view of a data source
//! - [`Frame`] and [`FrameDecoder`] - the `text/event-stream` wire format
//! - Configuration structures ([`Config`] and its sections)
//! - Error types for validation, parsing, and configuration
//!
//! # Crate Dependencies
//!
//! ```text
//! ds-cli ──► ds-server ──► ds-watcher ──► ds-core
//!        └─► ds-client ───────────────────►
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod frame;
pub mod snapshot;
pub mod source;

pub use config::{Config, RetryConfig, ServerConfig, WatchConfig};
pub use error::{ConfigError, SnapshotError, SourceError};
pub use frame::{Frame, FrameDecoder};
pub use snapshot::Snapshot;
pub use source::{DataSourceRef, TrustPolicy};
