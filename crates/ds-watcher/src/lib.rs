//! Data source watching with debouncing and snapshot streaming.
//!
//! This crate turns a file-backed JSON document into a lazy, infinite
//! sequence of [`Snapshot`](ds_core::Snapshot)s: one read immediately on
//! activation, then one per settled change to the file.
//!
//! # Overview
//!
//! - Detect modification *and* replacement (delete + re-create) of a file
//! - Debounce rapid successive writes into one snapshot
//! - Ignore plain deletion (logged, no snapshot)
//! - Share one watcher between every subscriber of the same file
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              notify backend + debounce thread                   │
//! │  ┌──────────────────┐    ┌────────────────┐    ┌────────────┐  │
//! │  │ Recommended/Poll │ -> │ Debounce       │ -> │ Re-read    │  │
//! │  │ watcher (parent) │    │ (quiet window) │    │ and parse  │  │
//! │  └──────────────────┘    └────────────────┘    └─────┬──────┘  │
//! │    access events and sibling files dropped           │         │
//! └──────────────────────────────────────────────────────│─────────┘
//!                                                        │
//!                                           send_replace │
//!                                                        ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Async Runtime (tokio)                        │
//! │  ┌──────────────────┐    ┌────────────────┐                     │
//! │  │ watch::Sender    │ -> │ SnapshotStream │ -> one per          │
//! │  │ (latest wins)    │    │ (per lease)    │    connection       │
//! │  └──────────────────┘    └────────────────┘                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The parent directory is watched rather than the file itself, so an
//! editor or deploy script that replaces the file still produces events.
//!
//! # Usage
//!
//! ```no_run
//! use ds_watcher::SourceHub;
//! use ds_core::WatchConfig;
//! use camino::Utf8Path;
//! use futures_util::StreamExt;
//!
//! # async fn example() -> Result<(), ds_watcher::WatchError> {
//! let hub = SourceHub::new(WatchConfig::default());
//! let lease = hub.acquire(Utf8Path::new("static/data/reels.json"))?;
//! let mut snapshots = lease.snapshots();
//!
//! while let Some(snapshot) = snapshots.next().await {
//!     println!("{} records", snapshot.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Backpressure
//!
//! Snapshots travel through a `tokio::sync::watch` channel. A subscriber
//! that falls behind skips straight to the newest snapshot; intermediate
//! ones are superseded, never queued.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod filter;
pub mod hub;
pub mod stream;
pub mod watcher;

// Re-export error types
pub use error::WatchError;

// Re-export event types
pub use events::{SourceEvent, SourceEventKind};

// Re-export filter types
pub use filter::{FileFilter, SourceFileFilter};

// Re-export hub types
pub use hub::{SourceHub, SourceLease};

// Re-export stream and watcher types
pub use stream::SnapshotStream;
pub use watcher::SourceWatcher;
