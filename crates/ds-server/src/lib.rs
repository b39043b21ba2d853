//! Server-sent event endpoint for live data source updates.
//!
//! This crate exposes one endpoint, `GET <endpoint>?data_source=<path>`.
//! A valid request gets a long-lived `text/event-stream` response that
//! opens with a `connected` frame and then carries the source's records
//! as a JSON array, once immediately and again after every settled change.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   validate    ┌────────────┐   acquire   ┌─────────────┐
//! │  request   │──────────────▶│ routes.rs  │────────────▶│  SourceHub  │
//! │ ?data_src= │  400 on fail  └────────────┘             └──────┬──────┘
//! └────────────┘                     │                            │ lease
//!                                    ▼                            ▼
//!                             ┌────────────┐  snapshots   ┌─────────────┐
//!                             │ Connection │◀─────────────│SourceWatcher│
//!                             └─────┬──────┘              └─────────────┘
//!                                   │ frames
//!                                   ▼
//!                             response body
//! ```
//!
//! Each [`Connection`] owns a lease on its source. Closing the connection,
//! from either side, drops the lease; the last lease on a source stops its
//! watcher.
//!
//! # Example
//!
//! ```no_run
//! use ds_core::Config;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), ds_server::ServerError> {
//! let shutdown = CancellationToken::new();
//! ds_server::serve(Config::default(), shutdown).await?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod publisher;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ServerError;
pub use publisher::Connection;
pub use routes::{router, StreamParams};
pub use server::{serve, serve_on};
pub use state::AppState;
