//! Per-connection publishing of snapshot frames.
//!
//! A [`Connection`] is the body of one streaming response. It yields the
//! `connected` acknowledgement first, then one `message` frame per snapshot
//! from its source. Every item is a complete, self-contained frame, so a
//! frame is never split across items.
//!
//! # Backpressure
//!
//! Snapshots are pulled, not pushed. A client that reads slowly never
//! causes a queue to build up: when it is ready for the next frame it gets
//! the newest snapshot, and any snapshots published in between are skipped.
//!
//! # Release
//!
//! Dropping a `Connection` (the client went away, or shutdown cut the body
//! short) releases its lease immediately. When it was the last subscriber
//! of its source, the source's watcher is stopped before the drop returns.

use std::pin::Pin;
use std::task::{Context, Poll};

use ds_core::{DataSourceRef, Frame};
use ds_watcher::{SnapshotStream, SourceLease};
use futures_util::Stream;

use crate::error::ServerError;
use crate::state::AppState;

/// One client's live stream of encoded frames.
pub struct Connection {
    id: u64,
    source: DataSourceRef,
    lease: Option<SourceLease>,
    snapshots: SnapshotStream,
    acknowledged: bool,
    frames_sent: u64,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("open", &self.is_open())
            .field("frames_sent", &self.frames_sent)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Acquires `source` from the hub and prepares its first snapshot.
    ///
    /// This performs blocking file I/O.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Watch`] if the source's watcher cannot start.
    pub fn open(state: &AppState, source: DataSourceRef) -> Result<Self, ServerError> {
        let path = source.resolve(state.root());
        let lease = state.hub().acquire(&path)?;
        let snapshots = lease.snapshots();
        let id = state.next_connection_id();

        tracing::info!(
            connection = id,
            source = %source,
            subscribers = lease.lease_count(),
            "Connection opened"
        );

        Ok(Self {
            id,
            source,
            lease: Some(lease),
            snapshots,
            acknowledged: false,
            frames_sent: 0,
        })
    }

    /// Identifier used in this connection's log lines.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// The source this connection streams.
    #[must_use]
    pub fn source(&self) -> &DataSourceRef {
        &self.source
    }

    /// Returns `true` until [`close`](Self::close) is called.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.lease.is_some()
    }

    /// Releases the source and ends the stream. Idempotent.
    pub fn close(&mut self) {
        if let Some(lease) = self.lease.take() {
            drop(lease);
            tracing::info!(
                connection = self.id,
                source = %self.source,
                frames_sent = self.frames_sent,
                "Connection closed"
            );
        }
    }
}

impl Stream for Connection {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        if !self.acknowledged {
            self.acknowledged = true;
            return Poll::Ready(Some(Frame::connected().encode()));
        }
        if self.lease.is_none() {
            return Poll::Ready(None);
        }

        match Pin::new(&mut self.snapshots).poll_next(cx) {
            Poll::Ready(Some(snapshot)) => {
                self.frames_sent += 1;
                tracing::debug!(
                    connection = self.id,
                    records = snapshot.len(),
                    "Sending snapshot"
                );
                Poll::Ready(Some(Frame::snapshot(&snapshot).encode()))
            }
            Poll::Ready(None) => {
                self.close();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
