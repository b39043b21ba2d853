//! The lazy snapshot sequence handed to each subscriber.

use std::pin::Pin;
use std::task::{Context, Poll};

use ds_core::Snapshot;
use futures_util::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// A lazy, infinite, non-restartable sequence of snapshots.
///
/// The first item is the snapshot read when the stream was created; every
/// later item is the newest snapshot published after a settled change.
/// A consumer that polls slowly sees only the most recent snapshot, never a
/// backlog.
///
/// The stream ends once its watcher is deactivated.
pub struct SnapshotStream {
    /// Snapshot read at subscription time, yielded first.
    initial: Option<Snapshot>,

    /// Snapshots published after subscription.
    changes: WatchStream<Snapshot>,
}

impl SnapshotStream {
    /// Creates a stream that yields `initial`, then each change seen by `rx`.
    ///
    /// Values already in `rx` when this is called are not repeated.
    pub(crate) fn new(initial: Snapshot, rx: watch::Receiver<Snapshot>) -> Self {
        Self {
            initial: Some(initial),
            changes: WatchStream::from_changes(rx),
        }
    }
}

impl std::fmt::Debug for SnapshotStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStream")
            .field("initial_pending", &self.initial.is_some())
            .finish_non_exhaustive()
    }
}

impl Stream for SnapshotStream {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Snapshot>> {
        if let Some(initial) = self.initial.take() {
            return Poll::Ready(Some(initial));
        }
        Pin::new(&mut self.changes).poll_next(cx)
    }
}
