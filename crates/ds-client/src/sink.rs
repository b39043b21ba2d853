//! Destinations for transformed snapshots.

use tokio::sync::watch;

/// Receives each transformed snapshot.
///
/// Sinks hold only the latest value: publishing replaces whatever was
/// there, and nothing is queued.
pub trait SnapshotSink<T>: Send + 'static {
    /// Replaces the current value with `value`.
    fn publish(&self, value: T);
}

impl<T: Send + Sync + 'static> SnapshotSink<T> for watch::Sender<T> {
    fn publish(&self, value: T) {
        // Succeeds with no receivers; the value stays readable via borrow().
        self.send_replace(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_sink_keeps_latest() {
        let (tx, rx) = watch::channel(0);
        tx.publish(1);
        tx.publish(2);
        assert_eq!(*rx.borrow(), 2);

        drop(rx);
        tx.publish(3);
        assert_eq!(*tx.borrow(), 3);
    }
}
