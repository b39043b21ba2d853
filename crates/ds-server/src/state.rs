//! Application state

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use ds_core::{Config, TrustPolicy};
use ds_watcher::SourceHub;
use tokio_util::sync::CancellationToken;

/// State shared by every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    policy: Arc<TrustPolicy>,
    root: Arc<Utf8PathBuf>,
    endpoint: Arc<str>,
    hub: SourceHub,
    shutdown: CancellationToken,
    next_connection: Arc<AtomicU64>,
}

impl AppState {
    /// Builds state from `config`. Cancelling `shutdown` ends every open stream.
    #[must_use]
    pub fn new(config: &Config, shutdown: CancellationToken) -> Self {
        Self {
            policy: Arc::new(config.trust.clone()),
            root: Arc::new(config.server.root.clone()),
            endpoint: Arc::from(config.server.endpoint.as_str()),
            hub: SourceHub::new(config.watch),
            shutdown,
            next_connection: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Rules every `data_source` must satisfy.
    #[must_use]
    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    /// Directory that `data_source` values are resolved against.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Path the stream endpoint is mounted at.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Registry of active source watchers.
    #[must_use]
    pub const fn hub(&self) -> &SourceHub {
        &self.hub
    }

    /// Token cancelled when the server shuts down.
    #[must_use]
    pub const fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Allocates an id for a new connection, used only in logs.
    pub(crate) fn next_connection_id(&self) -> u64 {
        self.next_connection.fetch_add(1, Ordering::Relaxed)
    }
}
