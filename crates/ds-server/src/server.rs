//! Listener setup and graceful shutdown.

use ds_core::Config;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::ServerError;
use crate::routes::router;
use crate::state::AppState;

/// Binds `config.server.bind` and serves until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns [`ServerError::Io`] if the address cannot be bound or the
/// listener fails.
pub async fn serve(config: Config, shutdown: CancellationToken) -> Result<(), ServerError> {
    let listener = TcpListener::bind(config.server.bind).await?;
    serve_on(listener, config, shutdown).await
}

/// Serves on an already-bound `listener` until `shutdown` is cancelled.
///
/// Cancelling `shutdown` ends every open stream, which releases their
/// watchers, and then stops accepting connections.
///
/// # Errors
///
/// Returns [`ServerError::Io`] if the listener fails.
pub async fn serve_on(
    listener: TcpListener,
    config: Config,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let state = AppState::new(&config, shutdown.clone());
    let app = router(state.clone());

    tracing::info!(
        addr = %listener.local_addr()?,
        root = %state.root(),
        endpoint = state.endpoint(),
        trusted_dir = %state.policy().dir_prefix(),
        "Listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    tracing::info!(active_sources = state.hub().active_sources(), "Server stopped");
    Ok(())
}
