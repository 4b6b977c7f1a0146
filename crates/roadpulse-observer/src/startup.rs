//! Observer server startup helper for embedding in the engine.
//!
//! [`spawn_observer`] binds the listener on the caller's task, so a port
//! conflict is a startup failure, and then serves on a background Tokio
//! task.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{self, ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the Observer server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Bind `0.0.0.0:{port}` and serve the observer on a background task.
///
/// The task ends once `shutdown` resolves and in-flight requests have
/// drained; await the returned handle to wait for that.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the listener cannot bind.
pub async fn spawn_observer(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<()>, StartupError> {
    let config = ServerConfig {
        port,
        ..ServerConfig::default()
    };
    let listener = server::bind(&config).await?;

    let handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state, shutdown).await {
            tracing::error!(error = %e, "Observer server exited with error");
        }
    });

    tracing::info!(port, "Observer server spawned on background task");

    Ok(handle)
}
