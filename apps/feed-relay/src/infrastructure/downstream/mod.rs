//! Downstream WebSocket Server
//!
//! Accepts subscriber connections and bridges them to the client registry
//! and subscription service.
//!
//! # Endpoints
//!
//! - `GET /` and `GET /ws` - WebSocket upgrade
//!
//! Each connection gets a bounded outbound queue drained by its own writer
//! task. On disconnect every client id pointing at the connection is
//! unregistered.

mod connection;
mod handler;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{ClientRegistry, SubscriptionService};
use crate::domain::instrument::InstrumentDirectory;

pub use connection::WsConnection;

/// Shared state for downstream connections.
pub struct DownstreamState {
    registry: Arc<ClientRegistry>,
    subscriptions: Arc<SubscriptionService>,
    directory: Arc<InstrumentDirectory>,
    queue_capacity: usize,
    cancel: CancellationToken,
}

impl DownstreamState {
    /// Create downstream state.
    #[must_use]
    pub const fn new(
        registry: Arc<ClientRegistry>,
        subscriptions: Arc<SubscriptionService>,
        directory: Arc<InstrumentDirectory>,
        queue_capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            subscriptions,
            directory,
            queue_capacity,
            cancel,
        }
    }
}

/// Build the downstream router.
pub fn router(state: Arc<DownstreamState>) -> Router {
    Router::new()
        .route("/", get(handler::ws_handler))
        .route("/ws", get(handler::ws_handler))
        .with_state(state)
}

/// WebSocket server for downstream subscribers.
pub struct DownstreamServer {
    addr: SocketAddr,
    state: Arc<DownstreamState>,
    cancel: CancellationToken,
}

impl DownstreamServer {
    /// Create a server.
    #[must_use]
    pub const fn new(addr: SocketAddr, state: Arc<DownstreamState>, cancel: CancellationToken) -> Self {
        Self {
            addr,
            state,
            cancel,
        }
    }

    /// Bind and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `DownstreamServerError` if binding fails or the server stops
    /// with an error.
    pub async fn run(self) -> Result<(), DownstreamServerError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| DownstreamServerError::BindFailed(self.addr, e.to_string()))?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `DownstreamServerError::ServerFailed` if the server stops with an error.
    pub async fn serve(self, listener: TcpListener) -> Result<(), DownstreamServerError> {
        let local_addr = listener.local_addr().unwrap_or(self.addr);
        tracing::info!(addr = %local_addr, "Downstream WebSocket server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| DownstreamServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Downstream WebSocket server stopped");
        Ok(())
    }
}

/// Downstream server errors.
#[derive(Debug, thiserror::Error)]
pub enum DownstreamServerError {
    /// Failed to bind the listen address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
