//! REST API implementation
//!
//! Health and readiness probes, the OneView webhook, manual poll and
//! connectivity checks, and the Prometheus endpoint.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;

use tokio::net::TcpListener;
use tracing::info;

use crate::error::{Error, Result};

/// HTTP API server
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Serve until the shared shutdown token fires, then drain in-flight requests
    pub async fn serve(self, addr: &str) -> Result<()> {
        let shutdown = self.state.shutdown.clone();
        let app = create_router(self.state);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Internal(format!("failed to bind {addr}: {e}")))?;

        info!("HTTP server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
