//! Server lifecycle management
//!
//! Starts the HTTP/WebSocket server and coordinates graceful shutdown:
//! on SIGTERM or Ctrl+C, in-flight requests are drained and every relay
//! actor's background tasks are stopped.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use streamrelay_api::http::create_router;
use streamrelay_core::{Config, RelayRegistry};

/// StreamRelay server - owns the registry and the HTTP listener
pub struct RelayServer {
    config: Config,
    registry: Arc<RelayRegistry>,
}

impl RelayServer {
    pub const fn new(config: Config, registry: Arc<RelayRegistry>) -> Self {
        Self { config, registry }
    }

    /// Start the server and wait for a shutdown signal
    pub async fn start(self) -> anyhow::Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            error!("Failed to bind {addr}: {e}");
            anyhow::anyhow!("failed to bind {addr}: {e}")
        })?;
        info!("HTTP server listening on {addr}");

        let router = create_router(self.registry.clone());

        let http_handle = tokio::spawn(async move {
            let mut rx = shutdown_rx;
            let graceful = async move {
                let _ = rx.changed().await;
            };

            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(graceful)
                .await
            {
                error!("HTTP server error: {e}");
            }

            info!("HTTP server shut down gracefully");
        });

        tokio::select! {
            _ = http_handle => {
                error!("HTTP server stopped unexpectedly");
            }
            () = shutdown_signal() => {
                info!("Shutdown signal received, starting graceful shutdown...");
            }
        }

        let _ = shutdown_tx.send(true);
        self.shutdown().await;

        Ok(())
    }

    /// Stop every relay actor's polling and sweep tasks
    async fn shutdown(&self) {
        let streams = self.registry.len();
        if streams > 0 {
            info!("Stopping {streams} relay actor(s)...");
        }
        self.registry.shutdown_all();
        info!("StreamRelay server shut down complete");
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
