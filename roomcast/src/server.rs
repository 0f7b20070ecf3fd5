use std::sync::Arc;

use roomcast_sfu::SfuManager;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Config;
use crate::http::{self, AppState};

/// HTTP front end plus the SFU background tasks.
pub struct RoomcastServer {
    config: Config,
    manager: Arc<SfuManager>,
}

impl RoomcastServer {
    #[must_use]
    pub const fn new(config: Config, manager: Arc<SfuManager>) -> Self {
        Self { config, manager }
    }

    /// Serve until SIGINT/SIGTERM, then stop background work.
    pub async fn run(self) -> anyhow::Result<()> {
        let dispatcher = self.manager.start();
        info!(
            interval_secs = self.config.sfu.key_frame_interval_secs,
            "Key frame dispatcher started"
        );

        let result = self.serve_http().await;

        dispatcher.abort();
        self.shutdown();
        result
    }

    async fn serve_http(&self) -> anyhow::Result<()> {
        let http_address = self.config.http_address();
        let listener = TcpListener::bind(&http_address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind HTTP address {http_address}: {e}"))?;
        info!("HTTP server listening on {}", http_address);

        let router = http::create_router(AppState {
            manager: Arc::clone(&self.manager),
            server: Arc::new(self.config.server.clone()),
        });

        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
        {
            error!("HTTP server error: {}", e);
            return Err(e.into());
        }

        info!("HTTP server shut down gracefully");
        Ok(())
    }

    fn shutdown(&self) {
        let rooms = self.manager.registry().room_count();
        info!("Roomcast server shut down complete ({} room(s) dropped)", rooms);
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
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
