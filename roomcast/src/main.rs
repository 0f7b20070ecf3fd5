mod config;
mod http;
mod logging;
mod server;

use anyhow::Result;
use roomcast_sfu::SfuManager;
use tracing::info;

use server::RoomcastServer;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load and validate configuration
    let config = config::load_config()?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("Roomcast server starting...");
    info!("HTTP address: {}", config.http_address());
    info!("ICE servers: {}", config.sfu.ice_servers.join(", "));

    // 3. Initialize the SFU
    let manager = SfuManager::new(config.sfu.clone())
        .map_err(|e| anyhow::anyhow!("Failed to initialize SFU: {e}"))?;

    // 4. Serve until shutdown
    RoomcastServer::new(config, manager).run().await
}
