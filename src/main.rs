//! Palace Game Server
//!
//! Binds the WebSocket server and runs until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use palace::{GameServer, ServerConfig, VERSION};

#[cfg(feature = "debug-tracing")]
const DEFAULT_FILTER: &str = "palace=debug,info";
#[cfg(not(feature = "debug-tracing"))]
const DEFAULT_FILTER: &str = "info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env();
    info!("Palace Server v{}", VERSION);
    info!(
        "Bot delay: {:?}, auto pickup: {:?}, reconnect grace: {:?}",
        config.engine.bot_think_delay, config.engine.auto_pickup_delay, config.engine.reconnect_grace
    );

    let server = Arc::new(GameServer::new(config.clone()));
    let running = server.clone();
    let handle = tokio::spawn(async move { running.run().await });

    tokio::select! {
        result = handle => {
            result
                .context("server task panicked")?
                .with_context(|| format!("server on {} failed", config.bind_addr))?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            server.shutdown();
        }
    }

    Ok(())
}
