use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lobby_sync::config::ServerConfig;
use lobby_sync::metrics::{self, Metrics};
use lobby_sync::net::session::SessionCoordinator;
use lobby_sync::net::transport::WebTransportServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("lobby-sync server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config.validate().map_err(|e| anyhow::anyhow!(e))?;
    info!(
        "Configuration loaded: {}:{}, max_lobbies={}, announce_lobby_list={}",
        config.bind_address, config.port, config.max_lobbies, config.announce_lobby_list
    );

    let metrics = Arc::new(Metrics::new());

    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let (events, coordinator) = SessionCoordinator::from_config(&config, metrics.clone()).spawn();

    let server = WebTransportServer::new(config.clone(), events, metrics.clone()).await?;

    info!("Server ready on https://{}", server.bind_addr());
    info!("Certificate hash: {}", server.cert_hash());
    info!(
        "Chrome flag: --ignore-certificate-errors-spki-list={}",
        server.cert_hash()
    );

    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    coordinator.abort();
    info!("Server stopped");

    Ok(())
}
