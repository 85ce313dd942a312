//! Quotedesk Node Binary
//!
//! Runs the price service and its prewarmer until Ctrl+C.

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quotedesk_node::{NodeConfig, QuoteNode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config parse warnings predate the configured filter.
    let config = tracing::subscriber::with_default(
        tracing_subscriber::fmt().json().finish(),
        NodeConfig::from_env,
    );

    let filter = config.log_filter(std::env::var("RUST_LOG").ok());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(log_level = %config.log_level, "Starting Quotedesk node");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let node_id = config
        .node_id
        .clone()
        .unwrap_or_else(|| format!("quoted-{}", uuid::Uuid::new_v4()));
    info!(node_id = %node_id, providers = ?config.providers, "Node ID assigned");

    let node = QuoteNode::new(config, node_id)?;
    node.start()?;
    info!(node_id = %node.node_id(), "Node running");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    let metrics = node.stop().await?;
    info!(
        hit_ratio = metrics.hit_ratio(),
        flights_joined = metrics.flights_joined,
        "Node shutdown complete"
    );
    Ok(())
}
