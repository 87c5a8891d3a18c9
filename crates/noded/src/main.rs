//! Serves the sample nodes to a graph engine.
//!
//! Configure with `NODED_ADDR`, `NODED_INIT_TIMEOUT`, `NODED_EXEC_TIMEOUT` and
//! `RUST_LOG`.

mod nodes;

use std::sync::Arc;

use noderun::Registry;
use noderun::Server;
use noderun::ServerConfig;
use tracing_subscriber::EnvFilter;

const NAMESPACE: &str = "test";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;

    let mut registry = Registry::with_namespace(NAMESPACE);
    nodes::register_all(&mut registry)?;
    tracing::info!(namespace = NAMESPACE, nodes = registry.len(), "registered sample nodes");

    Server::new(Arc::new(registry), config).listen().await?;
    Ok(())
}
