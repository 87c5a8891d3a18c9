//! # Server
//!
//! Accepts WebSocket connections and gives each its own [`Session`] on its
//! own task. Connections share the registry and nothing else.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::net::TcpStream;

use crate::config::ServerConfig;
use crate::registry::Registry;
use crate::session::Session;
use crate::ws::WsTransport;

/// Pause after a failed `accept` before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub enum Error {
    Bind { addr: String, source: std::io::Error },
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bind { addr, source } => write!(f, "Cannot listen on {}: {}", addr, source),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bind { source, .. } => Some(source),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct Server {
    registry: Arc<Registry>,
    config: ServerConfig,
}

impl Server {
    pub fn new(registry: Arc<Registry>, config: ServerConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the configured address and serves until the process ends.
    pub async fn listen(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.addr)
            .await
            .map_err(|source| Error::Bind {
                addr: self.config.addr.clone(),
                source,
            })?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        tracing::info!(
            addr = %listener.local_addr()?,
            nodes = self.registry.len(),
            "serving nodes"
        );

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            };

            let registry = Arc::clone(&self.registry);
            let options = self.config.discovery_options();
            tokio::spawn(async move {
                tracing::info!(%peer, "connection opened");
                match serve_connection(stream, Session::new(registry, options)).await {
                    Ok(()) => tracing::info!(%peer, "connection closed"),
                    Err(e) => tracing::warn!(%peer, error = %e, "connection failed"),
                }
            });
        }
    }
}

async fn serve_connection(stream: TcpStream, session: Session) -> anyhow::Result<()> {
    let socket = tokio_tungstenite::accept_async(stream).await?;
    let transport = WsTransport::new(socket);
    session.run(&transport).await?;
    Ok(())
}
