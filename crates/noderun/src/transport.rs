//! # Transport Abstraction
//!
//! A minimal, async interface for moving frames between the engine and a host.
//!
//! ## Philosophy
//!
//! - **Frame-Oriented**: The Transport knows nothing about commands or node specs.
//!   It moves opaque, already-delimited buffers.
//! - **Duplex**: Either side may send at any time. The host sends more frames
//!   than it receives (debug messages precede replies).

use std::fmt;

/// Errors that occur at the network/transport layer.
#[derive(Debug, Clone)]
pub enum Error {
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// The peer sent something that is not a data frame.
    Protocol(String),
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Protocol(msg) => write!(f, "Transport protocol error: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A bidirectional frame channel.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends one frame.
    ///
    /// # invariants
    /// - Frames sent from one task arrive in the order they were sent.
    /// - Should not interpret the payload content.
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Receives the next frame, or `None` once the peer closed the stream.
    async fn recv(&self) -> Result<Option<Vec<u8>>>;
}
