//! # Message-based transport trait
//!
//! A minimal, async interface for moving string frames between endpoints.
//! The transport knows nothing about messages, scopes, or handles; it moves
//! opaque frames. Request-response, callbacks, and liveness notices are all
//! built on top by the session.
//!
//! The transport MUST be reliable, in-order, and duplex. Concrete
//! implementations (worker ports, iframe bridges, socket adapters) live
//! outside this crate.

use std::fmt;

/// Errors that occur at the transport layer.
#[derive(Debug, Clone)]
pub enum Error {
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "connection lost: {}", msg),
            Self::Io(msg) => write!(f, "i/o error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A mechanism for asynchronous frame passing between endpoints.
///
/// Object-safe (`Arc<dyn Transport>`). A session may be built over one
/// duplex transport or over a distinct receive/send pair.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Queues one frame for transmission.
    ///
    /// Returns immediately after queuing; `Err` only on permanent failures.
    async fn post(&self, frame: &str) -> Result<()>;

    /// Awaits the next complete frame from the peer.
    ///
    /// # Returns
    /// - `Ok(Some(frame))` - a complete frame was received
    /// - `Ok(None)` - the stream is closed (EOF)
    /// - `Err(_)` - a transport error occurred
    ///
    /// # Invariants
    /// - Frames are returned in order and complete (no partial reads)
    async fn recv(&self) -> Result<Option<String>>;
}
