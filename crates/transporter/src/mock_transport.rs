//! Mock transports for testing.
//!
//! These are used internally by the test suite and are not part of the
//! public API.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use crate::transport;
use crate::transport::Transport;

/// A duplex channel transport using tokio mpsc channels.
///
/// Frames posted on one half appear on the peer half's recv() and vice
/// versa: reliable, in-order, duplex, exactly what the session expects.
pub struct DuplexChannelTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl DuplexChannelTransport {
    /// Creates a pair of transports connected to each other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Self {
            tx: tx_a,
            rx: Arc::new(Mutex::new(rx_b)),
        };

        let b = Self {
            tx: tx_b,
            rx: Arc::new(Mutex::new(rx_a)),
        };

        (a, b)
    }
}

#[async_trait::async_trait]
impl Transport for DuplexChannelTransport {
    async fn post(&self, frame: &str) -> transport::Result<()> {
        self.tx
            .send(frame.to_string())
            .map_err(|_| transport::Error::ConnectionLost("channel closed".into()))
    }

    async fn recv(&self) -> transport::Result<Option<String>> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await)
    }
}

/// A transport that swallows every frame and never delivers one.
pub struct SilentTransport;

#[async_trait::async_trait]
impl Transport for SilentTransport {
    async fn post(&self, _frame: &str) -> transport::Result<()> {
        Ok(())
    }

    async fn recv(&self) -> transport::Result<Option<String>> {
        std::future::pending().await
    }
}
