//! # Request dispatcher
//!
//! Correlates outgoing requests with incoming replies. Each request gets a
//! monotonic id and a pending slot; the session's pump resolves the slot when
//! a `set`/`error` frame with a matching id arrives, and the per-request
//! timeout rejects it if nothing does. Replies with unknown ids (late, after
//! a timeout already fired) are dropped silently.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;

use transporter_wire::CodecError;
use transporter_wire::ErrorKind;
use transporter_wire::WireValue;

use crate::transport;

/// Errors surfaced at the call site of a remote operation.
#[derive(Debug, Clone)]
pub enum CallError {
    /// No reply arrived within the configured deadline. Local only; the peer
    /// is never notified.
    Timeout,
    /// The session was released while the request was pending, or the
    /// operation was issued against a closed session.
    SessionClosed,
    /// The reply channel vanished without a verdict.
    ChannelClosed,
    /// The peer did not recognize the addressed handle.
    UnknownHandle(String),
    /// The path led nowhere, or `apply` targeted a non-function.
    PathNotFound(String),
    /// The remote function failed; carries its rendering.
    Remote(String),
    /// Encoding the outgoing frame failed.
    Codec(CodecError),
    /// The transport rejected the frame.
    Transport(transport::Error),
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timed out"),
            Self::SessionClosed => write!(f, "session closed"),
            Self::ChannelClosed => write!(f, "reply channel closed"),
            Self::UnknownHandle(msg) => write!(f, "unknown handle: {}", msg),
            Self::PathNotFound(msg) => write!(f, "path not found: {}", msg),
            Self::Remote(msg) => write!(f, "remote error: {}", msg),
            Self::Codec(e) => write!(f, "codec error: {}", e),
            Self::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

impl std::error::Error for CallError {}

impl From<CodecError> for CallError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

impl From<transport::Error> for CallError {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl CallError {
    /// Maps a wire `error` reply onto the local taxonomy.
    pub(crate) fn from_wire(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::UnknownHandle => Self::UnknownHandle(message),
            ErrorKind::PathNotFound => Self::PathNotFound(message),
            ErrorKind::SessionClosed => Self::SessionClosed,
            ErrorKind::Remote => Self::Remote(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, CallError>;

/// Pending-request table for one endpoint.
pub(crate) struct Dispatcher {
    pending: DashMap<u64, oneshot::Sender<Result<WireValue>>>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocates the next request id, in program order.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Installs the pending slot for `id`. Must happen before the frame is
    /// posted so a fast reply always finds its slot.
    pub fn register(&self, id: u64) -> oneshot::Receiver<Result<WireValue>> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        rx
    }

    /// Removes a slot whose frame never made it onto the transport.
    pub fn discard(&self, id: u64) {
        self.pending.remove(&id);
    }

    /// Awaits the reply for `id`, bounding the wait by `timeout`.
    ///
    /// The timeout bounds the round trip, not the remote computation: the
    /// serving side withholds its `set` until the resolved function's future
    /// settles, so a long-running call is still one reply.
    pub async fn wait(
        &self,
        id: u64,
        rx: oneshot::Receiver<Result<WireValue>>,
        timeout: Duration,
    ) -> Result<WireValue> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.pending.remove(&id);
                Err(CallError::ChannelClosed)
            }
            Err(_) => {
                self.pending.remove(&id);
                Err(CallError::Timeout)
            }
        }
    }

    /// Routes a reply to its pending slot. Unknown ids are dropped.
    pub fn resolve(&self, id: u64, result: Result<WireValue>) {
        match self.pending.remove(&id) {
            Some((_, tx)) => {
                let _ = tx.send(result);
            }
            None => tracing::trace!(id, "dropping reply with no pending request"),
        }
    }

    /// Rejects every pending request with `error`. Each slot is consumed, so
    /// a request is rejected at most once.
    pub fn reject_all(&self, error: CallError) {
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(error.clone()));
            }
        }
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
