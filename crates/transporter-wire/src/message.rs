//! # Protocol messages
//!
//! Defines the envelope shared by every frame and the per-variant payloads.
//!
//! ## Invariants
//! - Every outbound frame carries `source == SOURCE_TAG`; receivers drop
//!   anything else without replying.
//! - `get`/`apply` address an explicit `handle`: 0 is the exported root of the
//!   scope, anything else names an entry in the owner's handle table.
//! - Unknown fields in inbound frames are skipped, never an error.

use serde::Deserialize;
use serde::Serialize;

/// Discriminator separating transporter frames from unrelated traffic on a
/// shared transport. Hygiene, not security: a hostile peer can forge it.
pub const SOURCE_TAG: &str = "transporter";

/// Values as they appear on the wire: JSON with [`handle_ref`] placeholders
/// standing in for functions.
pub type WireValue = serde_json::Value;

/// One step of a traversal through an exported value tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// List index.
    Index(u32),
    /// Map key.
    Key(String),
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(i) => write!(f, "[{}]", i),
            Self::Key(k) => write!(f, "{}", k),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<u32> for PathSegment {
    fn from(index: u32) -> Self {
        Self::Index(index)
    }
}

/// Failure classes that cross the wire in an `error` reply.
///
/// Timeouts, scope conflicts, and codec failures are local to one endpoint
/// and never serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// `get`/`apply` referenced an id absent from the owner's handle table.
    UnknownHandle,
    /// The path had nothing at a non-terminal segment, or `apply` targeted a
    /// value that is not callable.
    PathNotFound,
    /// The serving endpoint was released while the request was in flight.
    SessionClosed,
    /// The resolved function failed; the message is its rendering.
    Remote,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownHandle => write!(f, "unknown handle"),
            Self::PathNotFound => write!(f, "path not found"),
            Self::SessionClosed => write!(f, "session closed"),
            Self::Remote => write!(f, "remote error"),
        }
    }
}

/// Per-variant payload of a [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// Resolve the value at `path` under `handle` and reply with `set`.
    Get { handle: u64, path: Vec<PathSegment> },
    /// Invoke the function at `path` under `handle` with marshalled `args`.
    Apply {
        handle: u64,
        path: Vec<PathSegment>,
        args: Vec<WireValue>,
    },
    /// Reply carrying the marshalled result of a `get`, `apply`, or `ping`.
    Set { value: WireValue },
    /// Reply carrying a classified failure.
    Error { kind: ErrorKind, message: String },
    /// Unilateral notice that the sender no longer holds `handle`.
    GarbageCollect { handle: u64 },
    /// Liveness probe; answered with `set null`.
    Ping,
}

/// One frame on the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Correlation id, monotonic per endpoint, opaque to the peer. Replies
    /// echo the id of the request they answer.
    pub id: u64,
    /// Namespace partition; frames for uninstalled scopes are dropped.
    pub scope: String,
    /// Protocol discriminator, see [`SOURCE_TAG`].
    pub source: String,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Message {
    /// Builds a frame stamped with the protocol source tag.
    pub fn new(id: u64, scope: impl Into<String>, payload: Payload) -> Self {
        Self {
            id,
            scope: scope.into(),
            source: SOURCE_TAG.to_string(),
            payload,
        }
    }
}

/// Builds the placeholder object a marshalled function becomes on the wire.
pub fn handle_ref(id: u64) -> WireValue {
    serde_json::json!({ "__handle": id, "kind": "function" })
}

/// Recognizes a [`handle_ref`] placeholder, returning the handle id.
pub fn as_handle_ref(value: &WireValue) -> Option<u64> {
    let map = value.as_object()?;
    let id = map.get("__handle")?.as_u64()?;
    match map.get("kind")?.as_str()? {
        "function" => Some(id),
        _ => None,
    }
}
