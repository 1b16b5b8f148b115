//! # Pluggable message codec
//!
//! Encode/decode one [`Message`] to/from a transport frame. The default is
//! UTF-8 JSON; alternate codecs may be injected provided they are symmetric
//! over the wire value domain (null, booleans, finite numbers, strings,
//! arrays, string-keyed objects, handle-reference placeholders).

use crate::message::Message;

/// Errors produced while encoding or decoding a frame.
#[derive(Debug, Clone)]
pub enum CodecError {
    Encode(String),
    Decode(String),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(msg) => write!(f, "encode failed: {}", msg),
            Self::Decode(msg) => write!(f, "decode failed: {}", msg),
        }
    }
}

impl std::error::Error for CodecError {}

pub type Result<T> = std::result::Result<T, CodecError>;

/// A symmetric frame codec.
///
/// Object-safe (`Arc<dyn Codec>`) so endpoints can carry an injected codec
/// without generics spreading through the session types.
pub trait Codec: Send + Sync + 'static {
    fn encode(&self, message: &Message) -> Result<String>;
    fn decode(&self, frame: &str) -> Result<Message>;
}

/// The default codec: one JSON object per frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, message: &Message) -> Result<String> {
        serde_json::to_string(message).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, frame: &str) -> Result<Message> {
        serde_json::from_str(frame).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
