//! # Transporter wire format
//!
//! The message envelope and codec for the transporter protocol.
//!
//! ## Architecture
//!
//! Every frame on a transport is one [`Message`]: a tagged record carrying a
//! correlation `id`, a `scope` (namespace partition), and the `source`
//! discriminator that separates transporter traffic from unrelated listeners
//! on a shared transport. Values travel as JSON with functions replaced by
//! handle-reference placeholders; the runtime crate owns the rich value
//! domain and the marshalling walks.

mod codec;
mod message;

#[cfg(test)]
mod tests;

pub use codec::Codec;
pub use codec::CodecError;
pub use codec::JsonCodec;
pub use codec::Result;

pub use message::as_handle_ref;
pub use message::handle_ref;
pub use message::ErrorKind;
pub use message::Message;
pub use message::PathSegment;
pub use message::Payload;
pub use message::WireValue;
pub use message::SOURCE_TAG;
