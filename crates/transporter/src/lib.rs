//! # Transporter
//!
//! A transparent remote-procedure system over bidirectional message
//! transports. One side exports a value tree as a module; peers obtain a lazy
//! handle that supports property descent, invocation, and nested function
//! handoff, with every function crossing the wire tracked for liveness so
//! neither side leaks.
//!
//! The moving parts, leaves first: the wire format lives in
//! `transporter-wire`; [`handle::HandleTable`] owns exported functions;
//! the remote registry mirrors the peer's table and reports dropped proxies;
//! [`dispatch`] correlates in-flight requests; the marshaller swaps functions
//! for handle references in both directions; [`proxy::RemoteValue`] is the
//! lazy path builder; [`session::Session`] supervises one transport side and
//! hosts both the server and client roles.

pub mod dispatch;
pub mod endpoint;
pub mod handle;
pub mod proxy;
pub mod session;
pub mod transport;
pub mod value;

mod marshal;
mod registry;

#[cfg(test)]
mod mock_transport;


pub use transporter_wire::Codec;
pub use transporter_wire::JsonCodec;

pub use crate::dispatch::CallError;
pub use crate::endpoint::ModuleHandle;
pub use crate::endpoint::ModuleOptions;
pub use crate::proxy::RemoteValue;
pub use crate::session::Session;
pub use crate::session::SessionConfig;
pub use crate::session::SessionState;
pub use crate::transport::Transport;
pub use crate::value::FnValue;
pub use crate::value::Value;
