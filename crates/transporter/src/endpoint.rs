//! # Endpoint roles
//!
//! The server role binds one exported value tree per namespace and answers
//! `get`/`apply` frames against it; the client role hands out root proxies.
//! Both live on the same session: an endpoint that exports a module and an
//! endpoint that merely calls one are the same machinery, which is what lets
//! callbacks flow in either direction.

use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use transporter_wire::ErrorKind;
use transporter_wire::Message;
use transporter_wire::PathSegment;
use transporter_wire::Payload;
use transporter_wire::WireValue;

use crate::handle::ROOT_HANDLE;
use crate::marshal;
use crate::session::SessionInner;
use crate::value::Value;

/// Errors raised while binding or unbinding modules.
#[derive(Debug, Clone)]
pub enum Error {
    /// A module is already exported under this namespace on this session.
    ScopeConflict(String),
    /// The session no longer accepts bindings.
    SessionClosed,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScopeConflict(scope) => {
                write!(f, "module already exported under scope {}", scope)
            }
            Self::SessionClosed => write!(f, "session closed"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Per-module client options.
#[derive(Debug, Clone, Default)]
pub struct ModuleOptions {
    timeout: Option<Duration>,
}

impl ModuleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-request reply deadline for proxies of this module, overriding the
    /// session default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout.unwrap_or(default)
    }
}

/// Detaches an exported module when released. Releasing twice is a no-op;
/// frames for the namespace are silently dropped afterwards.
pub struct ModuleHandle {
    session: Weak<SessionInner>,
    scope: String,
}

impl ModuleHandle {
    pub(crate) fn new(session: Weak<SessionInner>, scope: String) -> Self {
        Self { session, scope }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn release(&self) {
        if let Some(session) = self.session.upgrade() {
            session.unbind_export(&self.scope);
        }
    }
}

/// One exported module: the root of the tree reachable at handle 0.
pub(crate) struct ServerAgent {
    root: Value,
}

impl ServerAgent {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub fn root(&self) -> Value {
        self.root.clone()
    }
}

type ServeResult = std::result::Result<WireValue, (ErrorKind, String)>;

/// Serves one inbound `get`/`apply`. Runs in its own task so a slow exported
/// function never blocks the pump, and a callback arriving mid-call can be
/// served concurrently.
pub(crate) async fn handle_request(session: Arc<SessionInner>, message: Message) {
    let Message {
        id, scope, payload, ..
    } = message;

    let outcome = match payload {
        Payload::Get { handle, path } => serve_get(&session, &scope, handle, &path),
        Payload::Apply { handle, path, args } => {
            serve_apply(&session, &scope, handle, &path, args).await
        }
        _ => return,
    };

    match outcome {
        Ok(value) => session.send_reply(&scope, id, value),
        Err((kind, text)) => session.send_error(&scope, id, kind, text),
    }
}

fn serve_get(
    session: &Arc<SessionInner>,
    scope: &str,
    handle: u64,
    path: &[PathSegment],
) -> ServeResult {
    let root = addressed_target(session, scope, handle)?;
    let value = resolve_path(&root, path)?;
    marshal::marshal(&session.handles, &value)
        .map_err(|e| (ErrorKind::Remote, e.to_string()))
}

async fn serve_apply(
    session: &Arc<SessionInner>,
    scope: &str,
    handle: u64,
    path: &[PathSegment],
    args: Vec<WireValue>,
) -> ServeResult {
    let root = addressed_target(session, scope, handle)?;
    let target = resolve_path(&root, path)?;

    let Value::Function(function) = target else {
        return Err((
            ErrorKind::PathNotFound,
            format!("value at {} is not callable", render_path(path)),
        ));
    };

    let args: Vec<Value> = args
        .iter()
        .map(|arg| marshal::unmarshal(session, scope, arg))
        .collect();

    match function.call(args).await {
        Ok(value) => marshal::marshal(&session.handles, &value)
            .map_err(|e| (ErrorKind::Remote, e.to_string())),
        Err(e) => Err((ErrorKind::Remote, e.to_string())),
    }
}

/// Resolves the addressed root: handle 0 is the scope's exported tree, any
/// other id names a function the peer observed earlier.
fn addressed_target(
    session: &Arc<SessionInner>,
    scope: &str,
    handle: u64,
) -> std::result::Result<Value, (ErrorKind, String)> {
    if handle == ROOT_HANDLE {
        session.export_root(scope).ok_or_else(|| {
            (
                ErrorKind::UnknownHandle,
                format!("no module exported under scope {}", scope),
            )
        })
    } else {
        session.handles.resolve(handle).map_err(|_| {
            (
                ErrorKind::UnknownHandle,
                format!("unknown handle {}", handle),
            )
        })
    }
}

/// Ordered descent through the exported tree. A missing value at a
/// non-terminal segment is an error; a missing terminal resolves to null,
/// matching absent-property semantics.
fn resolve_path(
    root: &Value,
    path: &[PathSegment],
) -> std::result::Result<Value, (ErrorKind, String)> {
    let mut current = root;
    for (depth, segment) in path.iter().enumerate() {
        match lookup(current, segment) {
            Some(next) => current = next,
            None if depth + 1 == path.len() => return Ok(Value::Null),
            None => {
                return Err((
                    ErrorKind::PathNotFound,
                    format!("nothing at {}", render_path(&path[..=depth])),
                ))
            }
        }
    }
    Ok(current.clone())
}

fn lookup<'a>(value: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    match (value, segment) {
        (Value::Map(entries), PathSegment::Key(key)) => entries.get(key),
        (Value::List(items), PathSegment::Index(index)) => items.get(*index as usize),
        _ => None,
    }
}

fn render_path(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return "<root>".to_string();
    }
    path.iter()
        .map(|segment| segment.to_string())
        .collect::<Vec<_>>()
        .join(".")
}
