//! # Lazy remote handle
//!
//! A [`RemoteValue`] is a path under a remote handle. Extending the path is
//! synchronous and sends nothing; only [`fetch`](RemoteValue::fetch) and
//! [`invoke`](RemoteValue::invoke) put a frame on the wire. The same builder
//! serves the module root (handle 0) and any function handle obtained from a
//! reply.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use transporter_wire::PathSegment;

use crate::dispatch::Result;
use crate::handle::ROOT_HANDLE;
use crate::session::SessionInner;
use crate::value::Value;

/// A chainable handle on a value living in a peer's exported tree.
#[derive(Clone)]
pub struct RemoteValue {
    session: Arc<SessionInner>,
    scope: String,
    handle: u64,
    path: Vec<PathSegment>,
    timeout: Duration,
}

impl RemoteValue {
    pub(crate) fn root(session: Arc<SessionInner>, scope: String, timeout: Duration) -> Self {
        Self {
            session,
            scope,
            handle: ROOT_HANDLE,
            path: Vec::new(),
            timeout,
        }
    }

    /// Descends into a map field. No message is sent.
    pub fn key(&self, key: impl Into<String>) -> RemoteValue {
        self.extend(PathSegment::Key(key.into()))
    }

    /// Descends into a list element. No message is sent.
    pub fn at(&self, index: u32) -> RemoteValue {
        self.extend(PathSegment::Index(index))
    }

    /// Resolves the value at the current path with a `get` round trip.
    ///
    /// Functions in the reply come back as callable proxies; aggregates come
    /// back as plain aggregates of values and proxies.
    pub async fn fetch(&self) -> Result<Value> {
        self.session
            .remote_get(&self.scope, self.handle, self.path.clone(), self.timeout)
            .await
    }

    /// Invokes the function at the current path with an `apply` round trip.
    ///
    /// Arguments are marshalled on the way out; functions among them become
    /// handles the peer can call back.
    pub async fn invoke(&self, args: Vec<Value>) -> Result<Value> {
        self.session
            .remote_apply(
                &self.scope,
                self.handle,
                self.path.clone(),
                args,
                self.timeout,
            )
            .await
    }

    /// The namespace this handle is bound to.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// The accumulated path.
    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }

    fn extend(&self, segment: PathSegment) -> RemoteValue {
        let mut path = self.path.clone();
        path.push(segment);
        RemoteValue {
            session: Arc::clone(&self.session),
            scope: self.scope.clone(),
            handle: self.handle,
            path,
            timeout: self.timeout,
        }
    }
}

impl fmt::Debug for RemoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteValue({}:{}", self.scope, self.handle)?;
        for segment in &self.path {
            write!(f, ".{}", segment)?;
        }
        write!(f, ")")
    }
}
