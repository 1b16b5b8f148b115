//! # Remote registry
//!
//! Mirror of the peer's handle table: maps peer-assigned ids to local proxy
//! functions. Proxies are deduplicated per id while one is still alive;
//! when the last clone of a proxy is dropped, exactly one `garbage_collect`
//! notice for its handle is scheduled on the session outbox.
//!
//! Collection is best-effort: the drop observer holds only the handle id and
//! a weak session reference, never the proxy, so it can never resurrect a
//! value or release one spuriously.

use std::sync::Arc;
use std::sync::Weak;

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dispatch::CallError;
use crate::session::SessionInner;
use crate::value::Callable;
use crate::value::FnValue;
use crate::value::Value;

/// Tracks live proxies for peer handles.
pub(crate) struct RemoteRegistry {
    proxies: DashMap<u64, Weak<ProxyCallable>>,
}

impl RemoteRegistry {
    pub fn new() -> Self {
        Self {
            proxies: DashMap::new(),
        }
    }

    /// Returns a callable proxy for the peer handle `id`, reusing the live
    /// one if any local value still holds it.
    pub fn materialize(&self, session: Weak<SessionInner>, scope: &str, id: u64) -> FnValue {
        let live = self
            .proxies
            .get(&id)
            .and_then(|entry| entry.value().upgrade());
        if let Some(existing) = live {
            return FnValue::from_callable(existing);
        }

        let proxy = Arc::new(ProxyCallable {
            handle: id,
            scope: scope.to_string(),
            session,
        });
        self.proxies.insert(id, Arc::downgrade(&proxy));
        FnValue::from_callable(proxy)
    }

    /// Drops registry entries whose proxies are gone.
    pub fn prune(&self) {
        self.proxies.retain(|_, weak| weak.strong_count() > 0);
    }

    pub fn clear(&self) {
        self.proxies.clear();
    }
}

/// A local stand-in for a function owned by the peer. Invocation issues an
/// `apply` at the handle; dropping the last clone notifies the owner.
struct ProxyCallable {
    handle: u64,
    scope: String,
    session: Weak<SessionInner>,
}

impl Callable for ProxyCallable {
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, Result<Value, CallError>> {
        let session = self.session.clone();
        let scope = self.scope.clone();
        let handle = self.handle;
        Box::pin(async move {
            let Some(session) = session.upgrade() else {
                return Err(CallError::SessionClosed);
            };
            let timeout = session.default_timeout();
            session
                .remote_apply(&scope, handle, Vec::new(), args, timeout)
                .await
        })
    }

    fn remote_handle(&self) -> Option<u64> {
        Some(self.handle)
    }
}

impl Drop for ProxyCallable {
    fn drop(&mut self) {
        if let Some(session) = self.session.upgrade() {
            session.schedule_gc(&self.scope, self.handle);
        }
    }
}
