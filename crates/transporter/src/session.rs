//! # Session supervisor
//!
//! One `Session` per transport side. It owns the pump task (transport to
//! router), the writer task (outbox to transport), the handle table, the
//! remote registry, and the dispatcher, and it hosts any number of exported
//! and consumed modules partitioned by namespace.
//!
//! ## Routing
//!
//! Frames that fail to decode, lack the protocol source tag, or name a scope
//! with no installed module are dropped without a reply. `set`/`error` go to
//! the dispatcher; `get`/`apply` are served in their own task; a
//! `garbage_collect` releases the named handle; a `ping` is answered with
//! `set null`.
//!
//! ## Lifecycle
//!
//! `Idle -> Running -> Closing -> Closed`. Only `Running` accepts requests.
//! `close` rejects every pending request with `SessionClosed` exactly once,
//! clears the handle table, and detaches both tasks; it is idempotent, and
//! dropping the session closes it.

use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::DashSet;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use transporter_wire::Codec;
use transporter_wire::ErrorKind;
use transporter_wire::JsonCodec;
use transporter_wire::Message;
use transporter_wire::PathSegment;
use transporter_wire::Payload;
use transporter_wire::WireValue;
use transporter_wire::SOURCE_TAG;

use crate::dispatch::CallError;
use crate::dispatch::Dispatcher;
use crate::endpoint;
use crate::endpoint::ModuleHandle;
use crate::endpoint::ModuleOptions;
use crate::endpoint::ServerAgent;
use crate::handle::HandleTable;
use crate::marshal;
use crate::proxy::RemoteValue;
use crate::registry::RemoteRegistry;
use crate::transport::Transport;
use crate::value::Value;

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_CLOSING: u8 = 2;
const STATE_CLOSED: u8 = 3;

/// Observable lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Closing,
    Closed,
}

/// Session-wide configuration.
pub struct SessionConfig {
    timeout: Duration,
    codec: Arc<dyn Codec>,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default per-request reply deadline. Individual modules can override
    /// it via [`ModuleOptions::timeout`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Injects an alternate frame codec.
    pub fn codec(mut self, codec: impl Codec) -> Self {
        self.codec = Arc::new(codec);
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(30_000),
            codec: Arc::new(JsonCodec),
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Shared endpoint state behind every proxy, module handle, and task.
pub(crate) struct SessionInner {
    /// Self-reference so proxies materialized deep in an unmarshal walk can
    /// hold a liveness link back to the session without keeping it alive.
    me: Weak<SessionInner>,
    codec: Arc<dyn Codec>,
    timeout: Duration,
    outbox: mpsc::UnboundedSender<String>,
    exports: DashMap<String, ServerAgent>,
    imports: DashSet<String>,
    pub(crate) handles: HandleTable,
    pub(crate) remotes: RemoteRegistry,
    pub(crate) dispatcher: Dispatcher,
    state: AtomicU8,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// One side of a transport, supervising modules exported to and consumed
/// from the peer.
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl Session {
    /// Binds a session over a single duplex transport.
    pub fn connect(transport: Arc<dyn Transport>) -> Self {
        Self::between(Arc::clone(&transport), transport)
    }

    /// Binds a session over a single duplex transport with configuration.
    pub fn connect_with(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        Self::between_with(Arc::clone(&transport), transport, config)
    }

    /// Binds a session over a split pair: replies and requests arrive on
    /// `from`, outgoing frames leave on `to`. The halves may coincide.
    pub fn between(from: Arc<dyn Transport>, to: Arc<dyn Transport>) -> Self {
        Self::between_with(from, to, SessionConfig::default())
    }

    pub fn between_with(
        from: Arc<dyn Transport>,
        to: Arc<dyn Transport>,
        config: SessionConfig,
    ) -> Self {
        let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<String>();

        let inner = Arc::new_cyclic(|me| SessionInner {
            me: me.clone(),
            codec: config.codec,
            timeout: config.timeout,
            outbox,
            exports: DashMap::new(),
            imports: DashSet::new(),
            handles: HandleTable::new(),
            remotes: RemoteRegistry::new(),
            dispatcher: Dispatcher::new(),
            state: AtomicU8::new(STATE_IDLE),
            tasks: Mutex::new(Vec::new()),
        });

        inner.state.store(STATE_RUNNING, Ordering::SeqCst);

        let writer = tokio::spawn(async move {
            while let Some(frame) = outbox_rx.recv().await {
                if let Err(error) = to.post(&frame).await {
                    tracing::warn!(%error, "transport rejected outgoing frame");
                    break;
                }
            }
        });

        let pump_inner = Arc::clone(&inner);
        let pump = tokio::spawn(async move {
            loop {
                match from.recv().await {
                    Ok(Some(frame)) => pump_inner.route(frame).await,
                    Ok(None) => {
                        tracing::debug!("transport closed by peer");
                        break;
                    }
                    Err(error) => {
                        tracing::warn!(%error, "transport error in pump");
                        break;
                    }
                }
            }
        });

        {
            let mut tasks = inner.tasks.lock().expect("session task registry poisoned");
            tasks.push(writer);
            tasks.push(pump);
        }

        Session { inner }
    }

    /// Exports `export` as a module under `namespace` (server role).
    ///
    /// Exactly one module may be exported per (session, namespace) pair; a
    /// second binding fails with [`endpoint::Error::ScopeConflict`].
    pub fn create_module(
        &self,
        namespace: &str,
        export: Value,
    ) -> endpoint::Result<ModuleHandle> {
        if self.state() != SessionState::Running {
            return Err(endpoint::Error::SessionClosed);
        }
        match self.inner.exports.entry(namespace.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(endpoint::Error::ScopeConflict(namespace.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(ServerAgent::new(export));
                Ok(ModuleHandle::new(
                    Arc::downgrade(&self.inner),
                    namespace.to_string(),
                ))
            }
        }
    }

    /// Returns the root proxy for the peer's module under `namespace`
    /// (client role).
    pub fn use_module(&self, namespace: &str) -> RemoteValue {
        self.use_module_with(namespace, ModuleOptions::new())
    }

    pub fn use_module_with(&self, namespace: &str, options: ModuleOptions) -> RemoteValue {
        self.inner.imports.insert(namespace.to_string());
        RemoteValue::root(
            Arc::clone(&self.inner),
            namespace.to_string(),
            options.timeout_or(self.inner.timeout),
        )
    }

    /// One liveness round trip against the peer's module at `namespace`.
    pub async fn ping(&self, namespace: &str) -> Result<(), CallError> {
        self.inner.ensure_running()?;
        self.inner.imports.insert(namespace.to_string());
        let id = self.inner.dispatcher.next_id();
        let rx = self.inner.dispatcher.register(id);
        let message = Message::new(id, namespace, Payload::Ping);
        if let Err(e) = self.inner.post(&message) {
            self.inner.dispatcher.discard(id);
            return Err(e);
        }
        self.inner
            .dispatcher
            .wait(id, rx, self.inner.timeout)
            .await
            .map(|_| ())
    }

    pub fn state(&self) -> SessionState {
        self.inner.observe_state()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Tears the session down: pending requests are rejected with
    /// `SessionClosed` exactly once, the handle table is cleared, and both
    /// transport tasks are detached. Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl SessionInner {
    pub(crate) fn default_timeout(&self) -> Duration {
        self.timeout
    }

    /// Weak self-reference handed to materialized proxies.
    pub(crate) fn weak_self(&self) -> Weak<SessionInner> {
        self.me.clone()
    }

    pub(crate) fn export_root(&self, scope: &str) -> Option<Value> {
        self.exports.get(scope).map(|agent| agent.root())
    }

    pub(crate) fn unbind_export(&self, scope: &str) {
        self.exports.remove(scope);
    }

    fn observe_state(&self) -> SessionState {
        match self.state.load(Ordering::SeqCst) {
            STATE_IDLE => SessionState::Idle,
            STATE_RUNNING => SessionState::Running,
            STATE_CLOSING => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }

    fn ensure_running(&self) -> Result<(), CallError> {
        match self.state.load(Ordering::SeqCst) {
            STATE_RUNNING => Ok(()),
            _ => Err(CallError::SessionClosed),
        }
    }

    /// Routes one inbound frame. Anything that is not addressed to this
    /// endpoint is dropped without producing outbound traffic.
    async fn route(&self, frame: String) {
        let message = match self.codec.decode(&frame) {
            Ok(message) => message,
            Err(error) => {
                tracing::trace!(%error, "dropping undecodable frame");
                return;
            }
        };

        if message.source != SOURCE_TAG {
            tracing::trace!(source = %message.source, "dropping frame with foreign source");
            return;
        }

        let Message {
            id,
            scope,
            source,
            payload,
        } = message;

        if !self.exports.contains_key(&scope) && !self.imports.contains(&scope) {
            tracing::trace!(%scope, "dropping frame for uninstalled scope");
            return;
        }

        match self.state.load(Ordering::SeqCst) {
            STATE_RUNNING => {}
            // Closing still drains replies for in-flight work; new requests
            // are dropped.
            STATE_CLOSING => {
                if !matches!(payload, Payload::Set { .. } | Payload::Error { .. }) {
                    return;
                }
            }
            _ => return,
        }

        match payload {
            Payload::Set { value } => {
                self.dispatcher.resolve(id, Ok(value));
            }
            Payload::Error { kind, message } => {
                self.dispatcher
                    .resolve(id, Err(CallError::from_wire(kind, message)));
            }
            payload @ (Payload::Get { .. } | Payload::Apply { .. }) => {
                let request = Message {
                    id,
                    scope,
                    source,
                    payload,
                };
                if let Some(session) = self.me.upgrade() {
                    tokio::spawn(endpoint::handle_request(session, request));
                }
            }
            Payload::GarbageCollect { handle } => {
                tracing::trace!(handle, "peer collected handle");
                self.handles.collect(handle);
            }
            Payload::Ping => {
                self.send_reply(&scope, id, WireValue::Null);
            }
        }
    }

    /// Issues a `get` and unmarshals the reply.
    pub(crate) async fn remote_get(
        &self,
        scope: &str,
        handle: u64,
        path: Vec<PathSegment>,
        timeout: Duration,
    ) -> Result<Value, CallError> {
        self.ensure_running()?;
        let id = self.dispatcher.next_id();
        let rx = self.dispatcher.register(id);
        let message = Message::new(id, scope, Payload::Get { handle, path });
        if let Err(e) = self.post(&message) {
            self.dispatcher.discard(id);
            return Err(e);
        }
        let value = self.dispatcher.wait(id, rx, timeout).await?;
        Ok(marshal::unmarshal(self, scope, &value))
    }

    /// Marshals `args`, issues an `apply`, and unmarshals the reply.
    pub(crate) async fn remote_apply(
        &self,
        scope: &str,
        handle: u64,
        path: Vec<PathSegment>,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value, CallError> {
        self.ensure_running()?;

        let mut wire_args = Vec::with_capacity(args.len());
        for arg in &args {
            wire_args.push(marshal::marshal(&self.handles, arg)?);
        }

        let id = self.dispatcher.next_id();
        let rx = self.dispatcher.register(id);
        let message = Message::new(
            id,
            scope,
            Payload::Apply {
                handle,
                path,
                args: wire_args,
            },
        );
        if let Err(e) = self.post(&message) {
            self.dispatcher.discard(id);
            return Err(e);
        }
        let value = self.dispatcher.wait(id, rx, timeout).await?;
        Ok(marshal::unmarshal(self, scope, &value))
    }

    /// Encodes and queues one frame, rejecting the initiating call on codec
    /// failure.
    fn post(&self, message: &Message) -> Result<(), CallError> {
        let frame = self.codec.encode(message)?;
        self.outbox
            .send(frame)
            .map_err(|_| CallError::SessionClosed)
    }

    /// Fire-and-forget `set` reply.
    pub(crate) fn send_reply(&self, scope: &str, id: u64, value: WireValue) {
        let message = Message::new(id, scope, Payload::Set { value });
        if let Err(error) = self.post(&message) {
            tracing::debug!(%error, id, "failed to send reply");
        }
    }

    /// Fire-and-forget `error` reply.
    pub(crate) fn send_error(&self, scope: &str, id: u64, kind: ErrorKind, text: String) {
        let message = Message::new(id, scope, Payload::Error { kind, message: text });
        if let Err(error) = self.post(&message) {
            tracing::debug!(%error, id, "failed to send error reply");
        }
    }

    /// Queues a `garbage_collect` for a dropped proxy. Best-effort: failures
    /// are logged, never surfaced.
    pub(crate) fn schedule_gc(&self, scope: &str, handle: u64) {
        if self.state.load(Ordering::SeqCst) != STATE_RUNNING {
            return;
        }
        let id = self.dispatcher.next_id();
        let message = Message::new(id, scope, Payload::GarbageCollect { handle });
        if let Err(error) = self.post(&message) {
            tracing::trace!(%error, handle, "failed to queue garbage_collect");
        }
        self.remotes.prune();
    }

    pub(crate) fn close(&self) {
        if self
            .state
            .compare_exchange(
                STATE_RUNNING,
                STATE_CLOSING,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            // Already closing, closed, or never ran.
            self.state.store(STATE_CLOSED, Ordering::SeqCst);
            return;
        }

        tracing::debug!("closing session");
        self.dispatcher.reject_all(CallError::SessionClosed);
        self.handles.clear();
        self.remotes.clear();
        self.exports.clear();
        self.imports.clear();

        let tasks: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().expect("session task registry poisoned");
            tasks.drain(..).collect()
        };
        for task in tasks {
            task.abort();
        }

        self.state.store(STATE_CLOSED, Ordering::SeqCst);
    }
}
