//! # Value domain
//!
//! The tree of values a module can export or pass through a call: null,
//! booleans, finite numbers, strings, lists, string-keyed maps, and
//! functions. Functions are first-class: a [`FnValue`] is either a native
//! async closure or a materialized proxy for a function living on the peer,
//! and both are called the same way.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::dispatch::CallError;

/// A boxed native async function: the form user closures are stored in.
pub type NativeFn =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// The common calling surface behind [`FnValue`].
///
/// Native closures and remote proxies both implement it; marshalling and
/// invocation never need to know which one they hold.
pub(crate) trait Callable: Send + Sync {
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, Result<Value, CallError>>;

    /// Peer-assigned handle id when this callable proxies a remote function.
    fn remote_handle(&self) -> Option<u64> {
        None
    }
}

/// A callable value. Cheap to clone; clones share identity.
#[derive(Clone)]
pub struct FnValue {
    callable: Arc<dyn Callable>,
}

impl FnValue {
    pub(crate) fn from_callable(callable: Arc<dyn Callable>) -> Self {
        Self { callable }
    }

    /// Invokes the function. For a remote proxy this issues an `apply` at the
    /// function's handle and resolves once the peer replies.
    pub async fn call(&self, args: Vec<Value>) -> Result<Value, CallError> {
        self.callable.call(args).await
    }

    /// The peer handle id for a materialized remote function, `None` for a
    /// native one. Two proxies for the same remote function share an id.
    pub fn remote_handle(&self) -> Option<u64> {
        self.callable.remote_handle()
    }

    /// Stable identity key: the callable allocation. The handle table uses it
    /// to hand out the same id when one function is marshalled twice.
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.callable) as *const () as usize
    }
}

impl PartialEq for FnValue {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl fmt::Debug for FnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.remote_handle() {
            Some(id) => write!(f, "FnValue(remote handle {})", id),
            None => write!(f, "FnValue(native)"),
        }
    }
}

struct NativeCallable(NativeFn);

impl Callable for NativeCallable {
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, Result<Value, CallError>> {
        let fut = (self.0)(args);
        Box::pin(async move { fut.await.map_err(|e| CallError::Remote(e.to_string())) })
    }
}

/// A value that can cross a transporter boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Function(FnValue),
}

impl Value {
    /// Wraps an async closure as a callable value.
    ///
    /// The closure receives the unmarshalled arguments; any function among
    /// them is already a callable proxy for the caller's function.
    pub fn function<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let native: NativeFn = Arc::new(move |args| Box::pin(f(args)));
        Value::Function(FnValue::from_callable(Arc::new(NativeCallable(native))))
    }

    /// Builds a map value from key/value pairs.
    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FnValue> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}
