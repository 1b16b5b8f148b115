//! # Marshaller
//!
//! The two walks between the value domain and the wire. Outbound, functions
//! are promoted into the handle table and replaced by handle references;
//! inbound, handle references become callable proxies via the remote
//! registry. Everything else keeps its shape. Functions are opaque across
//! the wire: the walk never descends into them.

use serde_json::Map as JsonMap;
use serde_json::Number;

use transporter_wire::as_handle_ref;
use transporter_wire::handle_ref;
use transporter_wire::CodecError;
use transporter_wire::WireValue;

use crate::dispatch::CallError;
use crate::dispatch::Result;
use crate::handle::HandleTable;
use crate::session::SessionInner;
use crate::value::Value;

/// Outbound walk, depth-first. Rejects non-finite numbers; the rest of the
/// domain always encodes.
pub(crate) fn marshal(table: &HandleTable, value: &Value) -> Result<WireValue> {
    match value {
        Value::Null => Ok(WireValue::Null),
        Value::Bool(b) => Ok(WireValue::Bool(*b)),
        Value::Number(n) => Number::from_f64(*n).map(WireValue::Number).ok_or_else(|| {
            CallError::Codec(CodecError::Encode(format!("non-finite number {}", n)))
        }),
        Value::String(s) => Ok(WireValue::String(s.clone())),
        Value::List(items) => {
            let mut encoded = Vec::with_capacity(items.len());
            for item in items {
                encoded.push(marshal(table, item)?);
            }
            Ok(WireValue::Array(encoded))
        }
        Value::Map(entries) => {
            let mut encoded = JsonMap::new();
            for (key, item) in entries {
                encoded.insert(key.clone(), marshal(table, item)?);
            }
            Ok(WireValue::Object(encoded))
        }
        Value::Function(f) => Ok(handle_ref(table.intern(f))),
    }
}

/// Inbound walk. Handle references become callable proxies bound to the
/// session and scope they arrived under; re-entrant, no table lock is held
/// across the recursion.
pub(crate) fn unmarshal(session: &SessionInner, scope: &str, value: &WireValue) -> Value {
    if let Some(id) = as_handle_ref(value) {
        return Value::Function(
            session
                .remotes
                .materialize(session.weak_self(), scope, id),
        );
    }

    match value {
        WireValue::Null => Value::Null,
        WireValue::Bool(b) => Value::Bool(*b),
        WireValue::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
        WireValue::String(s) => Value::String(s.clone()),
        WireValue::Array(items) => Value::List(
            items
                .iter()
                .map(|item| unmarshal(session, scope, item))
                .collect(),
        ),
        WireValue::Object(entries) => Value::Map(
            entries
                .iter()
                .map(|(key, item)| (key.clone(), unmarshal(session, scope, item)))
                .collect(),
        ),
    }
}
