//! # Handle table
//!
//! Per-endpoint registry of functions exposed to the peer. Marshalling a
//! function allocates (or reuses) an id here; the peer's `garbage_collect`
//! notices remove entries when the last proxy on the other side is dropped.
//!
//! ## Invariants
//! - Ids are monotonic from 1 and never reused within a session.
//! - The exported root lives outside the table at the well-known id 0 and is
//!   never collected.
//! - Marshalling the same function twice reuses the same id.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;

use crate::value::FnValue;
use crate::value::Value;

/// The well-known id of the exported root of a scope.
pub const ROOT_HANDLE: u64 = 0;

#[derive(Debug, Clone)]
pub enum Error {
    UnknownHandle(u64),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownHandle(id) => write!(f, "unknown handle {}", id),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

struct Entry {
    target: Value,
    refs: u64,
    identity: Option<usize>,
}

/// Registry mapping local ids to live exported functions, with refcounts.
pub struct HandleTable {
    entries: DashMap<u64, Entry>,
    identity: DashMap<usize, u64>,
    next_id: AtomicU64,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            identity: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Assigns a fresh id to `target` with one reference.
    pub fn allocate(&self, target: Value) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            id,
            Entry {
                target,
                refs: 1,
                identity: None,
            },
        );
        id
    }

    /// Registers a function, reusing the existing id when the same callable
    /// was marshalled before (so the peer can deduplicate by id).
    pub fn intern(&self, function: &FnValue) -> u64 {
        let key = function.identity();
        if let Some(id) = self.identity.get(&key).map(|entry| *entry.value()) {
            if self.retain(id).is_ok() {
                return id;
            }
            // The entry was collected in the meantime; fall through to a
            // fresh id, which is what never-reuse requires anyway.
            self.identity.remove(&key);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            id,
            Entry {
                target: Value::Function(function.clone()),
                refs: 1,
                identity: Some(key),
            },
        );
        self.identity.insert(key, id);
        id
    }

    /// Adds one reference to an existing entry.
    pub fn retain(&self, id: u64) -> Result<()> {
        match self.entries.get_mut(&id) {
            Some(mut entry) => {
                entry.refs += 1;
                Ok(())
            }
            None => Err(Error::UnknownHandle(id)),
        }
    }

    /// Drops one reference; the entry is removed when none remain. Unknown
    /// ids are a no-op (never negative).
    pub fn release(&self, id: u64) {
        let emptied = match self.entries.get_mut(&id) {
            Some(mut entry) => {
                entry.refs = entry.refs.saturating_sub(1);
                entry.refs == 0
            }
            None => false,
        };
        if emptied {
            self.remove(id);
        }
    }

    /// Handles a peer `garbage_collect`: the peer dropped its one proxy for
    /// `id`, so the entry goes away outright. Idempotent.
    pub fn collect(&self, id: u64) {
        self.remove(id);
    }

    /// Returns the value bound to `id`.
    pub fn resolve(&self, id: u64) -> Result<Value> {
        self.entries
            .get(&id)
            .map(|entry| entry.target.clone())
            .ok_or(Error::UnknownHandle(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry; used on session teardown.
    pub fn clear(&self) {
        self.entries.clear();
        self.identity.clear();
    }

    fn remove(&self, id: u64) {
        if let Some((_, entry)) = self.entries.remove(&id) {
            if let Some(key) = entry.identity {
                self.identity.remove(&key);
            }
        }
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
