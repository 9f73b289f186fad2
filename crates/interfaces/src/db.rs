use cinder_primitives::{Bytes, B256};
use parking_lot::RwLock;
use std::collections::HashMap;

/// What to do with an existing store when opening it.
///
/// Ordered by severity so callers can combine a version-check verdict with an
/// explicit override via `max`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum WithExisting {
    /// The store matches the current schema and genesis; use it as-is.
    #[default]
    Trust,
    /// The store is usable but its contents should be re-verified against the
    /// current rules.
    Verify,
    /// The store is unusable and must be wiped.
    Kill,
}

/// A content-addressed byte store backing state snapshots.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait StateDatabase: Send + Sync {
    /// Looks up the value stored under `key`.
    fn get(&self, key: &B256) -> Option<Bytes>;

    /// Stores `value` under `key`.
    fn put(&self, key: B256, value: Bytes);

    /// Returns `true` if `key` is present.
    fn contains(&self, key: &B256) -> bool;

    /// Drops everything.
    fn clear(&self);
}

/// An in-memory [`StateDatabase`].
#[derive(Debug, Default)]
pub struct MemoryStateDb {
    entries: RwLock<HashMap<B256, Bytes>>,
}

impl MemoryStateDb {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl StateDatabase for MemoryStateDb {
    fn get(&self, key: &B256) -> Option<Bytes> {
        self.entries.read().get(key).cloned()
    }

    fn put(&self, key: B256, value: Bytes) {
        self.entries.write().insert(key, value);
    }

    fn contains(&self, key: &B256) -> bool {
        self.entries.read().contains_key(key)
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}
