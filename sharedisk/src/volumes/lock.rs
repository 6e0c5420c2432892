//! Keyed async locks.
//!
//! Operations touching the host mount table or a specific backing file must
//! be serialized per resource key while unrelated keys proceed in parallel.
//! The registry hands out one async mutex per key, created lazily. Keys are
//! never removed; the set of live volumes on a node is small and bounded.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Lazily-populated map from resource key to its serialization lock.
pub struct LockRegistry {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Lock for `key`, creating it on first use.
    ///
    /// The registry's own map lock is held only for the lookup, never across
    /// an await.
    pub fn get(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
