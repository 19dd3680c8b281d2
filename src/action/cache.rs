//! Process-wide function cache
//!
//! Resolved entries are cached per `(namespace, function)` pair for the
//! lifetime of the host process. One instance is built at startup and shared
//! by `Arc` across concurrent trial runs. Writes only happen on a miss and
//! are idempotent: the first entry stored for a key is kept.

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

use super::ActionEntry;

/// Cache of resolved action entries.
///
/// # Example
///
/// ```rust
/// use chaos_trials::action::{ActionEntry, FunctionCache};
/// use serde_json::Value;
///
/// let cache = FunctionCache::new();
/// let entry = ActionEntry::function(|_args| Ok(Value::Null));
/// let stored = cache.get_or_insert("cm", "noop", entry.clone());
///
/// assert!(stored.ptr_eq(&entry));
/// assert!(cache.get("cm", "noop").is_some());
/// ```
#[derive(Debug, Default)]
pub struct FunctionCache {
    functions: DashMap<(String, String), ActionEntry, FxBuildHasher>,
}

impl FunctionCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached entry.
    #[must_use]
    pub fn get(&self, namespace: &str, function: &str) -> Option<ActionEntry> {
        self.functions
            .get(&(namespace.to_string(), function.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Store `entry` unless the key is already cached; returns the cached entry.
    pub fn get_or_insert(&self, namespace: &str, function: &str, entry: ActionEntry) -> ActionEntry {
        self.functions
            .entry((namespace.to_string(), function.to_string()))
            .or_insert(entry)
            .value()
            .clone()
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.functions.clear();
    }
}
