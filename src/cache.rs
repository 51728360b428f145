//! Per-run memoization scratch space.
//!
//! Programs write node outputs here while they run; the coordinator wipes it
//! once the run phase of every update is over.

use anyhow::Result;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SerializableData {
    pub value: Value,
}

/// Node outputs keyed by node id, then by output name
#[derive(Debug, Default, Clone)]
pub struct ExecutionCache {
    pub data: Arc<DashMap<String, DashMap<String, SerializableData>>>,
    clears: Arc<AtomicU64>,
}

impl ExecutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every memoized value
    pub fn clear(&self) {
        self.data.clear();
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    /// Guard that clears the cache once, on drop
    pub fn clear_on_drop(&self) -> ClearOnDrop<'_> {
        ClearOnDrop { cache: self }
    }

    /// How many times `clear` has been called on this cache or its clones
    pub fn clear_count(&self) -> u64 {
        self.clears.load(Ordering::Relaxed)
    }

    pub fn insert_value<T: Serialize>(&self, node_id: &str, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let map = self
            .data
            .entry(node_id.to_string())
            .or_insert_with(DashMap::new);
        map.insert(key.to_string(), SerializableData { value });
        Ok(())
    }

    pub fn get_value(&self, node_id: &str, key: &str) -> Option<Value> {
        self.data
            .get(node_id)
            .and_then(|map| map.get(key).map(|data| data.value.clone()))
    }

    pub fn len(&self) -> usize {
        self.data.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Clears the cache when dropped, however the owning scope is left
#[must_use = "the cache is cleared as soon as the guard is dropped"]
pub struct ClearOnDrop<'a> {
    cache: &'a ExecutionCache,
}

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_get_clear() {
        let cache = ExecutionCache::new();
        cache.insert_value("a", "output", &42).unwrap();
        cache.insert_value("b", "output", &"hello").unwrap();

        assert_eq!(cache.get_value("a", "output"), Some(json!(42)));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.clear_count(), 1);
        assert_eq!(cache.get_value("a", "output"), None);
    }

    #[test]
    fn test_guard_clears_on_unwind() {
        let cache = ExecutionCache::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _clear = cache.clear_on_drop();
            cache.insert_value("n", "output", &7).unwrap();
            panic!("node blew up");
        }));
        assert!(result.is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.clear_count(), 1);
    }

    #[test]
    fn test_clones_share_storage() {
        let cache = ExecutionCache::new();
        let other = cache.clone();
        other.insert_value("x", "output", &1).unwrap();
        assert_eq!(cache.get_value("x", "output"), Some(json!(1)));
    }
}
