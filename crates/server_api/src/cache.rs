use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

/// Variants kept per path before the oldest is evicted.
pub const DEFAULT_ENTRIES_PER_PATH: usize = 256;

#[derive(Default)]
struct PathEntries {
    generation: u64,
    entries: HashMap<String, Value>,
    // insertion order, oldest first
    order: VecDeque<String>,
}

/// Cached route payloads keyed by route path, then by the query variant
/// (search string, page) that produced them. Each path holds at most
/// `max_entries` variants.
#[derive(Clone)]
pub struct PathCache {
    inner: Arc<RwLock<HashMap<String, PathEntries>>>,
    max_entries: usize,
}

impl Default for PathCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ENTRIES_PER_PATH)
    }
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            inner: Arc::default(),
            max_entries: max_entries.max(1),
        }
    }

    pub async fn get(&self, path: &str, key: &str) -> Option<Value> {
        let inner = self.inner.read().await;
        inner.get(path)?.entries.get(key).cloned()
    }

    /// Generation token to pass back to [`PathCache::insert`]. Bumped by every
    /// revalidation of `path`.
    pub async fn generation(&self, path: &str) -> u64 {
        let inner = self.inner.read().await;
        inner.get(path).map(|entry| entry.generation).unwrap_or(0)
    }

    /// Stores `value` unless `path` was revalidated after `generation` was read.
    /// Returns whether the value was cached.
    pub async fn insert(&self, path: &str, key: &str, generation: u64, value: Value) -> bool {
        let mut inner = self.inner.write().await;
        let entry = inner.entry(path.to_string()).or_default();
        if entry.generation != generation {
            return false;
        }
        if entry.entries.insert(key.to_string(), value).is_none() {
            entry.order.push_back(key.to_string());
            while entry.order.len() > self.max_entries {
                if let Some(oldest) = entry.order.pop_front() {
                    entry.entries.remove(&oldest);
                    debug!(path, key = %oldest, "evicted cached variant");
                }
            }
        }
        true
    }

    /// Drops every cached variant of `path` so the next read goes to the store.
    pub async fn revalidate_path(&self, path: &str) {
        let mut inner = self.inner.write().await;
        let entry = inner.entry(path.to_string()).or_default();
        entry.generation += 1;
        let dropped = entry.entries.len();
        entry.entries.clear();
        entry.order.clear();
        debug!(path, dropped, "revalidated path");
    }

    pub async fn len(&self, path: &str) -> usize {
        let inner = self.inner.read().await;
        inner.get(path).map(|entry| entry.entries.len()).unwrap_or(0)
    }
}
