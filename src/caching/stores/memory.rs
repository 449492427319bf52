//! # In-Memory Cache Store
//!
//! Process-lifetime key/entry table with TTL support. Expired entries are evicted
//! lazily when they are read.

use super::{now_millis, CacheEntry, CacheStrategy};
use crate::caching::{CacheKind, CacheOptions, CacheResult};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

/// In-memory cache implementation
#[derive(Debug, Default)]
pub struct MemoryCache {
    /// Cache entries storage
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until they are read
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStrategy for MemoryCache {
    async fn get(&self, key: &str, _options: &CacheOptions) -> CacheResult<Option<Value>> {
        let now = now_millis();

        // Evict first so no shard guard is held while removing
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired_at(now))
            .is_some()
        {
            debug!(key = %key, "Evicted expired cache entry");
            return Ok(None);
        }

        Ok(self.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Value, options: &CacheOptions) -> CacheResult<()> {
        self.entries
            .insert(key.to_string(), CacheEntry::new(value, options.ttl));
        Ok(())
    }

    async fn invalidate(&self, key: &str, _options: &CacheOptions) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn invalidate_all(&self, _options: &CacheOptions) -> CacheResult<()> {
        self.entries.clear();
        Ok(())
    }

    fn kind(&self) -> CacheKind {
        CacheKind::Memory
    }
}
