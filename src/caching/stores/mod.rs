//! # Cache Stores Module
//!
//! This module provides the strategy contract and its in-memory and
//! filesystem-backed implementations.

pub mod memory;
pub mod persistent;

pub use memory::MemoryCache;
pub use persistent::PersistentCache;

use super::{CacheKind, CacheOptions, CacheResult};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Cached value with its expiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// The cached value
    pub value: Value,

    /// Expiry as a Unix timestamp in milliseconds; `None` never expires
    pub expires_at: Option<i64>,
}

impl CacheEntry {
    /// Create a new cache entry expiring `ttl` from now
    pub fn new(value: Value, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.map(|ttl| {
            let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            now_millis().saturating_add(ttl_ms)
        });
        Self { value, expires_at }
    }

    /// Check if the entry is expired at `now` (milliseconds)
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.map_or(false, |expires_at| now > expires_at)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Contract every cache backend implements
#[async_trait]
pub trait CacheStrategy: Send + Sync {
    /// Get a live value; expired entries are evicted and reported absent
    async fn get(&self, key: &str, options: &CacheOptions) -> CacheResult<Option<Value>>;

    /// Store a value, expiring after `options.ttl`
    async fn set(&self, key: &str, value: Value, options: &CacheOptions) -> CacheResult<()>;

    /// Remove a single entry
    async fn invalidate(&self, key: &str, options: &CacheOptions) -> CacheResult<()>;

    /// Remove every entry
    async fn invalidate_all(&self, options: &CacheOptions) -> CacheResult<()>;

    /// Strategy kind
    fn kind(&self) -> CacheKind;
}
