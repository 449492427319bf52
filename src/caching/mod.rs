//! # Caching System Module
//!
//! Pluggable response caching for routes.
//!
//! ## Features
//! - Strategy abstraction ([`CacheStrategy`]) with an in-memory TTL store and a
//!   filesystem-backed store
//! - One shared instance per strategy kind, handed out by an injected [`CacheRegistry`]
//! - Per-route key composition ([`KeyComposer`]), defaulting to `METHOD::url`
//! - Effective per-route configuration merged from global defaults and route overrides
//!
//! ## Architecture
//! 1. **Stores**: `MemoryCache` and `PersistentCache` implement the strategy contract
//! 2. **Registry**: lazily creates one store per kind and can invalidate all of them
//! 3. **Policy**: decides whether a route caches and with which options
//! 4. **Key generator**: turns the outbound request into a cache key
//!
//! Cache failures are reported as [`CacheError`]; the request pipeline logs and swallows
//! them so a broken cache never fails a request.

pub mod key_generator;
pub mod policy;
pub mod registry;
pub mod stores;

pub use key_generator::{default_key, CacheKeyInput, KeyComposer};
pub use policy::{effective_caching, CachingOverride, EffectiveCaching, RouteCaching};
pub use registry::CacheRegistry;
pub use stores::{CacheEntry, CacheStrategy, MemoryCache, PersistentCache};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Cache operation result
pub type CacheResult<T> = Result<T, CacheError>;

/// Default directory of the persistent store
pub const DEFAULT_CACHING_PATH: &str = "__caching";

/// Cache-specific error types
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache store error: {message}")]
    Store { message: String },

    #[error("Invalid cache key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    pub fn invalid_key(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Available cache strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    #[default]
    Memory,
    Persistent,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Persistent => "persistent",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options passed with every strategy call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// Entry lifetime; `None` never expires
    pub ttl: Option<Duration>,

    /// Storage directory of the persistent store (ignored by the memory store)
    pub path: PathBuf,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            path: PathBuf::from(DEFAULT_CACHING_PATH),
        }
    }
}

impl CacheOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }
}
