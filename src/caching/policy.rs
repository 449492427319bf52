//! Per-route caching policy.
//!
//! A route's caching is disabled outright, inherited from the global configuration,
//! or an override merged over it (`defaults <- global <- route`). Without a global
//! configuration, only routes with an explicit override cache.

use std::path::PathBuf;
use std::time::Duration;

use super::{CacheKind, CacheOptions, KeyComposer};
use crate::core::config::CachingConfig;

/// Caching declared by a route descriptor
#[derive(Debug, Clone, Default)]
pub enum RouteCaching {
    /// Never cache this route
    Disabled,

    /// Use the global configuration, if any
    #[default]
    Inherit,

    /// Override parts of the global configuration
    Enabled(CachingOverride),
}

/// Route-level caching settings; unset fields fall back to the global configuration
#[derive(Debug, Clone, Default)]
pub struct CachingOverride {
    pub strategy: Option<CacheKind>,
    pub ttl: Option<Duration>,
    pub path: Option<PathBuf>,
    pub key_composer: Option<KeyComposer>,
}

impl CachingOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strategy(mut self, strategy: CacheKind) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn key_composer(mut self, composer: KeyComposer) -> Self {
        self.key_composer = Some(composer);
        self
    }
}

/// Resolved caching settings of a route
#[derive(Debug, Clone)]
pub struct EffectiveCaching {
    pub strategy: CacheKind,
    pub options: CacheOptions,
    pub key_composer: KeyComposer,
}

/// Merge global and route caching; `None` means the route does not cache
pub fn effective_caching(
    global: Option<&CachingConfig>,
    route: &RouteCaching,
) -> Option<EffectiveCaching> {
    let from_global = |global: &CachingConfig| EffectiveCaching {
        strategy: global.strategy,
        options: CacheOptions {
            ttl: global.ttl,
            path: global.path.clone(),
        },
        key_composer: KeyComposer::default(),
    };

    match route {
        RouteCaching::Disabled => None,
        RouteCaching::Inherit => global.map(from_global),
        RouteCaching::Enabled(route) => {
            let base = global
                .map(from_global)
                .unwrap_or_else(|| from_global(&CachingConfig::default()));

            Some(EffectiveCaching {
                strategy: route.strategy.unwrap_or(base.strategy),
                options: CacheOptions {
                    ttl: route.ttl.or(base.options.ttl),
                    path: route.path.clone().unwrap_or(base.options.path),
                },
                key_composer: route.key_composer.clone().unwrap_or(base.key_composer),
            })
        }
    }
}
