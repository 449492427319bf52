//! # Cache Registry
//!
//! Hands out exactly one store per [`CacheKind`]. Every route using the same kind
//! shares the same instance, and therefore the same state and storage location.
//!
//! The registry is built once at startup and injected into route pipelines and the
//! server, so tests can use isolated registries. It also records every storage
//! directory a route was bound to, so invalidating everything reaches route-level
//! persistent locations as well as the global one.

use dashmap::{DashMap, DashSet};
use futures::future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::{CacheKind, CacheOptions, CacheResult, CacheStrategy, MemoryCache, PersistentCache};

/// Lazily populated strategy singletons
#[derive(Default)]
pub struct CacheRegistry {
    strategies: DashMap<CacheKind, Arc<dyn CacheStrategy>>,
    locations: DashSet<PathBuf>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared strategy instance for `kind`, created on first use
    pub fn strategy(&self, kind: CacheKind) -> Arc<dyn CacheStrategy> {
        self.strategies
            .entry(kind)
            .or_insert_with(|| {
                info!(strategy = %kind, "Creating caching strategy");
                match kind {
                    CacheKind::Memory => Arc::new(MemoryCache::new()) as Arc<dyn CacheStrategy>,
                    CacheKind::Persistent => Arc::new(PersistentCache::new()),
                }
            })
            .clone()
    }

    /// Install a custom store for `kind`, replacing any existing instance
    pub fn register(&self, strategy: Arc<dyn CacheStrategy>) {
        self.strategies.insert(strategy.kind(), strategy);
    }

    /// Strategies created so far
    pub fn instantiated(&self) -> Vec<Arc<dyn CacheStrategy>> {
        self.strategies
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Shared strategy for a route, remembering where it stores persistent entries
    pub fn bind(&self, kind: CacheKind, options: &CacheOptions) -> Arc<dyn CacheStrategy> {
        if kind == CacheKind::Persistent {
            self.locations.insert(options.path.clone());
        }
        self.strategy(kind)
    }

    /// Persistent storage directories bound so far
    pub fn locations(&self) -> Vec<PathBuf> {
        self.locations.iter().map(|path| path.key().clone()).collect()
    }

    /// Invalidate every instantiated strategy concurrently.
    ///
    /// Persistent stores are cleared at `options.path` and at every bound location.
    pub async fn invalidate_all(&self, options: &CacheOptions) -> CacheResult<()> {
        let mut paths = self.locations();
        if !paths.contains(&options.path) {
            paths.push(options.path.clone());
        }

        let targets: Vec<(Arc<dyn CacheStrategy>, CacheOptions)> = self
            .instantiated()
            .into_iter()
            .flat_map(|strategy| match strategy.kind() {
                CacheKind::Memory => vec![(strategy, options.clone())],
                CacheKind::Persistent => paths
                    .iter()
                    .map(|path| (Arc::clone(&strategy), options.clone().with_path(path.clone())))
                    .collect(),
            })
            .collect();

        let results = future::join_all(
            targets
                .iter()
                .map(|(strategy, options)| strategy.invalidate_all(options)),
        )
        .await;
        results.into_iter().collect()
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<CacheKind> = self.strategies.iter().map(|entry| *entry.key()).collect();
        f.debug_struct("CacheRegistry").field("strategies", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_one_instance_per_kind() {
        let registry = CacheRegistry::new();
        let options = CacheOptions::default();

        let first = registry.strategy(CacheKind::Memory);
        let second = registry.strategy(CacheKind::Memory);
        assert!(Arc::ptr_eq(&first, &second));

        first.set("k", json!(1), &options).await.unwrap();
        assert_eq!(second.get("k", &options).await.unwrap(), Some(json!(1)));
        assert_eq!(registry.instantiated().len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_all_clears_every_strategy() {
        let dir = tempfile::TempDir::new().unwrap();
        let registry = CacheRegistry::new();
        let options = CacheOptions::default().with_path(dir.path().join("cache"));

        registry
            .strategy(CacheKind::Memory)
            .set("a", json!("a"), &options)
            .await
            .unwrap();
        registry
            .strategy(CacheKind::Persistent)
            .set("b", json!("b"), &options)
            .await
            .unwrap();

        registry.invalidate_all(&options).await.unwrap();

        let memory = registry.strategy(CacheKind::Memory);
        let persistent = registry.strategy(CacheKind::Persistent);
        assert_eq!(memory.get("a", &options).await.unwrap(), None);
        assert_eq!(persistent.get("b", &options).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalidate_all_reaches_route_level_locations() {
        let dir = tempfile::TempDir::new().unwrap();
        let registry = CacheRegistry::new();
        let global = CacheOptions::default().with_path(dir.path().join("global"));
        let route = CacheOptions::default().with_path(dir.path().join("route"));

        let store = registry.bind(CacheKind::Persistent, &route);
        store.set("k", json!("v"), &route).await.unwrap();
        assert_eq!(registry.locations(), vec![dir.path().join("route")]);

        registry.invalidate_all(&global).await.unwrap();

        assert_eq!(store.get("k", &route).await.unwrap(), None);
        assert!(!dir.path().join("route").exists());
    }
}
