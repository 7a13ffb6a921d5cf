//! Builds query cache managers from configuration.
//!
//! Clients are created once and shared; a manager is cheap to build per
//! request and borrows the shared handles through `Arc`s.

use std::sync::Arc;
use std::time::Duration;
use vantage_core::{
    CacheBackendKind, CacheKey, CachePreference, CacheTarget, DurableStoreKind, HealthReport,
    TeamId, VantageConfig, VantageResult,
};

use super::dual::{probe, DualCacheManager};
use super::freshness::{FreshnessIndex, InMemoryFreshnessIndex, RedisFreshnessIndex};
use super::lmdb_store::LmdbCacheStore;
use super::manager::{QueryCacheManager, StoreCacheManager};
use super::memory_store::InMemoryCacheStore;
use super::object_store::ObjectCacheStore;
use super::redis_store::{open_client, RedisCacheStore};
use super::traits::CacheStore;

/// Shared store and freshness index handles of one backend.
#[derive(Clone)]
pub struct BackendHandles {
    pub store: Arc<dyn CacheStore>,
    pub index: Arc<dyn FreshnessIndex>,
}

impl BackendHandles {
    pub fn new(store: Arc<dyn CacheStore>, index: Arc<dyn FreshnessIndex>) -> Self {
        Self { store, index }
    }

    fn manager(&self, target: CacheTarget, ttl: Duration) -> SharedStoreManager {
        StoreCacheManager::new(
            Arc::clone(&self.store),
            Arc::clone(&self.index),
            target,
            ttl,
        )
    }
}

/// Per-backend manager over shared handles.
pub type SharedStoreManager = StoreCacheManager<Arc<dyn CacheStore>, Arc<dyn FreshnessIndex>>;

#[derive(Clone)]
enum Layout {
    Single(BackendHandles),
    Dual {
        primary: BackendHandles,
        secondary: BackendHandles,
        prefer: CachePreference,
    },
}

/// Factory of [`QueryCacheManager`]s.
#[derive(Clone)]
pub struct QueryCacheFactory {
    layout: Layout,
    ttl: Duration,
}

impl QueryCacheFactory {
    /// Managers over a single backend.
    pub fn single(handles: BackendHandles, ttl: Duration) -> Self {
        Self {
            layout: Layout::Single(handles),
            ttl,
        }
    }

    /// Managers that write to both backends.
    pub fn dual(
        primary: BackendHandles,
        secondary: BackendHandles,
        prefer: CachePreference,
        ttl: Duration,
    ) -> Self {
        Self {
            layout: Layout::Dual {
                primary,
                secondary,
                prefer,
            },
            ttl,
        }
    }

    /// Build clients for the configured backend(s).
    ///
    /// Redis-backed layouts keep freshness in Redis. Layouts without Redis
    /// keep it in process memory.
    pub fn from_config(config: &VantageConfig) -> VantageResult<Self> {
        config.validate()?;
        let ttl = config.cache.result_ttl();

        let factory = match config.cache.backend {
            CacheBackendKind::Redis => Self::single(redis_handles(config)?, ttl),
            CacheBackendKind::Memory => Self::single(
                BackendHandles::new(
                    Arc::new(InMemoryCacheStore::new()),
                    Arc::new(InMemoryFreshnessIndex::new()),
                ),
                ttl,
            ),
            CacheBackendKind::Object | CacheBackendKind::Lmdb => {
                let durable = if config.cache.backend == CacheBackendKind::Object {
                    DurableStoreKind::Object
                } else {
                    DurableStoreKind::Lmdb
                };
                Self::single(
                    BackendHandles::new(
                        durable_store(config, durable)?,
                        Arc::new(InMemoryFreshnessIndex::new()),
                    ),
                    ttl,
                )
            }
            CacheBackendKind::Dual => {
                let primary = redis_handles(config)?;
                // Both halves share the Redis freshness index.
                let secondary = BackendHandles::new(
                    durable_store(config, config.cache.durable_store)?,
                    Arc::clone(&primary.index),
                );
                Self::dual(primary, secondary, config.cache.prefer, ttl)
            }
        };

        tracing::info!(
            backend = factory.backend_label(),
            ttl_secs = ttl.as_secs(),
            "Query cache configured"
        );
        Ok(factory)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn backend_label(&self) -> String {
        match &self.layout {
            Layout::Single(handles) => handles.store.name().to_string(),
            Layout::Dual {
                primary, secondary, ..
            } => format!("dual({}+{})", primary.store.name(), secondary.store.name()),
        }
    }

    /// Manager for one query result.
    pub fn manager_for(&self, target: CacheTarget) -> Box<dyn QueryCacheManager> {
        match &self.layout {
            Layout::Single(handles) => Box::new(handles.manager(target, self.ttl)),
            Layout::Dual {
                primary,
                secondary,
                prefer,
            } => Box::new(DualCacheManager::new(
                primary.manager(target.clone(), self.ttl),
                secondary.manager(target, self.ttl),
                *prefer,
            )),
        }
    }

    /// Freshness index used for team-wide bookkeeping.
    ///
    /// In a dual layout this is the preferred half's index.
    pub fn freshness_index(&self) -> Arc<dyn FreshnessIndex> {
        match &self.layout {
            Layout::Single(handles) => Arc::clone(&handles.index),
            Layout::Dual {
                primary,
                secondary,
                prefer,
            } => match prefer {
                CachePreference::Primary => Arc::clone(&primary.index),
                CachePreference::Secondary => Arc::clone(&secondary.index),
            },
        }
    }

    /// Probe every configured store.
    pub async fn health_check(&self) -> HealthReport {
        let target = CacheTarget::new(TeamId::from_raw(0), CacheKey::new("health"));
        match &self.layout {
            Layout::Single(handles) => {
                let manager = handles.manager(target, self.ttl);
                HealthReport::from_checks(vec![probe(&manager).await])
            }
            Layout::Dual {
                primary,
                secondary,
                prefer,
            } => {
                DualCacheManager::new(
                    primary.manager(target.clone(), self.ttl),
                    secondary.manager(target, self.ttl),
                    *prefer,
                )
                .health_check()
                .await
            }
        }
    }
}

fn redis_handles(config: &VantageConfig) -> VantageResult<BackendHandles> {
    let client = open_client(&config.redis.url)?;
    Ok(BackendHandles::new(
        Arc::new(RedisCacheStore::from_client(client.clone())),
        Arc::new(RedisFreshnessIndex::from_client(client)),
    ))
}

fn durable_store(
    config: &VantageConfig,
    kind: DurableStoreKind,
) -> VantageResult<Arc<dyn CacheStore>> {
    let store: Arc<dyn CacheStore> = match kind {
        DurableStoreKind::Object => Arc::new(ObjectCacheStore::from_config(&config.object_store)?),
        DurableStoreKind::Lmdb => Arc::new(LmdbCacheStore::from_config(&config.lmdb)?),
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use vantage_core::{HealthStatus, InsightId};

    fn target() -> CacheTarget {
        CacheTarget::new(TeamId::from_raw(3), CacheKey::new("cache_f"))
            .with_insight(InsightId::from_raw(8))
    }

    #[tokio::test]
    async fn test_memory_backend_from_config() {
        let mut config = VantageConfig::default();
        config.cache.backend = CacheBackendKind::Memory;
        let factory = QueryCacheFactory::from_config(&config).expect("factory");

        let manager = factory.manager_for(target());
        assert_eq!(manager.backend_name(), "memory");
        manager.set_cache_data(&json!([1]), None).await.expect("set");

        // A second manager for the same target shares the store.
        let again = factory.manager_for(target());
        assert!(again.get_cache_data().await.expect("get").is_some());
        assert_eq!(factory.health_check().await.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_dual_layout_from_config() {
        let dir = TempDir::new().expect("tempdir");
        let mut config = VantageConfig::default();
        config.cache.backend = CacheBackendKind::Dual;
        config.cache.durable_store = DurableStoreKind::Lmdb;
        config.cache.prefer = CachePreference::Secondary;
        config.lmdb.path = dir.path().to_path_buf();
        config.lmdb.max_size_mb = 10;

        // Opening a Redis client does not connect.
        let factory = QueryCacheFactory::from_config(&config).expect("factory");
        assert_eq!(factory.manager_for(target()).backend_name(), "dual(redis+lmdb)");
        assert_eq!(factory.freshness_index().name(), "redis");
        assert_eq!(factory.ttl(), Duration::from_secs(604_800));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = VantageConfig::default();
        config.cache.result_ttl_secs = 0;
        assert!(QueryCacheFactory::from_config(&config).is_err());
    }
}
