//! Vantage Storage - Query Cache and Flag Storage
//!
//! - [`cache`]: query result stores (Redis, object store, LMDB, memory), the
//!   insight freshness index, single and dual cache managers, and the factory
//!   that wires them from configuration.
//! - [`jobs`]: background cleanup of stale freshness entries.
//! - [`flag_store`]: persistence seam for feature flags.

pub mod cache;
pub mod flag_store;
pub mod jobs;

pub use cache::{
    BackendHandles, CacheStats, CacheStore, DualCacheManager, FreshnessIndex, InMemoryCacheStore,
    InMemoryFreshnessIndex, LmdbCacheStore, ObjectCacheStore, QueryCacheFactory,
    QueryCacheManager, RedisCacheStore, RedisFreshnessIndex, RetryPolicy, StaleInsight,
    StoreCacheManager, TeamScopedKey,
};
pub use flag_store::{FeatureFlagStore, InMemoryFlagStore};
pub use jobs::{stale_cleanup_task, StaleCleanupConfig, StaleCleanupMetrics};
