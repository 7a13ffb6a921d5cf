//! Query result cache.
//!
//! The cache is layered:
//!
//! - [`CacheStore`]: byte blobs under [`TeamScopedKey`]s (Redis, object
//!   store, LMDB, memory).
//! - [`FreshnessIndex`]: per-team sorted sets of insight target ages.
//! - [`QueryCacheManager`]: envelope (de)serialization plus bookkeeping for
//!   one [`vantage_core::CacheTarget`], either over a single store
//!   ([`StoreCacheManager`]) or over two ([`DualCacheManager`]).
//! - [`QueryCacheFactory`]: builds managers from configuration over shared
//!   clients.

pub mod dual;
pub mod factory;
pub mod freshness;
pub mod lmdb_store;
pub mod manager;
pub mod memory_store;
pub mod object_store;
pub mod redis_store;
pub mod retry;
pub mod team_key;
pub mod traits;

pub use dual::DualCacheManager;
pub use factory::{BackendHandles, QueryCacheFactory, SharedStoreManager};
pub use freshness::{
    FreshnessIndex, InMemoryFreshnessIndex, RedisFreshnessIndex, StaleInsight,
    FRESHNESS_KEY_PREFIX,
};
pub use lmdb_store::{LmdbCacheStore, LmdbStoreError};
pub use manager::{QueryCacheManager, StoreCacheManager};
pub use memory_store::InMemoryCacheStore;
pub use object_store::{ObjectCacheStore, ObjectStoreError};
pub use redis_store::{RedisCacheStore, RedisStoreError};
pub use retry::RetryPolicy;
pub use team_key::{TeamScopedKey, KEY_NAMESPACE};
pub use traits::{CacheStats, CacheStore};
