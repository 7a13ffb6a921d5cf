//! Vantage Core - Shared Types
//!
//! Identifiers, cache and flag data types, errors and configuration shared by
//! every other Vantage crate. No I/O happens here apart from reading a config
//! file.

use chrono::{DateTime, Utc};

pub mod cache;
pub mod config;
pub mod error;
pub mod flag;
pub mod health;
pub mod ids;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

pub use cache::{canonical_json, CacheEnvelope, CacheKey, CacheTarget, CachedResponse, CACHE_KEY_PREFIX};
pub use config::{
    CacheBackendKind, CacheConfig, CachePreference, CleanupConfig, DurableStoreKind, LmdbConfig,
    ObjectStoreConfig, RedisConfig, VantageConfig, DEFAULT_RESULT_TTL_SECS,
};
pub use error::{
    format_flag_list, ConfigError, StorageError, ValidationError, VantageError, VantageResult,
    MAX_LISTED_FLAGS,
};
pub use flag::{
    FeatureFlag, FlagConditionGroup, FlagFilters, FlagSummary, PropertyFilter, FLAG_EVALUATES_TO,
    FLAG_PROPERTY_TYPE,
};
pub use health::{HealthCheck, HealthReport, HealthStatus};
pub use ids::{DashboardId, FlagId, IdType, InsightId, TeamId};
