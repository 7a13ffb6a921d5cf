//! Configuration types
//!
//! Configuration is read from a TOML file and then overridden from the
//! environment. Every section has development defaults so a bare
//! `VantageConfig::default()` runs against a local Redis.

use crate::{ConfigError, TeamId};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default lifetime of a cached query result (7 days).
pub const DEFAULT_RESULT_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Which store(s) back the query cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// Redis only.
    Redis,
    /// S3-compatible object store only.
    Object,
    /// Embedded LMDB only.
    Lmdb,
    /// Process-local memory (tests, single-node tools).
    Memory,
    /// Redis plus the configured durable store.
    Dual,
}

impl CacheBackendKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "redis" => Some(Self::Redis),
            "object" => Some(Self::Object),
            "lmdb" => Some(Self::Lmdb),
            "memory" => Some(Self::Memory),
            "dual" => Some(Self::Dual),
            _ => None,
        }
    }
}

/// Durable half of a dual cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurableStoreKind {
    Object,
    Lmdb,
}

/// Which half of a dual cache is read first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePreference {
    /// The low-latency (Redis) store.
    #[default]
    Primary,
    /// The durable store.
    Secondary,
}

impl CachePreference {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "primary" => Some(Self::Primary),
            "secondary" => Some(Self::Secondary),
            _ => None,
        }
    }
}

/// Query cache behaviour.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    pub durable_store: DurableStoreKind,
    pub prefer: CachePreference,
    pub result_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Redis,
            durable_store: DurableStoreKind::Object,
            prefer: CachePreference::Primary,
            result_ttl_secs: DEFAULT_RESULT_TTL_SECS,
        }
    }
}

impl CacheConfig {
    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }
}

/// Redis connection settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/".to_string(),
        }
    }
}

/// S3-compatible object store settings.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObjectStoreConfig {
    pub endpoint: String,
    pub bucket: String,
    /// Bearer token sent with every request, if the store requires one.
    pub token: Option<SecretString>,
    pub request_timeout_ms: u64,
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000".to_string(),
            bucket: "query-cache".to_string(),
            token: None,
            request_timeout_ms: 2_000,
            max_attempts: 3,
            base_backoff_ms: 100,
        }
    }
}

impl ObjectStoreConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Embedded LMDB settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LmdbConfig {
    pub path: PathBuf,
    pub max_size_mb: usize,
}

impl Default for LmdbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/query-cache"),
            max_size_mb: 1024,
        }
    }
}

/// Periodic removal of long-stale insights from the freshness index.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleanupConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Entries whose target age is older than this are dropped.
    pub retention_secs: u64,
    pub team_ids: Vec<TeamId>,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 3600,
            retention_secs: 7 * 24 * 60 * 60,
            team_ids: Vec::new(),
        }
    }
}

impl CleanupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// Master configuration struct.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VantageConfig {
    pub cache: CacheConfig,
    pub redis: RedisConfig,
    pub object_store: ObjectStoreConfig,
    pub lmdb: LmdbConfig,
    pub cleanup: CleanupConfig,
}

impl VantageConfig {
    /// Parse a TOML document. Missing sections take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply overrides from the process environment.
    ///
    /// Environment variables:
    /// - `VANTAGE_CACHE_BACKEND`: redis | object | lmdb | memory | dual
    /// - `VANTAGE_CACHE_PREFER`: primary | secondary
    /// - `VANTAGE_CACHE_TTL_SECS`: result TTL in seconds
    /// - `VANTAGE_REDIS_URL`
    /// - `VANTAGE_OBJECT_ENDPOINT`, `VANTAGE_OBJECT_BUCKET`, `VANTAGE_OBJECT_TOKEN`
    /// - `VANTAGE_LMDB_PATH`
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("VANTAGE_CACHE_BACKEND") {
            self.cache.backend =
                CacheBackendKind::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                    field: "cache.backend".to_string(),
                    value: raw.clone(),
                    reason: "expected redis, object, lmdb, memory or dual".to_string(),
                })?;
        }
        if let Some(raw) = lookup("VANTAGE_CACHE_PREFER") {
            self.cache.prefer =
                CachePreference::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                    field: "cache.prefer".to_string(),
                    value: raw.clone(),
                    reason: "expected primary or secondary".to_string(),
                })?;
        }
        if let Some(raw) = lookup("VANTAGE_CACHE_TTL_SECS") {
            self.cache.result_ttl_secs =
                raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    field: "cache.result_ttl_secs".to_string(),
                    value: raw.clone(),
                    reason: "expected a whole number of seconds".to_string(),
                })?;
        }
        if let Some(url) = lookup("VANTAGE_REDIS_URL") {
            self.redis.url = url;
        }
        if let Some(endpoint) = lookup("VANTAGE_OBJECT_ENDPOINT") {
            self.object_store.endpoint = endpoint;
        }
        if let Some(bucket) = lookup("VANTAGE_OBJECT_BUCKET") {
            self.object_store.bucket = bucket;
        }
        if let Some(token) = lookup("VANTAGE_OBJECT_TOKEN") {
            self.object_store.token = Some(SecretString::from(token));
        }
        if let Some(path) = lookup("VANTAGE_LMDB_PATH") {
            self.lmdb.path = PathBuf::from(path);
        }
        Ok(self)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.result_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.result_ttl_secs".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let needs_redis = matches!(
            self.cache.backend,
            CacheBackendKind::Redis | CacheBackendKind::Dual
        );
        if needs_redis && self.redis.url.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "redis.url".to_string(),
            });
        }

        let needs_object = self.cache.backend == CacheBackendKind::Object
            || (self.cache.backend == CacheBackendKind::Dual
                && self.cache.durable_store == DurableStoreKind::Object);
        if needs_object {
            if self.object_store.endpoint.trim().is_empty() {
                return Err(ConfigError::MissingRequired {
                    field: "object_store.endpoint".to_string(),
                });
            }
            if self.object_store.bucket.trim().is_empty() {
                return Err(ConfigError::MissingRequired {
                    field: "object_store.bucket".to_string(),
                });
            }
            if self.object_store.max_attempts == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "object_store.max_attempts".to_string(),
                    value: "0".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }

        if self.cleanup.enabled && self.cleanup.interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cleanup.interval_secs".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_validate() {
        let config = VantageConfig::default();
        assert_eq!(config.cache.backend, CacheBackendKind::Redis);
        assert_eq!(config.cache.result_ttl(), Duration::from_secs(604_800));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = VantageConfig::from_toml_str(
            r#"
            [cache]
            backend = "dual"
            durable_store = "lmdb"
            prefer = "secondary"

            [lmdb]
            path = "/var/lib/vantage"

            [cleanup]
            enabled = true
            team_ids = [1, 2]
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.cache.backend, CacheBackendKind::Dual);
        assert_eq!(config.cache.durable_store, DurableStoreKind::Lmdb);
        assert_eq!(config.cache.prefer, CachePreference::Secondary);
        assert_eq!(config.cache.result_ttl_secs, DEFAULT_RESULT_TTL_SECS);
        assert_eq!(config.lmdb.path, PathBuf::from("/var/lib/vantage"));
        assert_eq!(config.lmdb.max_size_mb, 1024);
        assert_eq!(
            config.cleanup.team_ids,
            vec![TeamId::from_raw(1), TeamId::from_raw(2)]
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = VantageConfig::from_toml_str("[cache]\nbackend = \"redis\"\nbogus = 1\n")
            .expect_err("unknown field should fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("VANTAGE_CACHE_BACKEND", "Dual"),
            ("VANTAGE_CACHE_PREFER", "secondary"),
            ("VANTAGE_CACHE_TTL_SECS", "60"),
            ("VANTAGE_REDIS_URL", "redis://cache:6379/1"),
            ("VANTAGE_OBJECT_TOKEN", "s3cret"),
        ]
        .into_iter()
        .collect();

        let config = VantageConfig::default()
            .with_overrides_from(|name| vars.get(name).map(|v| v.to_string()))
            .expect("overrides should apply");

        assert_eq!(config.cache.backend, CacheBackendKind::Dual);
        assert_eq!(config.cache.prefer, CachePreference::Secondary);
        assert_eq!(config.cache.result_ttl_secs, 60);
        assert_eq!(config.redis.url, "redis://cache:6379/1");
        assert_eq!(
            config
                .object_store
                .token
                .as_ref()
                .map(|t| t.expose_secret().to_string()),
            Some("s3cret".to_string())
        );
    }

    #[test]
    fn test_env_override_rejects_bad_backend() {
        let err = VantageConfig::default()
            .with_overrides_from(|name| {
                (name == "VANTAGE_CACHE_BACKEND").then(|| "memcached".to_string())
            })
            .expect_err("bad backend should fail");
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "cache.backend"));
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut config = VantageConfig::default();
        config.cache.result_ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_bucket_for_object_store() {
        let mut config = VantageConfig::default();
        config.cache.backend = CacheBackendKind::Dual;
        config.object_store.bucket = String::new();
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingRequired {
                field: "object_store.bucket".to_string()
            })
        );

        config.cache.durable_store = DurableStoreKind::Lmdb;
        assert!(config.validate().is_ok());
    }
}
