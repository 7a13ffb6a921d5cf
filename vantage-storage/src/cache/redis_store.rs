//! Redis-backed cache store.
//!
//! Blobs are written with `SET key value EX ttl`; Redis drops them on its own
//! once the TTL passes. Team invalidation walks the team's keys with `SCAN`
//! and deletes them in batches.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use vantage_core::{StorageError, TeamId, VantageError, VantageResult};

use super::team_key::TeamScopedKey;
use super::traits::{CacheStats, CacheStore, StatsRecorder};

/// Keys fetched per `SCAN` round trip.
const SCAN_BATCH: usize = 500;

/// Error type for Redis cache operations.
#[derive(Debug, thiserror::Error)]
pub enum RedisStoreError {
    #[error("Invalid Redis URL: {0}")]
    InvalidUrl(String),

    #[error("Redis connection failed: {0}")]
    Connection(String),

    #[error("Redis command failed: {0}")]
    Command(String),
}

impl From<RedisStoreError> for VantageError {
    fn from(e: RedisStoreError) -> Self {
        VantageError::Storage(StorageError::backend("redis", e))
    }
}

/// Open a Redis client for `url`.
pub fn open_client(url: &str) -> Result<redis::Client, RedisStoreError> {
    redis::Client::open(url).map_err(|e| RedisStoreError::InvalidUrl(e.to_string()))
}

pub(crate) async fn connect(
    client: &redis::Client,
) -> Result<MultiplexedConnection, RedisStoreError> {
    client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| RedisStoreError::Connection(e.to_string()))
}

pub(crate) fn command_error(e: redis::RedisError) -> RedisStoreError {
    RedisStoreError::Command(e.to_string())
}

/// [`CacheStore`] over a Redis server.
#[derive(Debug, Clone)]
pub struct RedisCacheStore {
    client: redis::Client,
    stats: std::sync::Arc<StatsRecorder>,
}

impl RedisCacheStore {
    pub fn new(url: &str) -> Result<Self, RedisStoreError> {
        Ok(Self::from_client(open_client(url)?))
    }

    pub fn from_client(client: redis::Client) -> Self {
        Self {
            client,
            stats: Default::default(),
        }
    }

    async fn read_inner(&self, key: &TeamScopedKey) -> Result<Option<Vec<u8>>, RedisStoreError> {
        let mut conn = connect(&self.client).await?;
        conn.get(key.redis_key()).await.map_err(command_error)
    }

    async fn invalidate_inner(&self, team_id: TeamId) -> Result<u64, RedisStoreError> {
        let mut conn = connect(&self.client).await?;
        let pattern = TeamScopedKey::redis_team_pattern(team_id);
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(command_error)?;
            if !keys.is_empty() {
                let deleted: u64 = conn.del(keys).await.map_err(command_error)?;
                removed += deleted;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(removed)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn read(&self, key: &TeamScopedKey) -> VantageResult<Option<Vec<u8>>> {
        let result = self.read_inner(key).await.map_err(VantageError::from);
        self.stats.observe_read(&result);
        result
    }

    async fn write(&self, key: &TeamScopedKey, value: &[u8], ttl: Duration) -> VantageResult<()> {
        let mut conn = connect(&self.client).await.map_err(|e| {
            self.stats.error();
            e
        })?;
        // EX 0 is rejected by Redis.
        let seconds = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(key.redis_key(), value, seconds)
            .await
            .map_err(|e| {
                self.stats.error();
                command_error(e)
            })?;
        self.stats.write();
        Ok(())
    }

    async fn delete(&self, key: &TeamScopedKey) -> VantageResult<bool> {
        let mut conn = connect(&self.client).await?;
        let removed: u64 = conn.del(key.redis_key()).await.map_err(command_error)?;
        Ok(removed > 0)
    }

    async fn invalidate_team(&self, team_id: TeamId) -> VantageResult<u64> {
        let removed = self.invalidate_inner(team_id).await?;
        tracing::info!(backend = "redis", team_id = %team_id, removed, "Invalidated team cache");
        Ok(removed)
    }

    async fn ping(&self) -> VantageResult<()> {
        let mut conn = connect(&self.client).await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}
