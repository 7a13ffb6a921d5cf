//! LMDB-backed cache store.
//!
//! Uses heed to keep query results in a memory-mapped file, so a single node
//! keeps its cache across restarts without an external service.
//!
//! Values are stored as `[expires_at: i64 millis LE][payload]`. Expired
//! values read as misses; they are overwritten by the next write or removed
//! by team invalidation.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use vantage_core::{LmdbConfig, StorageError, TeamId, VantageError, VantageResult};

use super::team_key::TeamScopedKey;
use super::traits::{CacheStats, CacheStore, StatsRecorder};

const EXPIRY_BYTES: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Corrupt value: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for VantageError {
    fn from(e: LmdbStoreError) -> Self {
        VantageError::Storage(StorageError::backend("lmdb", e))
    }
}

fn txn_error(e: heed::Error) -> LmdbStoreError {
    LmdbStoreError::Transaction(e.to_string())
}

/// [`CacheStore`] over an embedded LMDB environment.
pub struct LmdbCacheStore {
    env: Env,
    db: Database<Bytes, Bytes>,
    stats: StatsRecorder,
}

impl std::fmt::Debug for LmdbCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbCacheStore")
            .field("path", &self.env.path())
            .finish()
    }
}

impl LmdbCacheStore {
    /// Open (or create) the store under `path`, capped at `max_size_mb`.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process and
        // the file is not modified by anything outside LMDB.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_error)?;

        Ok(Self {
            env,
            db,
            stats: StatsRecorder::default(),
        })
    }

    pub fn from_config(config: &LmdbConfig) -> Result<Self, LmdbStoreError> {
        Self::new(&config.path, config.max_size_mb)
    }

    fn read_inner(&self, key: &TeamScopedKey) -> Result<Option<Vec<u8>>, LmdbStoreError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let Some(bytes) = self.db.get(&rtxn, &key.encode()).map_err(txn_error)? else {
            return Ok(None);
        };
        if bytes.len() < EXPIRY_BYTES {
            return Err(LmdbStoreError::Corrupt(format!(
                "value for {} is {} bytes",
                key.cache_key(),
                bytes.len()
            )));
        }
        let (expiry, payload) = bytes.split_at(EXPIRY_BYTES);
        let expires_at_ms = i64::from_le_bytes(
            expiry
                .try_into()
                .map_err(|_| LmdbStoreError::Corrupt("invalid expiry".to_string()))?,
        );
        if expires_at_ms <= Utc::now().timestamp_millis() {
            return Ok(None);
        }
        Ok(Some(payload.to_vec()))
    }

    fn write_inner(
        &self,
        key: &TeamScopedKey,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), LmdbStoreError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at_ms = Utc::now().timestamp_millis().saturating_add(ttl_ms);

        let mut full = Vec::with_capacity(EXPIRY_BYTES + value.len());
        full.extend_from_slice(&expires_at_ms.to_le_bytes());
        full.extend_from_slice(value);

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db
            .put(&mut wtxn, &key.encode(), &full)
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)
    }

    fn delete_inner(&self, key: &TeamScopedKey) -> Result<bool, LmdbStoreError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let deleted = self.db.delete(&mut wtxn, &key.encode()).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }

    fn collect_keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, LmdbStoreError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let mut keys = Vec::new();
        for entry in self.db.iter(&rtxn).map_err(txn_error)? {
            let (key, _) = entry.map_err(txn_error)?;
            if key.starts_with(prefix) {
                keys.push(key.to_vec());
            }
        }
        Ok(keys)
    }

    fn invalidate_inner(&self, team_id: TeamId) -> Result<u64, LmdbStoreError> {
        let keys = self.collect_keys_with_prefix(&TeamScopedKey::team_prefix(team_id))?;
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let mut deleted = 0u64;
        for key in &keys {
            if self.db.delete(&mut wtxn, key).map_err(txn_error)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }
}

#[async_trait]
impl CacheStore for LmdbCacheStore {
    fn name(&self) -> &'static str {
        "lmdb"
    }

    async fn read(&self, key: &TeamScopedKey) -> VantageResult<Option<Vec<u8>>> {
        let result = self.read_inner(key).map_err(VantageError::from);
        self.stats.observe_read(&result);
        result
    }

    async fn write(&self, key: &TeamScopedKey, value: &[u8], ttl: Duration) -> VantageResult<()> {
        match self.write_inner(key, value, ttl) {
            Ok(()) => {
                self.stats.write();
                Ok(())
            }
            Err(e) => {
                self.stats.error();
                Err(e.into())
            }
        }
    }

    async fn delete(&self, key: &TeamScopedKey) -> VantageResult<bool> {
        Ok(self.delete_inner(key)?)
    }

    async fn invalidate_team(&self, team_id: TeamId) -> VantageResult<u64> {
        let removed = self.invalidate_inner(team_id)?;
        tracing::info!(backend = "lmdb", team_id = %team_id, removed, "Invalidated team cache");
        Ok(removed)
    }

    async fn ping(&self) -> VantageResult<()> {
        self.env.read_txn().map_err(txn_error)?;
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}
