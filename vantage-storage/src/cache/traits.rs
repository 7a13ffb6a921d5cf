//! Cache store trait and usage statistics.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vantage_core::{TeamId, VantageResult};

use super::team_key::TeamScopedKey;

/// A byte-oriented cache store.
///
/// Stores know nothing about envelopes or freshness; they keep opaque blobs
/// under team-scoped keys. Every method may fail on transport errors, which
/// surface as [`vantage_core::StorageError::Backend`] tagged with
/// [`CacheStore::name`].
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short backend identity used in logs and errors (`"redis"`, `"object"`, ...).
    fn name(&self) -> &'static str;

    /// Read a blob. `None` is a miss.
    async fn read(&self, key: &TeamScopedKey) -> VantageResult<Option<Vec<u8>>>;

    /// Write a blob that the store may drop after `ttl`.
    async fn write(&self, key: &TeamScopedKey, value: &[u8], ttl: Duration) -> VantageResult<()>;

    /// Delete a blob, returning whether it existed.
    async fn delete(&self, key: &TeamScopedKey) -> VantageResult<bool>;

    /// Delete every blob belonging to a team, returning how many were removed.
    async fn invalidate_team(&self, team_id: TeamId) -> VantageResult<u64>;

    /// Cheap liveness probe.
    async fn ping(&self) -> VantageResult<()>;

    /// Hit/miss counters since the store was created.
    fn stats(&self) -> CacheStats;
}

#[async_trait]
impl<T: CacheStore + ?Sized> CacheStore for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn read(&self, key: &TeamScopedKey) -> VantageResult<Option<Vec<u8>>> {
        (**self).read(key).await
    }

    async fn write(&self, key: &TeamScopedKey, value: &[u8], ttl: Duration) -> VantageResult<()> {
        (**self).write(key, value, ttl).await
    }

    async fn delete(&self, key: &TeamScopedKey) -> VantageResult<bool> {
        (**self).delete(key).await
    }

    async fn invalidate_team(&self, team_id: TeamId) -> VantageResult<u64> {
        (**self).invalidate_team(team_id).await
    }

    async fn ping(&self) -> VantageResult<()> {
        (**self).ping().await
    }

    fn stats(&self) -> CacheStats {
        (**self).stats()
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub errors: u64,
}

impl CacheStats {
    /// Hit rate in `0.0..=1.0`; zero before the first read.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters shared by the store implementations.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    errors: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a read outcome and pass it through.
    pub(crate) fn observe_read<T>(&self, result: &VantageResult<Option<T>>) {
        match result {
            Ok(Some(_)) => self.hit(),
            Ok(None) => self.miss(),
            Err(_) => self.error(),
        }
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
