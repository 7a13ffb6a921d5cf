//! Process-local cache store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use vantage_core::{TeamId, VantageResult};

use super::team_key::TeamScopedKey;
use super::traits::{CacheStats, CacheStore, StatsRecorder};

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-memory [`CacheStore`] for tests and single-process tools.
///
/// Expired entries are dropped lazily on read and on the next write to the
/// same key.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<TeamScopedKey, MemoryEntry>>,
    stats: StatsRecorder,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn read(&self, key: &TeamScopedKey) -> VantageResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let found = {
            let entries = self.entries.read().await;
            entries.get(key).cloned()
        };
        let result = match found {
            Some(entry) if entry.is_live(now) => Some(entry.value),
            Some(_) => {
                self.entries.write().await.remove(key);
                None
            }
            None => None,
        };
        let result = Ok(result);
        self.stats.observe_read(&result);
        result
    }

    async fn write(&self, key: &TeamScopedKey, value: &[u8], ttl: Duration) -> VantageResult<()> {
        let expires_at = Instant::now().checked_add(ttl);
        self.entries.write().await.insert(
            key.clone(),
            MemoryEntry {
                value: value.to_vec(),
                expires_at,
            },
        );
        self.stats.write();
        Ok(())
    }

    async fn delete(&self, key: &TeamScopedKey) -> VantageResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn invalidate_team(&self, team_id: TeamId) -> VantageResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| key.team_id() != team_id);
        Ok((before - entries.len()) as u64)
    }

    async fn ping(&self) -> VantageResult<()> {
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}
