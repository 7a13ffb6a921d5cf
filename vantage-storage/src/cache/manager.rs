//! Per-backend query cache manager.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::time::Duration;
use vantage_core::{
    CacheEnvelope, CacheTarget, CachedResponse, StorageError, Timestamp, VantageError,
    VantageResult,
};

use super::freshness::FreshnessIndex;
use super::team_key::TeamScopedKey;
use super::traits::CacheStore;

/// Cache operations for one query result.
///
/// A manager is bound to a single [`CacheTarget`]. Bookkeeping methods
/// (`update_target_age`, `remove_last_refresh`) are no-ops when the target
/// has no insight attached.
///
/// `set_cache_data` and `invalidate` succeed or fail on the payload alone. A
/// bookkeeping failure after the payload was written or deleted is logged as
/// a warning.
#[async_trait]
pub trait QueryCacheManager: Send + Sync {
    /// Backend identity used in logs.
    fn backend_name(&self) -> &str;

    fn target(&self) -> &CacheTarget;

    /// Read the cached result; `None` on a miss or an expired entry.
    async fn get_cache_data(&self) -> VantageResult<Option<CachedResponse>>;

    /// Store a result and record its target age.
    async fn set_cache_data(&self, response: &Value, target_age: Option<Timestamp>)
        -> VantageResult<()>;

    /// Store a result without touching the freshness index.
    async fn write_cache_data(
        &self,
        response: &Value,
        target_age: Option<Timestamp>,
    ) -> VantageResult<()>;

    /// Delete the cached result without touching the freshness index.
    async fn delete_cache_data(&self) -> VantageResult<()>;

    /// Record when the insight should next be refreshed. `None` stops
    /// tracking it.
    async fn update_target_age(&self, target_age: Option<Timestamp>) -> VantageResult<()>;

    /// Stop tracking the insight's freshness.
    async fn remove_last_refresh(&self) -> VantageResult<()>;

    /// Stale insight members of the target's team, oldest first.
    async fn get_stale_insights(&self, limit: Option<usize>) -> VantageResult<Vec<String>>;

    /// Drop freshness records of the target's team at or before `threshold`.
    async fn clean_up_stale_insights(&self, threshold: Timestamp) -> VantageResult<u64>;

    /// Delete the cached result and its freshness record.
    async fn invalidate(&self) -> VantageResult<()>;

    /// Probe the underlying store.
    async fn ping(&self) -> VantageResult<()>;
}

/// [`QueryCacheManager`] over one [`CacheStore`] and a [`FreshnessIndex`].
#[derive(Debug)]
pub struct StoreCacheManager<S, I> {
    store: S,
    index: I,
    target: CacheTarget,
    key: TeamScopedKey,
    ttl: Duration,
}

impl<S: CacheStore, I: FreshnessIndex> StoreCacheManager<S, I> {
    pub fn new(store: S, index: I, target: CacheTarget, ttl: Duration) -> Self {
        let key = TeamScopedKey::for_target(&target);
        Self {
            store,
            index,
            target,
            key,
            ttl,
        }
    }
}

#[async_trait]
impl<S: CacheStore, I: FreshnessIndex> QueryCacheManager for StoreCacheManager<S, I> {
    fn backend_name(&self) -> &str {
        self.store.name()
    }

    fn target(&self) -> &CacheTarget {
        &self.target
    }

    async fn get_cache_data(&self) -> VantageResult<Option<CachedResponse>> {
        let Some(bytes) = self.store.read(&self.key).await? else {
            return Ok(None);
        };
        let envelope: CacheEnvelope =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::Deserialization {
                reason: format!("{}: {}", self.target.cache_key, e),
            })?;
        if envelope.is_expired(Utc::now()) {
            tracing::debug!(
                backend = self.store.name(),
                cache_key = %self.target.cache_key,
                "Cached result expired"
            );
            return Ok(None);
        }
        Ok(Some(envelope.into_response()))
    }

    async fn set_cache_data(
        &self,
        response: &Value,
        target_age: Option<Timestamp>,
    ) -> VantageResult<()> {
        self.write_cache_data(response, target_age).await?;
        if let Err(e) = self.update_target_age(target_age).await {
            bookkeeping_failed(self, "set_cache_data", &e);
        }
        Ok(())
    }

    async fn write_cache_data(
        &self,
        response: &Value,
        target_age: Option<Timestamp>,
    ) -> VantageResult<()> {
        let envelope = CacheEnvelope::new(response.clone(), target_age, self.ttl);
        let bytes = serde_json::to_vec(&envelope).map_err(|e| StorageError::Serialization {
            reason: e.to_string(),
        })?;
        self.store.write(&self.key, &bytes, self.ttl).await
    }

    async fn delete_cache_data(&self) -> VantageResult<()> {
        self.store.delete(&self.key).await?;
        Ok(())
    }

    async fn update_target_age(&self, target_age: Option<Timestamp>) -> VantageResult<()> {
        let Some(member) = self.target.freshness_member() else {
            return Ok(());
        };
        match target_age {
            Some(target_age) => {
                self.index
                    .upsert(self.target.team_id, &member, target_age)
                    .await
            }
            None => self.index.remove(self.target.team_id, &member).await,
        }
    }

    async fn remove_last_refresh(&self) -> VantageResult<()> {
        match self.target.freshness_member() {
            Some(member) => self.index.remove(self.target.team_id, &member).await,
            None => Ok(()),
        }
    }

    async fn get_stale_insights(&self, limit: Option<usize>) -> VantageResult<Vec<String>> {
        self.index
            .stale_members(self.target.team_id, Utc::now(), limit)
            .await
    }

    async fn clean_up_stale_insights(&self, threshold: Timestamp) -> VantageResult<u64> {
        self.index
            .remove_older_than(self.target.team_id, threshold)
            .await
    }

    async fn invalidate(&self) -> VantageResult<()> {
        self.delete_cache_data().await?;
        if let Err(e) = self.remove_last_refresh().await {
            bookkeeping_failed(self, "invalidate", &e);
        }
        Ok(())
    }

    async fn ping(&self) -> VantageResult<()> {
        self.store.ping().await
    }
}

/// Log a freshness index failure that follows a successful payload operation.
pub(crate) fn bookkeeping_failed(
    manager: &dyn QueryCacheManager,
    operation: &'static str,
    e: &VantageError,
) {
    tracing::warn!(
        backend = manager.backend_name(),
        operation,
        cache_key = %manager.target().cache_key,
        team_id = %manager.target().team_id,
        error = %e,
        "Freshness bookkeeping failed, cached payload kept"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::freshness::InMemoryFreshnessIndex;
    use crate::cache::memory_store::InMemoryCacheStore;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use std::sync::Arc;
    use vantage_core::{CacheKey, DashboardId, InsightId, TeamId};

    const TTL: Duration = Duration::from_secs(3600);

    struct Fixture {
        store: Arc<InMemoryCacheStore>,
        index: Arc<InMemoryFreshnessIndex>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Arc::new(InMemoryCacheStore::new()),
                index: Arc::new(InMemoryFreshnessIndex::new()),
            }
        }

        fn manager(
            &self,
            target: CacheTarget,
        ) -> StoreCacheManager<Arc<InMemoryCacheStore>, Arc<InMemoryFreshnessIndex>> {
            StoreCacheManager::new(Arc::clone(&self.store), Arc::clone(&self.index), target, TTL)
        }
    }

    fn insight_target() -> CacheTarget {
        CacheTarget::new(TeamId::from_raw(1), CacheKey::new("cache_abc"))
            .with_insight(InsightId::from_raw(5))
            .with_dashboard(DashboardId::from_raw(9))
    }

    #[tokio::test]
    async fn test_set_then_get_roundtrip() {
        let fixture = Fixture::new();
        let manager = fixture.manager(insight_target());
        let target_age = Utc::now() + ChronoDuration::minutes(15);

        manager
            .set_cache_data(&json!({"result": [1, 2, 3]}), Some(target_age))
            .await
            .expect("set");

        let cached = manager
            .get_cache_data()
            .await
            .expect("get")
            .expect("hit");
        assert_eq!(cached.response, json!({"result": [1, 2, 3]}));
        assert_eq!(cached.target_age, Some(target_age));
        assert_eq!(manager.backend_name(), "memory");
        assert_eq!(
            fixture.index.target_age(TeamId::from_raw(1), "5:9").await,
            Some(target_age)
        );
    }

    #[tokio::test]
    async fn test_set_without_target_age_clears_tracking() {
        let fixture = Fixture::new();
        let manager = fixture.manager(insight_target());
        manager
            .update_target_age(Some(Utc::now()))
            .await
            .expect("update");
        manager
            .set_cache_data(&json!(1), None)
            .await
            .expect("set");
        assert_eq!(fixture.index.member_count(TeamId::from_raw(1)).await, 0);
    }

    #[tokio::test]
    async fn test_bookkeeping_is_noop_without_insight() {
        let fixture = Fixture::new();
        let manager = fixture.manager(CacheTarget::new(
            TeamId::from_raw(1),
            CacheKey::new("cache_adhoc"),
        ));
        manager
            .set_cache_data(&json!(1), Some(Utc::now()))
            .await
            .expect("set");
        manager.remove_last_refresh().await.expect("remove");
        assert_eq!(fixture.index.member_count(TeamId::from_raw(1)).await, 0);
        assert!(manager.get_cache_data().await.expect("get").is_some());
    }

    #[tokio::test]
    async fn test_stale_insights_and_cleanup() {
        let fixture = Fixture::new();
        let now = Utc::now();
        for (insight, age) in [(1, 3), (2, 2), (3, -1)] {
            fixture
                .manager(
                    CacheTarget::new(TeamId::from_raw(1), CacheKey::new(format!("k{}", insight)))
                        .with_insight(InsightId::from_raw(insight)),
                )
                .update_target_age(Some(now - ChronoDuration::hours(age)))
                .await
                .expect("update");
        }

        let manager = fixture.manager(insight_target());
        assert_eq!(
            manager.get_stale_insights(None).await.expect("stale"),
            vec!["1:", "2:"]
        );
        assert_eq!(
            manager.get_stale_insights(Some(1)).await.expect("stale"),
            vec!["1:"]
        );

        let removed = manager
            .clean_up_stale_insights(now - ChronoDuration::minutes(150))
            .await
            .expect("cleanup");
        assert_eq!(removed, 1);
        assert_eq!(
            manager.get_stale_insights(None).await.expect("stale"),
            vec!["2:"]
        );
    }

    #[tokio::test]
    async fn test_invalidate_removes_blob_and_tracking() {
        let fixture = Fixture::new();
        let manager = fixture.manager(insight_target());
        manager
            .set_cache_data(&json!(1), Some(Utc::now()))
            .await
            .expect("set");

        manager.invalidate().await.expect("invalidate");
        assert!(manager.get_cache_data().await.expect("get").is_none());
        assert_eq!(fixture.index.member_count(TeamId::from_raw(1)).await, 0);
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_an_error() {
        let fixture = Fixture::new();
        let target = insight_target();
        fixture
            .store
            .write(&TeamScopedKey::for_target(&target), b"not json", TTL)
            .await
            .expect("write");

        let err = fixture
            .manager(target)
            .get_cache_data()
            .await
            .expect_err("corrupt blob");
        assert!(matches!(
            err,
            VantageError::Storage(StorageError::Deserialization { .. })
        ));
    }

    #[tokio::test]
    async fn test_expired_envelope_reads_as_miss() {
        let fixture = Fixture::new();
        let target = insight_target();
        let mut envelope = CacheEnvelope::new(json!(1), None, TTL);
        envelope.expires_at = Utc::now() - ChronoDuration::seconds(1);
        fixture
            .store
            .write(
                &TeamScopedKey::for_target(&target),
                &serde_json::to_vec(&envelope).expect("serialize"),
                TTL,
            )
            .await
            .expect("write");

        assert!(fixture
            .manager(target)
            .get_cache_data()
            .await
            .expect("get")
            .is_none());
    }
}
