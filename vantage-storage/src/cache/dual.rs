//! Dual-backend query cache manager.
//!
//! Every write goes to both halves, preferred half first. Reads try the
//! preferred half and fall back to the other on a miss or an error.
//! Losing one half is logged as a warning; losing both on a write is an
//! error returned to the caller.
//!
//! Writes and invalidations decide success on the payload stores only. The
//! freshness record is then updated once, through the same preferred-first
//! path as the other bookkeeping calls, and a failure there is a warning.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Instant;
use vantage_core::{
    CachePreference, CacheTarget, CachedResponse, HealthCheck, HealthReport, HealthStatus,
    StorageError, Timestamp, VantageError, VantageResult,
};

use super::manager::{bookkeeping_failed, QueryCacheManager};

/// [`QueryCacheManager`] composed of a primary and a secondary manager.
#[derive(Debug)]
pub struct DualCacheManager<P, S> {
    primary: P,
    secondary: S,
    prefer: CachePreference,
    name: String,
}

impl<P: QueryCacheManager, S: QueryCacheManager> DualCacheManager<P, S> {
    pub fn new(primary: P, secondary: S, prefer: CachePreference) -> Self {
        let name = format!(
            "dual({}+{})",
            primary.backend_name(),
            secondary.backend_name()
        );
        Self {
            primary,
            secondary,
            prefer,
            name,
        }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn secondary(&self) -> &S {
        &self.secondary
    }

    pub fn preference(&self) -> CachePreference {
        self.prefer
    }

    /// The preferred half, then the other one.
    fn ordered(&self) -> (&dyn QueryCacheManager, &dyn QueryCacheManager) {
        match self.prefer {
            CachePreference::Primary => (&self.primary, &self.secondary),
            CachePreference::Secondary => (&self.secondary, &self.primary),
        }
    }

    /// Split errors from `(preferred, fallback)` order back into
    /// `(primary, secondary)` order.
    fn by_role(&self, preferred: VantageError, fallback: VantageError) -> (String, String) {
        match self.prefer {
            CachePreference::Primary => (preferred.to_string(), fallback.to_string()),
            CachePreference::Secondary => (fallback.to_string(), preferred.to_string()),
        }
    }

    fn partial_failure(&self, operation: &'static str, failed: &dyn QueryCacheManager, e: &VantageError) {
        tracing::warn!(
            backend = failed.backend_name(),
            operation,
            cache_key = %self.primary.target().cache_key,
            team_id = %self.primary.target().team_id,
            error = %e,
            "Cache backend failed, continuing with the other backend"
        );
    }

    fn total_failure(
        &self,
        operation: &'static str,
        preferred: VantageError,
        fallback: VantageError,
    ) -> VantageError {
        let (primary, secondary) = self.by_role(preferred, fallback);
        tracing::error!(
            backend = %self.name,
            operation,
            cache_key = %self.primary.target().cache_key,
            team_id = %self.primary.target().team_id,
            primary_error = %primary,
            secondary_error = %secondary,
            "Both cache backends failed"
        );
        StorageError::DualWriteFailed { primary, secondary }.into()
    }

    /// Fold the outcomes of a payload operation run on both halves.
    fn settle(
        &self,
        operation: &'static str,
        (preferred, first): (&dyn QueryCacheManager, VantageResult<()>),
        (fallback, second): (&dyn QueryCacheManager, VantageResult<()>),
    ) -> VantageResult<()> {
        match (first, second) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), Ok(())) => {
                self.partial_failure(operation, preferred, &e);
                Ok(())
            }
            (Ok(()), Err(e)) => {
                self.partial_failure(operation, fallback, &e);
                Ok(())
            }
            (Err(p), Err(f)) => Err(self.total_failure(operation, p, f)),
        }
    }

    /// Ping both halves.
    ///
    /// Healthy when both answer, degraded when one does, unhealthy when
    /// neither does.
    pub async fn health_check(&self) -> HealthReport {
        let primary = probe(&self.primary).await;
        let secondary = probe(&self.secondary).await;
        let status = match (primary.is_healthy(), secondary.is_healthy()) {
            (true, true) => HealthStatus::Healthy,
            (false, false) => HealthStatus::Unhealthy,
            _ => HealthStatus::Degraded,
        };
        HealthReport {
            status,
            checks: vec![primary, secondary],
        }
    }
}

pub(crate) async fn probe(manager: &dyn QueryCacheManager) -> HealthCheck {
    let started = Instant::now();
    let result = manager.ping().await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(()) => HealthCheck::healthy(manager.backend_name()).with_response_time(elapsed_ms),
        Err(e) => {
            HealthCheck::unhealthy(manager.backend_name(), e.to_string()).with_response_time(elapsed_ms)
        }
    }
}

#[async_trait]
impl<P: QueryCacheManager, S: QueryCacheManager> QueryCacheManager for DualCacheManager<P, S> {
    fn backend_name(&self) -> &str {
        &self.name
    }

    fn target(&self) -> &CacheTarget {
        self.primary.target()
    }

    /// Never fails: backend errors are logged and read as misses.
    async fn get_cache_data(&self) -> VantageResult<Option<CachedResponse>> {
        let (preferred, fallback) = self.ordered();
        match preferred.get_cache_data().await {
            Ok(Some(hit)) => return Ok(Some(hit)),
            Ok(None) => {
                tracing::debug!(
                    backend = preferred.backend_name(),
                    cache_key = %self.target().cache_key,
                    "Preferred cache backend missed, trying fallback"
                );
            }
            Err(e) => self.partial_failure("get_cache_data", preferred, &e),
        }
        match fallback.get_cache_data().await {
            Ok(result) => Ok(result),
            Err(e) => {
                self.partial_failure("get_cache_data", fallback, &e);
                Ok(None)
            }
        }
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
        let (preferred, fallback) = self.ordered();
        let first = preferred.write_cache_data(response, target_age).await;
        let second = fallback.write_cache_data(response, target_age).await;
        self.settle("set_cache_data", (preferred, first), (fallback, second))
    }

    async fn delete_cache_data(&self) -> VantageResult<()> {
        let (preferred, fallback) = self.ordered();
        let first = preferred.delete_cache_data().await;
        let second = fallback.delete_cache_data().await;
        self.settle("invalidate", (preferred, first), (fallback, second))
    }

    async fn update_target_age(&self, target_age: Option<Timestamp>) -> VantageResult<()> {
        let (preferred, fallback) = self.ordered();
        match preferred.update_target_age(target_age).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.partial_failure("update_target_age", preferred, &e);
                fallback
                    .update_target_age(target_age)
                    .await
                    .map_err(|f| self.total_failure("update_target_age", e, f))
            }
        }
    }

    async fn remove_last_refresh(&self) -> VantageResult<()> {
        let (preferred, fallback) = self.ordered();
        match preferred.remove_last_refresh().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.partial_failure("remove_last_refresh", preferred, &e);
                fallback
                    .remove_last_refresh()
                    .await
                    .map_err(|f| self.total_failure("remove_last_refresh", e, f))
            }
        }
    }

    async fn get_stale_insights(&self, limit: Option<usize>) -> VantageResult<Vec<String>> {
        let (preferred, fallback) = self.ordered();
        match preferred.get_stale_insights(limit).await {
            Ok(members) => Ok(members),
            Err(e) => {
                self.partial_failure("get_stale_insights", preferred, &e);
                fallback
                    .get_stale_insights(limit)
                    .await
                    .map_err(|f| self.total_failure("get_stale_insights", e, f))
            }
        }
    }

    async fn clean_up_stale_insights(&self, threshold: Timestamp) -> VantageResult<u64> {
        let (preferred, fallback) = self.ordered();
        match preferred.clean_up_stale_insights(threshold).await {
            Ok(removed) => Ok(removed),
            Err(e) => {
                self.partial_failure("clean_up_stale_insights", preferred, &e);
                fallback
                    .clean_up_stale_insights(threshold)
                    .await
                    .map_err(|f| self.total_failure("clean_up_stale_insights", e, f))
            }
        }
    }

    /// Both halves hold a copy, so both are invalidated.
    async fn invalidate(&self) -> VantageResult<()> {
        self.delete_cache_data().await?;
        if let Err(e) = self.remove_last_refresh().await {
            bookkeeping_failed(self, "invalidate", &e);
        }
        Ok(())
    }

    async fn ping(&self) -> VantageResult<()> {
        let (preferred, fallback) = self.ordered();
        match preferred.ping().await {
            Ok(()) => Ok(()),
            Err(e) => fallback.ping().await.map_err(|_| e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::freshness::InMemoryFreshnessIndex;
    use crate::cache::manager::StoreCacheManager;
    use crate::cache::memory_store::InMemoryCacheStore;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use vantage_core::{CacheKey, InsightId, TeamId};

    type MemoryManager = StoreCacheManager<Arc<InMemoryCacheStore>, Arc<InMemoryFreshnessIndex>>;

    fn target() -> CacheTarget {
        CacheTarget::new(TeamId::from_raw(1), CacheKey::new("cache_dual"))
            .with_insight(InsightId::from_raw(4))
    }

    fn manager(store: &Arc<InMemoryCacheStore>, index: &Arc<InMemoryFreshnessIndex>) -> MemoryManager {
        StoreCacheManager::new(
            Arc::clone(store),
            Arc::clone(index),
            target(),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_write_lands_in_both_halves() {
        let (a, b) = (Arc::new(InMemoryCacheStore::new()), Arc::new(InMemoryCacheStore::new()));
        let index = Arc::new(InMemoryFreshnessIndex::new());
        let dual = DualCacheManager::new(manager(&a, &index), manager(&b, &index), CachePreference::Primary);

        dual.set_cache_data(&json!({"n": 1}), None).await.expect("set");
        assert_eq!(a.len().await, 1);
        assert_eq!(b.len().await, 1);
        assert_eq!(dual.backend_name(), "dual(memory+memory)");
    }

    #[tokio::test]
    async fn test_read_falls_back_on_preferred_miss() {
        let (a, b) = (Arc::new(InMemoryCacheStore::new()), Arc::new(InMemoryCacheStore::new()));
        let index = Arc::new(InMemoryFreshnessIndex::new());
        // Populate only the secondary.
        manager(&b, &index)
            .set_cache_data(&json!("only-secondary"), None)
            .await
            .expect("set");

        let dual = DualCacheManager::new(manager(&a, &index), manager(&b, &index), CachePreference::Primary);
        let hit = dual.get_cache_data().await.expect("get").expect("hit");
        assert_eq!(hit.response, json!("only-secondary"));
    }

    #[tokio::test]
    async fn test_preference_controls_read_order() {
        let (a, b) = (Arc::new(InMemoryCacheStore::new()), Arc::new(InMemoryCacheStore::new()));
        let index = Arc::new(InMemoryFreshnessIndex::new());
        manager(&a, &index).set_cache_data(&json!("a"), None).await.expect("set");
        manager(&b, &index).set_cache_data(&json!("b"), None).await.expect("set");

        let dual = DualCacheManager::new(manager(&a, &index), manager(&b, &index), CachePreference::Secondary);
        let hit = dual.get_cache_data().await.expect("get").expect("hit");
        assert_eq!(hit.response, json!("b"));
    }

    #[tokio::test]
    async fn test_bookkeeping_goes_to_preferred() {
        let (a, b) = (Arc::new(InMemoryCacheStore::new()), Arc::new(InMemoryCacheStore::new()));
        let (ia, ib) = (Arc::new(InMemoryFreshnessIndex::new()), Arc::new(InMemoryFreshnessIndex::new()));
        let dual = DualCacheManager::new(manager(&a, &ia), manager(&b, &ib), CachePreference::Secondary);

        dual.update_target_age(Some(Utc::now())).await.expect("update");
        assert_eq!(ia.member_count(TeamId::from_raw(1)).await, 0);
        assert_eq!(ib.member_count(TeamId::from_raw(1)).await, 1);
    }

    #[tokio::test]
    async fn test_health_both_up() {
        let store = Arc::new(InMemoryCacheStore::new());
        let index = Arc::new(InMemoryFreshnessIndex::new());
        let dual = DualCacheManager::new(manager(&store, &index), manager(&store, &index), CachePreference::Primary);
        let report = dual.health_check().await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.checks.len(), 2);
    }
}
