//! Dual cache behaviour when one or both backends fail.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use vantage_core::{CachePreference, HealthStatus};
use vantage_storage::{DualCacheManager, QueryCacheManager, StoreCacheManager};
use vantage_test_utils::{assertions, fixtures, FlakyCacheStore, FlakyFreshnessIndex};

// Both halves share one freshness index, as in the Redis-backed dual layout.
type Half = StoreCacheManager<Arc<FlakyCacheStore>, Arc<FlakyFreshnessIndex>>;

struct Setup {
    primary_store: Arc<FlakyCacheStore>,
    secondary_store: Arc<FlakyCacheStore>,
    index: Arc<FlakyFreshnessIndex>,
    cache: DualCacheManager<Half, Half>,
}

fn setup(prefer: CachePreference) -> Setup {
    let primary_store = Arc::new(FlakyCacheStore::new("redis"));
    let secondary_store = Arc::new(FlakyCacheStore::new("object"));
    let index = Arc::new(FlakyFreshnessIndex::new());
    let ttl = Duration::from_secs(600);
    let target = fixtures::dashboard_target();

    let cache = DualCacheManager::new(
        StoreCacheManager::new(
            Arc::clone(&primary_store),
            Arc::clone(&index),
            target.clone(),
            ttl,
        ),
        StoreCacheManager::new(Arc::clone(&secondary_store), Arc::clone(&index), target, ttl),
        prefer,
    );

    Setup {
        primary_store,
        secondary_store,
        index,
        cache,
    }
}

#[tokio::test]
async fn set_then_get_with_both_backends_up() {
    let s = setup(CachePreference::Primary);
    s.cache
        .set_cache_data(&fixtures::response(), None)
        .await
        .expect("set");

    let hit = s.cache.get_cache_data().await.expect("get").expect("hit");
    assert_eq!(hit.response, fixtures::response());
    assert_eq!(s.primary_store.len().await, 1);
    assert_eq!(s.secondary_store.len().await, 1);
}

#[tokio::test]
async fn write_survives_primary_outage_and_reads_fall_back() {
    let s = setup(CachePreference::Primary);
    s.primary_store.set_down(true);

    s.cache
        .set_cache_data(&fixtures::response(), None)
        .await
        .expect("one backend is enough");

    let hit = s.cache.get_cache_data().await.expect("get never fails");
    assert_eq!(hit.map(|h| h.response), Some(fixtures::response()));
    assert!(s.primary_store.injected_failures() >= 2);
}

#[tokio::test]
async fn write_survives_secondary_outage() {
    let s = setup(CachePreference::Secondary);
    s.secondary_store.set_down(true);

    s.cache
        .set_cache_data(&fixtures::response(), None)
        .await
        .expect("one backend is enough");

    assert_eq!(s.primary_store.len().await, 1);
    assert!(s.cache.get_cache_data().await.expect("get").is_some());
}

#[tokio::test]
async fn write_fails_when_both_backends_are_down() {
    let s = setup(CachePreference::Primary);
    s.primary_store.set_down(true);
    s.secondary_store.set_down(true);

    let result = s.cache.set_cache_data(&fixtures::response(), None).await;
    assertions::assert_dual_write_failed(&result);

    let message = result.unwrap_err().to_string();
    assert!(message.contains("redis"));
    assert!(message.contains("object"));
}

#[tokio::test]
async fn reads_are_misses_when_both_backends_are_down() {
    let s = setup(CachePreference::Primary);
    s.cache
        .set_cache_data(&fixtures::response(), None)
        .await
        .expect("set");
    s.primary_store.set_fail_reads(true);
    s.secondary_store.set_fail_reads(true);

    assert_eq!(s.cache.get_cache_data().await.expect("get never fails"), None);
}

#[tokio::test]
async fn target_age_is_tracked_once() {
    let s = setup(CachePreference::Primary);
    let target_age = Utc::now() - ChronoDuration::minutes(1);

    s.cache
        .set_cache_data(&fixtures::response(), Some(target_age))
        .await
        .expect("set");

    let team = fixtures::TEAM;
    assert_eq!(s.index.member_count(team).await, 1);
    assert_eq!(s.index.target_age(team, "42:7").await, Some(target_age));
    assert_eq!(
        s.cache.get_stale_insights(None).await.expect("stale"),
        vec!["42:7".to_string()]
    );

    s.cache.remove_last_refresh().await.expect("remove");
    assert_eq!(s.index.member_count(team).await, 0);
}

#[tokio::test]
async fn invalidate_clears_both_halves() {
    let s = setup(CachePreference::Primary);
    s.cache
        .set_cache_data(&fixtures::response(), Some(Utc::now()))
        .await
        .expect("set");

    s.cache.invalidate().await.expect("invalidate");

    assert!(s.primary_store.is_empty().await);
    assert!(s.secondary_store.is_empty().await);
    assert_eq!(s.cache.get_cache_data().await.expect("get"), None);
}

#[tokio::test]
async fn write_survives_index_outage_when_one_store_is_up() {
    let s = setup(CachePreference::Primary);
    s.primary_store.set_down(true);
    s.index.set_down(true);

    s.cache
        .set_cache_data(&fixtures::response(), Some(Utc::now()))
        .await
        .expect("payload stored in the secondary");

    assert_eq!(s.secondary_store.len().await, 1);
    let hit = s.cache.get_cache_data().await.expect("get never fails");
    assert_eq!(hit.map(|h| h.response), Some(fixtures::response()));
    assert!(s.index.injected_failures() >= 1);
}

#[tokio::test]
async fn index_outage_does_not_fail_writes() {
    let s = setup(CachePreference::Primary);
    s.index.set_down(true);

    s.cache
        .set_cache_data(&fixtures::response(), Some(Utc::now()))
        .await
        .expect("both stores are up");

    assert_eq!(s.primary_store.len().await, 1);
    assert_eq!(s.secondary_store.len().await, 1);

    s.index.set_down(false);
    assert_eq!(s.index.member_count(fixtures::TEAM).await, 0);
}

#[tokio::test]
async fn write_fails_when_stores_and_index_are_down() {
    let s = setup(CachePreference::Primary);
    s.primary_store.set_down(true);
    s.secondary_store.set_down(true);
    s.index.set_down(true);

    let result = s.cache.set_cache_data(&fixtures::response(), None).await;
    assertions::assert_dual_write_failed(&result);
}

#[tokio::test]
async fn bookkeeping_fails_when_shared_index_is_down() {
    let s = setup(CachePreference::Primary);
    s.index.set_down(true);

    let result = s.cache.update_target_age(Some(Utc::now())).await;
    assertions::assert_dual_write_failed(&result);

    let result = s.cache.get_stale_insights(None).await;
    assertions::assert_dual_write_failed(&result);

    let result = s.cache.clean_up_stale_insights(Utc::now()).await;
    assertions::assert_dual_write_failed(&result);

    s.index.set_down(false);
    s.cache
        .update_target_age(Some(Utc::now() - ChronoDuration::minutes(1)))
        .await
        .expect("index is back");
    assert_eq!(
        s.cache.get_stale_insights(None).await.expect("stale"),
        vec!["42:7".to_string()]
    );
}

#[tokio::test]
async fn invalidate_survives_index_outage() {
    let s = setup(CachePreference::Primary);
    s.cache
        .set_cache_data(&fixtures::response(), Some(Utc::now()))
        .await
        .expect("set");
    s.index.set_down(true);

    s.cache.invalidate().await.expect("payloads deleted");
    assert!(s.primary_store.is_empty().await);
    assert!(s.secondary_store.is_empty().await);
}

#[tokio::test]
async fn single_store_write_survives_index_outage() {
    let store = Arc::new(FlakyCacheStore::new("lmdb"));
    let index = Arc::new(FlakyFreshnessIndex::new());
    index.set_down(true);
    let cache = StoreCacheManager::new(
        Arc::clone(&store),
        Arc::clone(&index),
        fixtures::dashboard_target(),
        Duration::from_secs(600),
    );

    cache
        .set_cache_data(&fixtures::response(), Some(Utc::now()))
        .await
        .expect("payload stored");
    assert_eq!(store.len().await, 1);
    assert!(cache.update_target_age(Some(Utc::now())).await.is_err());
}

#[tokio::test]
async fn health_reflects_backend_state() {
    let s = setup(CachePreference::Primary);
    assert_eq!(s.cache.health_check().await.status, HealthStatus::Healthy);

    s.secondary_store.set_down(true);
    assert_eq!(s.cache.health_check().await.status, HealthStatus::Degraded);
    s.cache.ping().await.expect("one half answers");

    s.primary_store.set_down(true);
    assert_eq!(s.cache.health_check().await.status, HealthStatus::Unhealthy);
    assert!(s.cache.ping().await.is_err());
}
