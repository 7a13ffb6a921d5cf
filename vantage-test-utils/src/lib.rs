//! Vantage Test Utilities
//!
//! Shared test infrastructure for the Vantage workspace:
//! - Failure-injecting cache store and freshness index for dual-backend tests
//! - Proptest generators for identifiers, queries and flag graphs
//! - Fixtures for common flag layouts
//! - Assertions for Vantage-specific errors

pub use vantage_core::{
    CacheKey, CacheTarget, DashboardId, FeatureFlag, FlagId, FlagSummary, IdType, InsightId,
    PropertyFilter, StorageError, TeamId, Timestamp, ValidationError, VantageError,
    VantageResult,
};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use vantage_storage::{
    CacheStats, CacheStore, FreshnessIndex, InMemoryCacheStore, InMemoryFreshnessIndex,
    TeamScopedKey,
};

// ============================================================================
// MOCK STORES
// ============================================================================

/// In-memory cache store whose reads and writes can be made to fail.
///
/// Failures surface as [`StorageError::Backend`] tagged with the store's
/// name, the same shape real backends produce on transport errors.
#[derive(Debug)]
pub struct FlakyCacheStore {
    name: &'static str,
    inner: InMemoryCacheStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    injected: AtomicU64,
}

impl FlakyCacheStore {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: InMemoryCacheStore::new(),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            injected: AtomicU64::new(0),
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail (or stop failing) every operation.
    pub fn set_down(&self, down: bool) {
        self.set_fail_reads(down);
        self.set_fail_writes(down);
    }

    /// Number of failures injected so far.
    pub fn injected_failures(&self) -> u64 {
        self.injected.load(Ordering::SeqCst)
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        self.inner.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.is_empty().await
    }

    fn check(&self, flag: &AtomicBool, operation: &str) -> VantageResult<()> {
        if flag.load(Ordering::SeqCst) {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::backend(
                self.name,
                format!("injected {} failure", operation),
            )
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FlakyCacheStore {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn read(&self, key: &TeamScopedKey) -> VantageResult<Option<Vec<u8>>> {
        self.check(&self.fail_reads, "read")?;
        self.inner.read(key).await
    }

    async fn write(&self, key: &TeamScopedKey, value: &[u8], ttl: Duration) -> VantageResult<()> {
        self.check(&self.fail_writes, "write")?;
        self.inner.write(key, value, ttl).await
    }

    async fn delete(&self, key: &TeamScopedKey) -> VantageResult<bool> {
        self.check(&self.fail_writes, "delete")?;
        self.inner.delete(key).await
    }

    async fn invalidate_team(&self, team_id: TeamId) -> VantageResult<u64> {
        self.check(&self.fail_writes, "invalidate")?;
        self.inner.invalidate_team(team_id).await
    }

    async fn ping(&self) -> VantageResult<()> {
        self.check(&self.fail_reads, "ping")?;
        self.inner.ping().await
    }

    fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}

/// In-memory freshness index that can be made to fail every call.
#[derive(Debug)]
pub struct FlakyFreshnessIndex {
    inner: InMemoryFreshnessIndex,
    down: AtomicBool,
    injected: AtomicU64,
}

impl Default for FlakyFreshnessIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl FlakyFreshnessIndex {
    pub fn new() -> Self {
        Self {
            inner: InMemoryFreshnessIndex::new(),
            down: AtomicBool::new(false),
            injected: AtomicU64::new(0),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn injected_failures(&self) -> u64 {
        self.injected.load(Ordering::SeqCst)
    }

    pub async fn member_count(&self, team_id: TeamId) -> usize {
        self.inner.member_count(team_id).await
    }

    pub async fn target_age(&self, team_id: TeamId, member: &str) -> Option<Timestamp> {
        self.inner.target_age(team_id, member).await
    }

    fn check(&self, operation: &str) -> VantageResult<()> {
        if self.down.load(Ordering::SeqCst) {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::backend(
                "freshness",
                format!("injected {} failure", operation),
            )
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl FreshnessIndex for FlakyFreshnessIndex {
    fn name(&self) -> &'static str {
        "freshness"
    }

    async fn upsert(
        &self,
        team_id: TeamId,
        member: &str,
        target_age: Timestamp,
    ) -> VantageResult<()> {
        self.check("upsert")?;
        self.inner.upsert(team_id, member, target_age).await
    }

    async fn remove(&self, team_id: TeamId, member: &str) -> VantageResult<()> {
        self.check("remove")?;
        self.inner.remove(team_id, member).await
    }

    async fn stale_members(
        &self,
        team_id: TeamId,
        now: Timestamp,
        limit: Option<usize>,
    ) -> VantageResult<Vec<String>> {
        self.check("stale_members")?;
        self.inner.stale_members(team_id, now, limit).await
    }

    async fn remove_older_than(&self, team_id: TeamId, threshold: Timestamp) -> VantageResult<u64> {
        self.check("remove_older_than")?;
        self.inner.remove_older_than(team_id, threshold).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Vantage types.

    use super::*;
    use proptest::prelude::*;
    use serde_json::{Map, Value};

    /// Positive database keys below `max` for any identifier type.
    pub fn arb_id<T: IdType + std::fmt::Debug>(max: i64) -> impl Strategy<Value = T> {
        (1i64..max).prop_map(T::new)
    }

    pub fn arb_team_id() -> impl Strategy<Value = TeamId> {
        arb_id(10_000)
    }

    pub fn arb_insight_id() -> impl Strategy<Value = InsightId> {
        arb_id(1_000_000)
    }

    pub fn arb_dashboard_id() -> impl Strategy<Value = DashboardId> {
        arb_id(1_000_000)
    }

    /// Timestamps between 2020 and 2030, whole seconds.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
        })
    }

    pub fn arb_flag_key() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,15}"
    }

    /// Small nested JSON objects shaped like query definitions.
    pub fn arb_query() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(Value::from),
            "[a-zA-Z$_]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{1,8}", inner, 0..5)
                    .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
            ]
        })
    }

    /// A team's flags forming a DAG.
    ///
    /// Flag `i` has ID `i + 1` and key `flag-{i}`, and may only depend on
    /// flags with a lower index, referenced by ID. Active state is random.
    pub fn arb_flag_dag(max_flags: usize) -> impl Strategy<Value = Vec<FeatureFlag>> {
        (1..=max_flags.max(1))
            .prop_flat_map(|n| {
                (
                    prop::collection::vec(prop::collection::vec(any::<prop::sample::Index>(), 0..3), n),
                    prop::collection::vec(any::<bool>(), n),
                )
            })
            .prop_map(|(deps, active)| {
                let team = TeamId::from_raw(1);
                deps.into_iter()
                    .zip(active)
                    .enumerate()
                    .map(|(i, (picks, active))| {
                        let mut flag = FeatureFlag::new(
                            FlagId::from_raw(i as i64 + 1),
                            team,
                            format!("flag-{}", i),
                        )
                        .with_active(active);
                        if i > 0 {
                            for pick in picks {
                                let dep = pick.index(i) as i64 + 1;
                                flag = flag.with_dependency(dep.to_string());
                            }
                        }
                        flag
                    })
                    .collect()
            })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built flags and cache targets.

    use super::*;
    use serde_json::{json, Value};

    pub const TEAM: TeamId = TeamId::from_raw(1);
    pub const OTHER_TEAM: TeamId = TeamId::from_raw(2);

    /// Active flag with no conditions in [`TEAM`].
    pub fn flag(id: i64, key: &str) -> FeatureFlag {
        FeatureFlag::new(FlagId::from_raw(id), TEAM, key)
    }

    /// Flag in [`TEAM`] depending on each of `deps` by ID.
    pub fn flag_depending_on(id: i64, key: &str, deps: &[i64]) -> FeatureFlag {
        deps.iter()
            .fold(flag(id, key), |flag, dep| flag.with_dependency(dep.to_string()))
    }

    /// `flag-a` (1) <- `flag-b` (2) <- `flag-c` (3).
    pub fn chain_flags() -> Vec<FeatureFlag> {
        vec![
            flag(1, "flag-a"),
            flag_depending_on(2, "flag-b", &[1]),
            flag_depending_on(3, "flag-c", &[2]),
        ]
    }

    /// `cycle-x` (10) -> `cycle-y` (11) -> `cycle-x`, plus `on-cycle` (12)
    /// depending on `cycle-x` and the unrelated `standalone` (13).
    pub fn cycle_flags() -> Vec<FeatureFlag> {
        vec![
            flag_depending_on(10, "cycle-x", &[11]),
            flag_depending_on(11, "cycle-y", &[10]),
            flag_depending_on(12, "on-cycle", &[10]),
            flag(13, "standalone"),
        ]
    }

    /// `count` active flags in [`TEAM`] all depending on `base_id`.
    pub fn dependents_of(base_id: i64, count: usize) -> Vec<FeatureFlag> {
        (0..count)
            .map(|i| {
                let id = base_id + 100 + i as i64;
                flag_depending_on(id, &format!("dependent-{}", i), &[base_id])
            })
            .collect()
    }

    pub fn query() -> Value {
        json!({
            "kind": "TrendsQuery",
            "series": [{"event": "$pageview", "math": "total"}],
            "dateRange": {"date_from": "-7d"}
        })
    }

    pub fn response() -> Value {
        json!({
            "results": [{"label": "$pageview", "data": [3, 5, 8]}],
            "is_cached": false
        })
    }

    /// Target for insight 42 on dashboard 7 in [`TEAM`].
    pub fn dashboard_target() -> CacheTarget {
        CacheTarget::new(TEAM, CacheKey::for_query(TEAM, &query()))
            .with_insight(InsightId::from_raw(42))
            .with_dashboard(DashboardId::from_raw(7))
    }

    /// Target with no insight attached.
    pub fn adhoc_target() -> CacheTarget {
        CacheTarget::new(TEAM, CacheKey::for_query(TEAM, &json!({"kind": "HogQLQuery"})))
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Vantage-specific errors and payloads.

    use super::*;

    /// Assert that a result is an `ActiveDependents` error naming exactly `keys`.
    pub fn assert_active_dependents<T: std::fmt::Debug>(result: &VantageResult<T>, keys: &[&str]) {
        match result {
            Err(VantageError::Validation(ValidationError::ActiveDependents { dependents, .. })) => {
                let found: Vec<&str> = dependents.iter().map(|d| d.key.as_str()).collect();
                assert_eq!(found, keys, "Wrong dependents listed");
            }
            other => panic!("Expected ActiveDependents, got {:?}", other),
        }
    }

    /// Assert that a result is a `DisabledDependencies` error naming exactly `keys`.
    pub fn assert_disabled_dependencies<T: std::fmt::Debug>(
        result: &VantageResult<T>,
        keys: &[&str],
    ) {
        match result {
            Err(VantageError::Validation(ValidationError::DisabledDependencies {
                dependencies,
                ..
            })) => {
                let found: Vec<&str> = dependencies.iter().map(|d| d.key.as_str()).collect();
                assert_eq!(found, keys, "Wrong disabled dependencies listed");
            }
            other => panic!("Expected DisabledDependencies, got {:?}", other),
        }
    }

    pub fn assert_circular<T: std::fmt::Debug>(result: &VantageResult<T>) {
        assert!(
            matches!(
                result,
                Err(VantageError::Validation(ValidationError::CircularDependency { .. }))
            ),
            "Expected CircularDependency, got {:?}",
            result
        );
    }

    pub fn assert_missing_dependency<T: std::fmt::Debug>(result: &VantageResult<T>) {
        assert!(
            matches!(
                result,
                Err(VantageError::Validation(ValidationError::MissingDependency { .. }))
            ),
            "Expected MissingDependency, got {:?}",
            result
        );
    }

    pub fn assert_dual_write_failed<T: std::fmt::Debug>(result: &VantageResult<T>) {
        assert!(
            matches!(
                result,
                Err(VantageError::Storage(StorageError::DualWriteFailed { .. }))
            ),
            "Expected DualWriteFailed, got {:?}",
            result
        );
    }

    /// Assert every key in `chain` appears after all keys its flag depends
    /// on, looking dependencies up by ID in `flags`.
    pub fn assert_topological(chain: &[String], flags: &[FeatureFlag]) {
        for (position, key) in chain.iter().enumerate() {
            let Some(flag) = flags.iter().find(|f| &f.key == key) else {
                panic!("Chain entry {} is not a known flag", key);
            };
            for reference in flag.dependency_references() {
                let dep_key = flags
                    .iter()
                    .find(|f| f.id.to_string() == reference || f.key == reference)
                    .map(|f| f.key.as_str());
                if let Some(dep_key) = dep_key {
                    let dep_position = chain.iter().position(|k| k == dep_key);
                    assert!(
                        dep_position.is_some_and(|p| p < position),
                        "{} appears before its dependency {} in {:?}",
                        key,
                        dep_key,
                        chain
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_flaky_store_injects_failures() {
        let store = FlakyCacheStore::new("flaky");
        let key = TeamScopedKey::for_target(&fixtures::dashboard_target());

        store
            .write(&key, b"payload", Duration::from_secs(60))
            .await
            .expect("write");
        store.set_fail_reads(true);

        let err = store.read(&key).await.unwrap_err();
        assert!(err.to_string().contains("flaky"));
        assert_eq!(store.injected_failures(), 1);

        store.set_down(false);
        assert_eq!(store.read(&key).await.expect("read"), Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn test_flaky_index_injects_failures() {
        let index = FlakyFreshnessIndex::new();
        let now = chrono::Utc::now();
        index.upsert(fixtures::TEAM, "42:7", now).await.expect("upsert");

        index.set_down(true);
        assert!(index.stale_members(fixtures::TEAM, now, None).await.is_err());
        assert!(index.remove(fixtures::TEAM, "42:7").await.is_err());
        assert_eq!(index.injected_failures(), 2);

        index.set_down(false);
        assert_eq!(index.target_age(fixtures::TEAM, "42:7").await, Some(now));
    }

    #[test]
    fn test_chain_fixture_is_topological() {
        let flags = fixtures::chain_flags();
        let chain: Vec<String> = flags.iter().map(|f| f.key.clone()).collect();
        assertions::assert_topological(&chain, &flags);
    }

    #[test]
    fn test_dependents_fixture() {
        let flags = fixtures::dependents_of(1, 3);
        assert_eq!(flags.len(), 3);
        assert!(flags.iter().all(|f| f.dependency_references() == vec!["1"]));
    }
}
