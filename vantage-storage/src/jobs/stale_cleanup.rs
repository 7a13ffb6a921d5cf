//! Stale insight cleanup background task
//!
//! Insights that nobody views keep their freshness entries forever unless
//! something removes them. This task periodically calls
//! [`FreshnessIndex::remove_older_than`] for every configured team with a
//! threshold of `now - retention`.

use crate::cache::FreshnessIndex;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use vantage_core::{CleanupConfig, TeamId, Timestamp};

const DEFAULT_CHECK_INTERVAL_SECS: u64 = 3600;
const DEFAULT_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the stale cleanup task.
#[derive(Debug, Clone)]
pub struct StaleCleanupConfig {
    /// How often to run a cleanup cycle (default: 1 hour)
    pub check_interval: Duration,

    /// Entries whose target age is further in the past than this are
    /// removed (default: 7 days)
    pub retention: Duration,

    /// Teams to sweep each cycle
    pub team_ids: Vec<TeamId>,
}

impl Default for StaleCleanupConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            team_ids: Vec::new(),
        }
    }
}

impl From<&CleanupConfig> for StaleCleanupConfig {
    fn from(config: &CleanupConfig) -> Self {
        Self {
            check_interval: config.interval(),
            retention: config.retention(),
            team_ids: config.team_ids.clone(),
        }
    }
}

impl StaleCleanupConfig {
    /// Create a config from environment variables.
    ///
    /// # Environment Variables
    /// - `VANTAGE_CLEANUP_INTERVAL_SECS`: seconds between cycles (default: 3600)
    /// - `VANTAGE_CLEANUP_RETENTION_SECS`: retention window (default: 604800)
    /// - `VANTAGE_CLEANUP_TEAMS`: comma-separated team IDs (default: none)
    pub fn from_env() -> Self {
        let check_interval = Duration::from_secs(
            std::env::var("VANTAGE_CLEANUP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CHECK_INTERVAL_SECS),
        );

        let retention = Duration::from_secs(
            std::env::var("VANTAGE_CLEANUP_RETENTION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RETENTION_SECS),
        );

        let team_ids = std::env::var("VANTAGE_CLEANUP_TEAMS")
            .map(|raw| {
                raw.split(',')
                    .filter_map(|part| part.trim().parse::<TeamId>().ok())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            check_interval,
            retention,
            team_ids,
        }
    }

    /// Cut-off for a cycle starting at `now`.
    pub fn threshold(&self, now: Timestamp) -> Timestamp {
        let retention = ChronoDuration::from_std(self.retention).unwrap_or(ChronoDuration::MAX);
        now.checked_sub_signed(retention)
            .unwrap_or(Timestamp::MIN_UTC)
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for cleanup activity.
#[derive(Debug, Default)]
pub struct StaleCleanupMetrics {
    /// Total cleanup cycles completed
    pub cleanup_cycles: AtomicU64,

    /// Total freshness entries removed since startup
    pub entries_removed: AtomicU64,

    /// Total per-team failures
    pub cleanup_errors: AtomicU64,
}

impl StaleCleanupMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StaleCleanupSnapshot {
        StaleCleanupSnapshot {
            cleanup_cycles: self.cleanup_cycles.load(Ordering::Relaxed),
            entries_removed: self.entries_removed.load(Ordering::Relaxed),
            cleanup_errors: self.cleanup_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`StaleCleanupMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleCleanupSnapshot {
    pub cleanup_cycles: u64,
    pub entries_removed: u64,
    pub cleanup_errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Run cleanup cycles until the shutdown signal flips to `true`.
///
/// The first cycle runs immediately. Returns the metrics collected over the
/// task's lifetime.
pub async fn stale_cleanup_task(
    index: Arc<dyn FreshnessIndex>,
    config: StaleCleanupConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<StaleCleanupMetrics> {
    let metrics = Arc::new(StaleCleanupMetrics::new());

    let mut cleanup_interval = interval(config.check_interval);
    cleanup_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        check_interval_secs = config.check_interval.as_secs(),
        retention_secs = config.retention.as_secs(),
        teams = config.team_ids.len(),
        index = index.name(),
        "Stale cleanup task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Stale cleanup task shutting down");
                    break;
                }
            }

            _ = cleanup_interval.tick() => {
                run_cleanup_cycle(index.as_ref(), &config, &metrics, Utc::now()).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cleanup_cycles = snapshot.cleanup_cycles,
        entries_removed = snapshot.entries_removed,
        cleanup_errors = snapshot.cleanup_errors,
        "Stale cleanup task completed"
    );

    metrics
}

/// One sweep over every configured team. A failing team is logged and
/// counted; the remaining teams are still swept.
pub async fn run_cleanup_cycle(
    index: &dyn FreshnessIndex,
    config: &StaleCleanupConfig,
    metrics: &StaleCleanupMetrics,
    now: Timestamp,
) -> u64 {
    metrics.cleanup_cycles.fetch_add(1, Ordering::Relaxed);
    let threshold = config.threshold(now);

    let mut removed = 0u64;
    for &team_id in &config.team_ids {
        match index.remove_older_than(team_id, threshold).await {
            Ok(count) => {
                removed += count;
                metrics.entries_removed.fetch_add(count, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    team_id = %team_id,
                    "Failed to clean up stale insights"
                );
                metrics.cleanup_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    if removed > 0 {
        tracing::info!(removed, threshold = %threshold, "Stale cleanup cycle completed");
    } else {
        tracing::trace!("Stale cleanup cycle completed with nothing to remove");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryFreshnessIndex;
    use async_trait::async_trait;
    use vantage_core::{StorageError, VantageResult};

    fn config(teams: &[i64]) -> StaleCleanupConfig {
        StaleCleanupConfig {
            check_interval: Duration::from_secs(60),
            retention: Duration::from_secs(24 * 60 * 60),
            team_ids: teams.iter().copied().map(TeamId::from_raw).collect(),
        }
    }

    #[test]
    fn test_default_config() {
        let config = StaleCleanupConfig::default();
        assert_eq!(config.check_interval, Duration::from_secs(3600));
        assert_eq!(config.retention, Duration::from_secs(604_800));
        assert!(config.team_ids.is_empty());
    }

    #[test]
    fn test_from_cleanup_config() {
        let source = CleanupConfig {
            enabled: true,
            interval_secs: 30,
            retention_secs: 90,
            team_ids: vec![TeamId::from_raw(4)],
        };
        let config = StaleCleanupConfig::from(&source);
        assert_eq!(config.check_interval, Duration::from_secs(30));
        assert_eq!(config.retention, Duration::from_secs(90));
        assert_eq!(config.team_ids, vec![TeamId::from_raw(4)]);
    }

    #[test]
    fn test_threshold_saturates() {
        let config = StaleCleanupConfig {
            retention: Duration::from_secs(u64::MAX),
            ..StaleCleanupConfig::default()
        };
        assert_eq!(config.threshold(Utc::now()), Timestamp::MIN_UTC);
    }

    #[tokio::test]
    async fn test_cycle_removes_only_old_entries() {
        let index = InMemoryFreshnessIndex::new();
        let team = TeamId::from_raw(1);
        let now = Utc::now();
        index
            .upsert(team, "1:", now - ChronoDuration::days(3))
            .await
            .expect("upsert");
        index
            .upsert(team, "2:", now - ChronoDuration::hours(1))
            .await
            .expect("upsert");

        let metrics = StaleCleanupMetrics::new();
        let removed = run_cleanup_cycle(&index, &config(&[1]), &metrics, now).await;

        assert_eq!(removed, 1);
        assert_eq!(index.member_count(team).await, 1);
        assert!(index.target_age(team, "2:").await.is_some());
        assert_eq!(
            metrics.snapshot(),
            StaleCleanupSnapshot {
                cleanup_cycles: 1,
                entries_removed: 1,
                cleanup_errors: 0,
            }
        );
    }

    struct FailingIndex;

    #[async_trait]
    impl FreshnessIndex for FailingIndex {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn upsert(&self, _: TeamId, _: &str, _: Timestamp) -> VantageResult<()> {
            Ok(())
        }

        async fn remove(&self, _: TeamId, _: &str) -> VantageResult<()> {
            Ok(())
        }

        async fn stale_members(
            &self,
            _: TeamId,
            _: Timestamp,
            _: Option<usize>,
        ) -> VantageResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn remove_older_than(&self, team_id: TeamId, _: Timestamp) -> VantageResult<u64> {
            if team_id.as_i64() == 2 {
                Err(StorageError::backend("failing", "boom").into())
            } else {
                Ok(3)
            }
        }
    }

    #[tokio::test]
    async fn test_cycle_continues_past_failing_team() {
        let metrics = StaleCleanupMetrics::new();
        let removed = run_cleanup_cycle(&FailingIndex, &config(&[1, 2, 3]), &metrics, Utc::now()).await;

        assert_eq!(removed, 6);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.entries_removed, 6);
        assert_eq!(snapshot.cleanup_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_runs_until_shutdown() {
        let index = Arc::new(InMemoryFreshnessIndex::new());
        let team = TeamId::from_raw(7);
        index
            .upsert(team, "9:", Utc::now() - ChronoDuration::days(30))
            .await
            .expect("upsert");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(stale_cleanup_task(
            Arc::clone(&index) as Arc<dyn FreshnessIndex>,
            config(&[7]),
            shutdown_rx,
        ));

        // First tick fires immediately, second after one interval.
        tokio::time::sleep(Duration::from_secs(90)).await;
        shutdown_tx.send(true).expect("send shutdown");

        let metrics = handle.await.expect("task join");
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cleanup_cycles, 2);
        assert_eq!(snapshot.entries_removed, 1);
        assert_eq!(index.member_count(team).await, 0);
    }
}
