//! Insight freshness index.
//!
//! Each team has a sorted set of `"{insight_id}:{dashboard_id}"` members
//! scored by the target age of their cached result. Members whose score has
//! passed are stale and due for a refresh.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use vantage_core::{DashboardId, InsightId, TeamId, Timestamp, VantageResult};

use super::redis_store::{command_error, connect, open_client, RedisStoreError};

/// Redis key prefix of the per-team sorted sets.
pub const FRESHNESS_KEY_PREFIX: &str = "cache_timestamps";

/// Per-team sorted set of insight members scored by target age.
#[async_trait]
pub trait FreshnessIndex: Send + Sync {
    fn name(&self) -> &'static str;

    /// Set (or move) a member's target age.
    async fn upsert(&self, team_id: TeamId, member: &str, target_age: Timestamp)
        -> VantageResult<()>;

    async fn remove(&self, team_id: TeamId, member: &str) -> VantageResult<()>;

    /// Members whose target age is at or before `now`, oldest first.
    async fn stale_members(
        &self,
        team_id: TeamId,
        now: Timestamp,
        limit: Option<usize>,
    ) -> VantageResult<Vec<String>>;

    /// Drop members whose target age is at or before `threshold`.
    async fn remove_older_than(&self, team_id: TeamId, threshold: Timestamp) -> VantageResult<u64>;
}

#[async_trait]
impl<T: FreshnessIndex + ?Sized> FreshnessIndex for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn upsert(
        &self,
        team_id: TeamId,
        member: &str,
        target_age: Timestamp,
    ) -> VantageResult<()> {
        (**self).upsert(team_id, member, target_age).await
    }

    async fn remove(&self, team_id: TeamId, member: &str) -> VantageResult<()> {
        (**self).remove(team_id, member).await
    }

    async fn stale_members(
        &self,
        team_id: TeamId,
        now: Timestamp,
        limit: Option<usize>,
    ) -> VantageResult<Vec<String>> {
        (**self).stale_members(team_id, now, limit).await
    }

    async fn remove_older_than(&self, team_id: TeamId, threshold: Timestamp) -> VantageResult<u64> {
        (**self).remove_older_than(team_id, threshold).await
    }
}

/// A parsed freshness member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleInsight {
    pub insight_id: InsightId,
    pub dashboard_id: Option<DashboardId>,
}

impl StaleInsight {
    /// Parse `"{insight_id}:{dashboard_id}"`; the dashboard part may be empty.
    pub fn parse(member: &str) -> Option<Self> {
        let (insight, dashboard) = member.split_once(':')?;
        let insight_id = insight.parse().ok()?;
        let dashboard_id = if dashboard.is_empty() {
            None
        } else {
            Some(dashboard.parse().ok()?)
        };
        Some(Self {
            insight_id,
            dashboard_id,
        })
    }
}

/// Sorted-set score of a timestamp: seconds since the epoch, millisecond precision.
fn score(ts: Timestamp) -> f64 {
    ts.timestamp_millis() as f64 / 1000.0
}

fn sorted_set_key(team_id: TeamId) -> String {
    format!("{}:{}", FRESHNESS_KEY_PREFIX, team_id)
}

// ============================================================================
// IN-MEMORY
// ============================================================================

/// Process-local [`FreshnessIndex`].
#[derive(Debug, Default)]
pub struct InMemoryFreshnessIndex {
    teams: RwLock<HashMap<TeamId, HashMap<String, Timestamp>>>,
}

impl InMemoryFreshnessIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current target age of a member, if tracked.
    pub async fn target_age(&self, team_id: TeamId, member: &str) -> Option<Timestamp> {
        self.teams
            .read()
            .await
            .get(&team_id)
            .and_then(|members| members.get(member).copied())
    }

    pub async fn member_count(&self, team_id: TeamId) -> usize {
        self.teams
            .read()
            .await
            .get(&team_id)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl FreshnessIndex for InMemoryFreshnessIndex {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upsert(
        &self,
        team_id: TeamId,
        member: &str,
        target_age: Timestamp,
    ) -> VantageResult<()> {
        self.teams
            .write()
            .await
            .entry(team_id)
            .or_default()
            .insert(member.to_string(), target_age);
        Ok(())
    }

    async fn remove(&self, team_id: TeamId, member: &str) -> VantageResult<()> {
        if let Some(members) = self.teams.write().await.get_mut(&team_id) {
            members.remove(member);
        }
        Ok(())
    }

    async fn stale_members(
        &self,
        team_id: TeamId,
        now: Timestamp,
        limit: Option<usize>,
    ) -> VantageResult<Vec<String>> {
        let teams = self.teams.read().await;
        let Some(members) = teams.get(&team_id) else {
            return Ok(Vec::new());
        };
        // Same ordering as a sorted set: score, then member.
        let mut stale: Vec<(&Timestamp, &String)> = members
            .iter()
            .filter(|(_, target_age)| **target_age <= now)
            .map(|(member, target_age)| (target_age, member))
            .collect();
        stale.sort();
        Ok(stale
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|(_, member)| member.clone())
            .collect())
    }

    async fn remove_older_than(&self, team_id: TeamId, threshold: Timestamp) -> VantageResult<u64> {
        let mut teams = self.teams.write().await;
        let Some(members) = teams.get_mut(&team_id) else {
            return Ok(0);
        };
        let before = members.len();
        members.retain(|_, target_age| *target_age > threshold);
        Ok((before - members.len()) as u64)
    }
}

// ============================================================================
// REDIS
// ============================================================================

/// [`FreshnessIndex`] over Redis sorted sets at `cache_timestamps:{team_id}`.
#[derive(Debug, Clone)]
pub struct RedisFreshnessIndex {
    client: redis::Client,
}

impl RedisFreshnessIndex {
    pub fn new(url: &str) -> Result<Self, RedisStoreError> {
        Ok(Self::from_client(open_client(url)?))
    }

    pub fn from_client(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FreshnessIndex for RedisFreshnessIndex {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn upsert(
        &self,
        team_id: TeamId,
        member: &str,
        target_age: Timestamp,
    ) -> VantageResult<()> {
        let mut conn = connect(&self.client).await?;
        let _: () = conn
            .zadd(sorted_set_key(team_id), member, score(target_age))
            .await
            .map_err(command_error)?;
        Ok(())
    }

    async fn remove(&self, team_id: TeamId, member: &str) -> VantageResult<()> {
        let mut conn = connect(&self.client).await?;
        let _: () = conn
            .zrem(sorted_set_key(team_id), member)
            .await
            .map_err(command_error)?;
        Ok(())
    }

    async fn stale_members(
        &self,
        team_id: TeamId,
        now: Timestamp,
        limit: Option<usize>,
    ) -> VantageResult<Vec<String>> {
        let mut conn = connect(&self.client).await?;
        let key = sorted_set_key(team_id);
        let members: Vec<String> = match limit {
            Some(count) => conn
                .zrangebyscore_limit(key, "-inf", score(now), 0, count as isize)
                .await
                .map_err(command_error)?,
            None => conn
                .zrangebyscore(key, "-inf", score(now))
                .await
                .map_err(command_error)?,
        };
        Ok(members)
    }

    async fn remove_older_than(&self, team_id: TeamId, threshold: Timestamp) -> VantageResult<u64> {
        let mut conn = connect(&self.client).await?;
        let removed: u64 = conn
            .zrembyscore(sorted_set_key(team_id), "-inf", score(threshold))
            .await
            .map_err(command_error)?;
        Ok(removed)
    }
}
