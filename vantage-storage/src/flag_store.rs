//! Feature flag persistence.
//!
//! Flags are always read and written per team. Flag IDs are only unique
//! within a team, so every lookup takes the team as well.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use vantage_core::{
    FeatureFlag, FlagId, StorageError, TeamId, ValidationError, VantageResult,
};

/// Storage for a team's feature flags.
#[async_trait]
pub trait FeatureFlagStore: Send + Sync {
    /// Every flag of the team, deleted ones included, ordered by ID.
    async fn list_for_team(&self, team_id: TeamId) -> VantageResult<Vec<FeatureFlag>>;

    async fn get(&self, team_id: TeamId, flag_id: FlagId) -> VantageResult<FeatureFlag>;

    /// Persist a new flag. Fails if the ID or key is already taken in the team.
    async fn insert(&self, flag: FeatureFlag) -> VantageResult<FeatureFlag>;

    /// Replace an existing flag.
    async fn update(&self, flag: FeatureFlag) -> VantageResult<FeatureFlag>;
}

#[async_trait]
impl<T: FeatureFlagStore + ?Sized> FeatureFlagStore for Arc<T> {
    async fn list_for_team(&self, team_id: TeamId) -> VantageResult<Vec<FeatureFlag>> {
        (**self).list_for_team(team_id).await
    }

    async fn get(&self, team_id: TeamId, flag_id: FlagId) -> VantageResult<FeatureFlag> {
        (**self).get(team_id, flag_id).await
    }

    async fn insert(&self, flag: FeatureFlag) -> VantageResult<FeatureFlag> {
        (**self).insert(flag).await
    }

    async fn update(&self, flag: FeatureFlag) -> VantageResult<FeatureFlag> {
        (**self).update(flag).await
    }
}

fn flag_not_found(team_id: TeamId, flag_id: FlagId) -> StorageError {
    StorageError::NotFound {
        entity: "feature flag",
        id: format!("{}/{}", team_id, flag_id),
    }
}

/// In-memory [`FeatureFlagStore`] for tests and the CLI.
#[derive(Debug, Default)]
pub struct InMemoryFlagStore {
    teams: RwLock<HashMap<TeamId, BTreeMap<FlagId, FeatureFlag>>>,
}

impl InMemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `flags`, bypassing uniqueness checks.
    pub fn with_flags(flags: impl IntoIterator<Item = FeatureFlag>) -> Self {
        let mut teams: HashMap<TeamId, BTreeMap<FlagId, FeatureFlag>> = HashMap::new();
        for flag in flags {
            teams.entry(flag.team_id).or_default().insert(flag.id, flag);
        }
        Self {
            teams: RwLock::new(teams),
        }
    }
}

#[async_trait]
impl FeatureFlagStore for InMemoryFlagStore {
    async fn list_for_team(&self, team_id: TeamId) -> VantageResult<Vec<FeatureFlag>> {
        Ok(self
            .teams
            .read()
            .await
            .get(&team_id)
            .map(|flags| flags.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, team_id: TeamId, flag_id: FlagId) -> VantageResult<FeatureFlag> {
        self.teams
            .read()
            .await
            .get(&team_id)
            .and_then(|flags| flags.get(&flag_id).cloned())
            .ok_or_else(|| flag_not_found(team_id, flag_id).into())
    }

    async fn insert(&self, flag: FeatureFlag) -> VantageResult<FeatureFlag> {
        let mut teams = self.teams.write().await;
        let flags = teams.entry(flag.team_id).or_default();

        if flags.contains_key(&flag.id) {
            return Err(ValidationError::InvalidValue {
                field: "id".to_string(),
                reason: format!("flag {} already exists", flag.id),
            }
            .into());
        }
        if flags.values().any(|existing| !existing.deleted && existing.key == flag.key) {
            return Err(ValidationError::InvalidValue {
                field: "key".to_string(),
                reason: format!("flag key '{}' is already in use", flag.key),
            }
            .into());
        }

        flags.insert(flag.id, flag.clone());
        Ok(flag)
    }

    async fn update(&self, flag: FeatureFlag) -> VantageResult<FeatureFlag> {
        let mut teams = self.teams.write().await;
        let slot = teams
            .get_mut(&flag.team_id)
            .and_then(|flags| flags.get_mut(&flag.id))
            .ok_or_else(|| flag_not_found(flag.team_id, flag.id))?;
        *slot = flag.clone();
        Ok(flag)
    }
}
