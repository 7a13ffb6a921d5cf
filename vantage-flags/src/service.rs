//! Validated flag writes.

use vantage_core::{FeatureFlag, FlagId, TeamId, VantageError, VantageResult};
use vantage_storage::FeatureFlagStore;

use crate::local_eval::{build_local_evaluation, LocalEvaluation};
use crate::validation::{validate_create, validate_update};

/// Applies activation checks before persisting flag changes.
#[derive(Debug, Clone)]
pub struct FlagWriteService<S> {
    store: S,
}

impl<S: FeatureFlagStore> FlagWriteService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn create(&self, flag: FeatureFlag) -> VantageResult<FeatureFlag> {
        let existing = self.store.list_for_team(flag.team_id).await?;
        if let Err(e) = validate_create(&existing, &flag) {
            return Err(rejected("create", &flag, e.into()));
        }
        let created = self.store.insert(flag).await?;
        tracing::info!(
            team_id = %created.team_id,
            flag_id = %created.id,
            flag_key = %created.key,
            "Feature flag created"
        );
        Ok(created)
    }

    /// Replace a flag with `flag`, matched by team and ID.
    pub async fn update(&self, flag: FeatureFlag) -> VantageResult<FeatureFlag> {
        let current = self.store.get(flag.team_id, flag.id).await?;
        let existing = self.store.list_for_team(flag.team_id).await?;
        if let Err(e) = validate_update(&existing, &current, &flag) {
            return Err(rejected("update", &flag, e.into()));
        }
        let updated = self.store.update(flag).await?;
        tracing::info!(
            team_id = %updated.team_id,
            flag_id = %updated.id,
            active = updated.active,
            deleted = updated.deleted,
            "Feature flag updated"
        );
        Ok(updated)
    }

    pub async fn set_active(
        &self,
        team_id: TeamId,
        flag_id: FlagId,
        active: bool,
    ) -> VantageResult<FeatureFlag> {
        let flag = self.store.get(team_id, flag_id).await?;
        self.update(flag.with_active(active)).await
    }

    /// Soft-delete a flag.
    pub async fn delete(&self, team_id: TeamId, flag_id: FlagId) -> VantageResult<FeatureFlag> {
        let flag = self.store.get(team_id, flag_id).await?;
        self.update(flag.with_deleted(true)).await
    }

    pub async fn local_evaluation(&self, team_id: TeamId) -> VantageResult<LocalEvaluation> {
        let flags = self.store.list_for_team(team_id).await?;
        Ok(build_local_evaluation(team_id, &flags))
    }
}

fn rejected(operation: &'static str, flag: &FeatureFlag, error: VantageError) -> VantageError {
    tracing::warn!(
        operation,
        team_id = %flag.team_id,
        flag_id = %flag.id,
        error = %error,
        "Feature flag write rejected"
    );
    error
}
