//! Command implementations.

use chrono::Duration as ChronoDuration;
use serde::Serialize;
use std::path::Path;
use vantage_core::{
    DashboardId, FeatureFlag, InsightId, TeamId, Timestamp, ValidationError, VantageConfig,
    VantageError,
};
use vantage_flags::{build_local_evaluation, validate_create, validate_update, LocalEvaluation};
use vantage_storage::{FreshnessIndex, StaleInsight};

use crate::error::{CliError, CliResult};

/// Read the config file (or defaults) and apply `VANTAGE_*` overrides.
pub fn load_config(path: Option<&Path>) -> CliResult<VantageConfig> {
    let config = match path {
        Some(path) => VantageConfig::load(path).map_err(VantageError::from)?,
        None => VantageConfig::default(),
    };
    let config = config.with_env_overrides().map_err(VantageError::from)?;
    Ok(config)
}

pub fn load_flags(path: &Path) -> CliResult<Vec<FeatureFlag>> {
    let raw = std::fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
    serde_json::from_str(&raw).map_err(|e| CliError::json(path, e))
}

pub fn load_flag(path: &Path) -> CliResult<FeatureFlag> {
    let raw = std::fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
    serde_json::from_str(&raw).map_err(|e| CliError::json(path, e))
}

pub fn resolve(flags: &[FeatureFlag], team_id: TeamId) -> LocalEvaluation {
    build_local_evaluation(team_id, flags)
}

/// Verdict of `vantage check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub operation: &'static str,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Validate `proposed` as an update when a flag with its team and ID
/// exists, otherwise as a create.
pub fn check(existing: &[FeatureFlag], proposed: &FeatureFlag) -> CheckOutcome {
    let current = existing
        .iter()
        .find(|flag| flag.team_id == proposed.team_id && flag.id == proposed.id);

    let (operation, result): (&'static str, Result<(), ValidationError>) = match current {
        Some(current) => ("update", validate_update(existing, current, proposed)),
        None => ("create", validate_create(existing, proposed)),
    };

    CheckOutcome {
        operation,
        accepted: result.is_ok(),
        error: result.err().map(|e| e.to_string()),
    }
}

/// One row of `vantage stale`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleRow {
    pub member: String,
    pub insight_id: Option<InsightId>,
    pub dashboard_id: Option<DashboardId>,
}

impl From<String> for StaleRow {
    fn from(member: String) -> Self {
        let parsed = StaleInsight::parse(&member);
        Self {
            insight_id: parsed.map(|p| p.insight_id),
            dashboard_id: parsed.and_then(|p| p.dashboard_id),
            member,
        }
    }
}

pub async fn stale(
    index: &dyn FreshnessIndex,
    team_id: TeamId,
    limit: Option<usize>,
    now: Timestamp,
) -> CliResult<Vec<StaleRow>> {
    let members = index.stale_members(team_id, now, limit).await?;
    Ok(members.into_iter().map(StaleRow::from).collect())
}

pub async fn cleanup(
    index: &dyn FreshnessIndex,
    team_id: TeamId,
    older_than_secs: u64,
    now: Timestamp,
) -> CliResult<u64> {
    let age = i64::try_from(older_than_secs)
        .ok()
        .and_then(ChronoDuration::try_seconds)
        .unwrap_or(ChronoDuration::MAX);
    let threshold = now.checked_sub_signed(age).unwrap_or(Timestamp::MIN_UTC);
    let removed = index.remove_older_than(team_id, threshold).await?;
    tracing::info!(
        team_id = %team_id,
        removed,
        threshold = %threshold,
        index = index.name(),
        "Cleaned up stale insights"
    );
    Ok(removed)
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|e| CliError::Output(e.to_string()))?;
    println!("{}", rendered);
    Ok(())
}
