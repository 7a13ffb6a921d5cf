//! Activation checks for flag writes.
//!
//! A live flag (active and not deleted) must never depend on a flag that is
//! not live. Writes that would break this, reference a flag the team does
//! not have, or close a dependency cycle are rejected with a
//! [`ValidationError`]. Every check only looks at the written flag's team.

use vantage_core::{FeatureFlag, FlagSummary, ValidationError};

use crate::graph::DependencyGraph;

/// Check a new flag against the team's existing flags.
pub fn validate_create(existing: &[FeatureFlag], proposed: &FeatureFlag) -> Result<(), ValidationError> {
    validate_write(existing, None, proposed)
}

/// Check an update of `current` to `proposed` against the team's flags.
///
/// `existing` may still contain `current`; it is replaced by `proposed`
/// before any check runs.
pub fn validate_update(
    existing: &[FeatureFlag],
    current: &FeatureFlag,
    proposed: &FeatureFlag,
) -> Result<(), ValidationError> {
    if current.id != proposed.id || current.team_id != proposed.team_id {
        return Err(ValidationError::InvalidValue {
            field: "id".to_string(),
            reason: "a flag's ID and team cannot change".to_string(),
        });
    }
    validate_write(existing, Some(current), proposed)
}

fn validate_write(
    existing: &[FeatureFlag],
    current: Option<&FeatureFlag>,
    proposed: &FeatureFlag,
) -> Result<(), ValidationError> {
    if proposed.key.trim().is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "key".to_string(),
            reason: "flag key must not be empty".to_string(),
        });
    }

    // The team as it would look after the write. The written flag stays a
    // graph node even when being deleted so its dependents can be found.
    let after: Vec<FeatureFlag> = existing
        .iter()
        .filter(|flag| flag.team_id == proposed.team_id && flag.id != proposed.id)
        .cloned()
        .chain(std::iter::once(proposed.clone().with_deleted(false)))
        .collect();
    let graph = DependencyGraph::new(proposed.team_id, &after);

    if loses_liveness(current, proposed) {
        check_no_active_dependents(&graph, proposed)?;
    }

    if proposed.deleted {
        return Ok(());
    }

    check_references_exist(&graph, proposed)?;
    if let Some(path) = graph.cycle_through(proposed.id) {
        return Err(ValidationError::CircularDependency { path });
    }
    if proposed.active {
        check_dependencies_active(&graph, proposed)?;
    }
    Ok(())
}

/// Disabling or soft-deleting a flag that was live.
fn loses_liveness(current: Option<&FeatureFlag>, proposed: &FeatureFlag) -> bool {
    match current {
        Some(current) => {
            (current.active && !proposed.active) || (!current.deleted && proposed.deleted)
        }
        None => false,
    }
}

/// Active flags that reference the written flag directly.
///
/// References match by ID and also by key, so filters that name the flag by
/// key are caught too.
fn check_no_active_dependents(
    graph: &DependencyGraph<'_>,
    proposed: &FeatureFlag,
) -> Result<(), ValidationError> {
    let dependents = summaries(
        graph
            .direct_dependents(proposed.id)
            .into_iter()
            .filter(|flag| flag.active),
    );
    if dependents.is_empty() {
        return Ok(());
    }
    Err(ValidationError::ActiveDependents {
        flag_key: proposed.key.clone(),
        dependents,
    })
}

fn check_references_exist(
    graph: &DependencyGraph<'_>,
    proposed: &FeatureFlag,
) -> Result<(), ValidationError> {
    match proposed
        .dependency_references()
        .into_iter()
        .find(|reference| graph.flag(reference).is_none())
    {
        Some(reference) => Err(ValidationError::MissingDependency {
            flag_key: proposed.key.clone(),
            reference: reference.to_string(),
        }),
        None => Ok(()),
    }
}

/// Every direct or transitive dependency of an active flag must be active.
fn check_dependencies_active(
    graph: &DependencyGraph<'_>,
    proposed: &FeatureFlag,
) -> Result<(), ValidationError> {
    let disabled = summaries(
        graph
            .transitive_dependencies(proposed.id)
            .into_iter()
            .filter(|flag| !flag.active),
    );
    if disabled.is_empty() {
        return Ok(());
    }
    Err(ValidationError::DisabledDependencies {
        flag_key: proposed.key.clone(),
        dependencies: disabled,
    })
}

/// Summaries ordered by flag ID.
fn summaries<'a>(flags: impl Iterator<Item = &'a FeatureFlag>) -> Vec<FlagSummary> {
    let mut summaries: Vec<FlagSummary> = flags.map(FeatureFlag::summary).collect();
    summaries.sort_by_key(|summary| summary.id);
    summaries
}
