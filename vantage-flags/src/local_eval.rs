//! Local-evaluation payload for SDKs.
//!
//! SDKs evaluate flags in process, so every flag-type filter must tell them
//! which flags to evaluate first. Filters get a `dependency_chain` and their
//! numeric references rewritten to flag keys.

use serde::{Deserialize, Serialize};
use vantage_core::{FeatureFlag, TeamId};

use crate::graph::DependencyGraph;

/// Flags of one team, ready for local evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalEvaluation {
    pub flags: Vec<FeatureFlag>,
}

impl LocalEvaluation {
    pub fn flag(&self, key: &str) -> Option<&FeatureFlag> {
        self.flags.iter().find(|flag| flag.key == key)
    }
}

/// Build the payload for `team_id` from the team's flags.
///
/// Deleted flags and flags of other teams are left out. A filter whose
/// reference matches no flag keeps its original key and gets an empty chain;
/// a filter referencing a flag on or behind a cycle gets an empty chain.
pub fn build_local_evaluation(team_id: TeamId, flags: &[FeatureFlag]) -> LocalEvaluation {
    let graph = DependencyGraph::new(team_id, flags);

    let flags = flags
        .iter()
        .filter(|flag| flag.team_id == team_id && !flag.deleted)
        .map(|flag| {
            let mut flag = flag.clone();
            for group in flag.filters.all_groups_mut() {
                for property in group.properties.iter_mut() {
                    if !property.is_flag_dependency() {
                        continue;
                    }
                    let chain = graph.chain_for_reference(&property.key);
                    if let Some(dependency) = graph.flag(&property.key) {
                        property.key = dependency.key.clone();
                    }
                    property.dependency_chain = Some(chain);
                }
            }
            flag
        })
        .collect::<Vec<_>>();

    tracing::debug!(
        team_id = %team_id,
        flags = flags.len(),
        "Built local evaluation payload"
    );

    LocalEvaluation { flags }
}
