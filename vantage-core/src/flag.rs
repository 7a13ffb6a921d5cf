//! Feature flag data model
//!
//! Flags are stored as JSON rule sets. Only the parts that matter for
//! dependency resolution are typed; everything else rides along in
//! flattened maps so a flag survives a read-modify-write unchanged.

use crate::{FlagId, TeamId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Property filter type marking a dependency on another flag.
pub const FLAG_PROPERTY_TYPE: &str = "flag";

/// Operator used by flag dependency filters.
pub const FLAG_EVALUATES_TO: &str = "flag_evaluates_to";

/// A feature flag and its targeting rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub id: FlagId,
    pub team_id: TeamId,
    pub key: String,
    #[serde(default)]
    pub name: String,
    pub active: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub filters: FlagFilters,
}

impl FeatureFlag {
    /// Create an active flag with no conditions.
    pub fn new(id: FlagId, team_id: TeamId, key: impl Into<String>) -> Self {
        Self {
            id,
            team_id,
            key: key.into(),
            name: String::new(),
            active: true,
            deleted: false,
            filters: FlagFilters::default(),
        }
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_deleted(mut self, deleted: bool) -> Self {
        self.deleted = deleted;
        self
    }

    /// Add a condition group that requires `reference` to evaluate to true.
    pub fn with_dependency(mut self, reference: impl Into<String>) -> Self {
        self.filters.groups.push(FlagConditionGroup {
            properties: vec![PropertyFilter::flag(reference)],
            rollout_percentage: Some(100.0),
            ..FlagConditionGroup::default()
        });
        self
    }

    /// Every flag-type property filter across all condition groups.
    pub fn flag_dependencies(&self) -> impl Iterator<Item = &PropertyFilter> {
        self.filters
            .all_groups()
            .flat_map(|group| group.properties.iter())
            .filter(|property| property.is_flag_dependency())
    }

    /// Raw references of this flag's dependencies, first occurrence order,
    /// without duplicates.
    pub fn dependency_references(&self) -> Vec<&str> {
        let mut references: Vec<&str> = Vec::new();
        for property in self.flag_dependencies() {
            if !references.contains(&property.key.as_str()) {
                references.push(property.key.as_str());
            }
        }
        references
    }

    /// Whether the flag can currently take part in evaluation.
    pub fn is_live(&self) -> bool {
        self.active && !self.deleted
    }

    pub fn summary(&self) -> FlagSummary {
        FlagSummary {
            id: self.id,
            key: self.key.clone(),
        }
    }
}

/// Targeting rules of a flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagFilters {
    #[serde(default)]
    pub groups: Vec<FlagConditionGroup>,
    /// Early-access enrollment groups, evaluated before `groups`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_groups: Option<Vec<FlagConditionGroup>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FlagFilters {
    /// Iterate `super_groups` then `groups`.
    pub fn all_groups(&self) -> impl Iterator<Item = &FlagConditionGroup> {
        self.super_groups
            .iter()
            .flatten()
            .chain(self.groups.iter())
    }

    /// Mutable variant of [`FlagFilters::all_groups`].
    pub fn all_groups_mut(&mut self) -> impl Iterator<Item = &mut FlagConditionGroup> {
        self.super_groups
            .iter_mut()
            .flatten()
            .chain(self.groups.iter_mut())
    }
}

/// One OR-branch of a flag's rules; all properties must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagConditionGroup {
    #[serde(default)]
    pub properties: Vec<PropertyFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single property condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyFilter {
    /// Property name, or for flag dependencies the referenced flag ID or key.
    pub key: String,
    #[serde(rename = "type")]
    pub property_type: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    /// Populated in local-evaluation payloads only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_chain: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PropertyFilter {
    /// Dependency on another flag evaluating to true.
    pub fn flag(reference: impl Into<String>) -> Self {
        Self {
            key: reference.into(),
            property_type: FLAG_PROPERTY_TYPE.to_string(),
            value: Value::Bool(true),
            operator: Some(FLAG_EVALUATES_TO.to_string()),
            dependency_chain: None,
            extra: Map::new(),
        }
    }

    /// Exact-match person property condition.
    pub fn person(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            property_type: "person".to_string(),
            value: value.into(),
            operator: Some("exact".to_string()),
            dependency_chain: None,
            extra: Map::new(),
        }
    }

    pub fn is_flag_dependency(&self) -> bool {
        self.property_type == FLAG_PROPERTY_TYPE
    }
}

/// Key and ID of a flag, as listed in validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlagSummary {
    pub id: FlagId,
    pub key: String,
}

impl fmt::Display for FlagSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (ID: {})", self.key, self.id)
    }
}
