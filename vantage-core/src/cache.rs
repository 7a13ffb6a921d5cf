//! Query cache identity and payload types
//!
//! A cached query result is addressed by its [`CacheTarget`]: the owning team,
//! the deterministic [`CacheKey`] of the query, and optionally the insight and
//! dashboard the result was rendered for. The stored blob is a
//! [`CacheEnvelope`]; reads hand back a [`CachedResponse`] that carries the
//! timestamps needed to judge staleness.

use crate::{DashboardId, InsightId, TeamId, Timestamp};
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

/// Prefix shared by every generated cache key.
pub const CACHE_KEY_PREFIX: &str = "cache_";

/// Number of hash bytes kept in a cache key (32 hex characters).
const CACHE_KEY_HASH_BYTES: usize = 16;

/// Deterministic key for a query result.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an existing key, e.g. one read back from a store listing.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive the key for a team's query.
    ///
    /// The query is serialized canonically (object keys sorted at every
    /// depth) before hashing, so two requests that differ only in key order
    /// share a cache entry.
    pub fn for_query(team_id: TeamId, query: &Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(team_id.as_i64().to_be_bytes());
        hasher.update(b":");
        hasher.update(canonical_json(query).as_bytes());
        let digest = hasher.finalize();
        Self(format!(
            "{}{}",
            CACHE_KEY_PREFIX,
            hex::encode(&digest[..CACHE_KEY_HASH_BYTES])
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialize a JSON value with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Everything needed to address one cached query result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheTarget {
    pub team_id: TeamId,
    pub cache_key: CacheKey,
    pub insight_id: Option<InsightId>,
    pub dashboard_id: Option<DashboardId>,
}

impl CacheTarget {
    pub fn new(team_id: TeamId, cache_key: CacheKey) -> Self {
        Self {
            team_id,
            cache_key,
            insight_id: None,
            dashboard_id: None,
        }
    }

    /// Attach the insight this result belongs to.
    pub fn with_insight(mut self, insight_id: InsightId) -> Self {
        self.insight_id = Some(insight_id);
        self
    }

    /// Attach the dashboard the insight is rendered on.
    pub fn with_dashboard(mut self, dashboard_id: DashboardId) -> Self {
        self.dashboard_id = Some(dashboard_id);
        self
    }

    /// Member name used in the team's freshness index.
    ///
    /// Format is `"{insight_id}:{dashboard_id}"`, with an empty dashboard
    /// segment for insights viewed outside a dashboard. Returns `None` when no
    /// insight is attached; such results are never tracked for refresh.
    pub fn freshness_member(&self) -> Option<String> {
        self.insight_id.map(|insight| match self.dashboard_id {
            Some(dashboard) => format!("{}:{}", insight, dashboard),
            None => format!("{}:", insight),
        })
    }
}

/// Stored representation of a cached query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEnvelope {
    pub response: Value,
    pub cached_at: Timestamp,
    pub target_age: Option<Timestamp>,
    pub expires_at: Timestamp,
}

impl CacheEnvelope {
    /// Wrap a response that was just computed.
    pub fn new(response: Value, target_age: Option<Timestamp>, ttl: Duration) -> Self {
        let cached_at = Utc::now();
        let ttl = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::MAX);
        let expires_at = cached_at.checked_add_signed(ttl).unwrap_or(Timestamp::MAX_UTC);
        Self {
            response,
            cached_at,
            target_age,
            expires_at,
        }
    }

    /// Whether the blob has outlived its TTL.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }

    pub fn into_response(self) -> CachedResponse {
        CachedResponse {
            response: self.response,
            cached_at: self.cached_at,
            target_age: self.target_age,
        }
    }
}

/// A cache hit, with the metadata needed to judge its freshness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub response: Value,
    pub cached_at: Timestamp,
    pub target_age: Option<Timestamp>,
}

impl CachedResponse {
    /// A result is stale once its target age has passed.
    ///
    /// Results cached without a target age never go stale on their own.
    pub fn is_stale(&self, now: Timestamp) -> bool {
        self.target_age.is_some_and(|target| target <= now)
    }

    /// How long ago the result was cached.
    pub fn age(&self, now: Timestamp) -> Duration {
        now.signed_duration_since(self.cached_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn into_inner(self) -> Value {
        self.response
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::Map;

    fn arb_object() -> impl Strategy<Value = Vec<(String, i64)>> {
        prop::collection::vec(("[a-z]{1,8}", any::<i64>()), 0..12)
    }

    proptest! {
        #[test]
        fn prop_key_independent_of_insertion_order(team in any::<i64>(), entries in arb_object()) {
            let forward: Map<String, Value> = entries
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(*v)))
                .collect();
            let reversed: Map<String, Value> = entries
                .iter()
                .rev()
                .map(|(k, v)| (k.clone(), Value::from(*v)))
                .collect();
            // Duplicate keys resolve differently by insertion order; compare
            // only when both maps hold the same pairs.
            prop_assume!(forward == reversed);

            let team = TeamId::from_raw(team);
            prop_assert_eq!(
                CacheKey::for_query(team, &Value::Object(forward)),
                CacheKey::for_query(team, &Value::Object(reversed))
            );
        }

        #[test]
        fn prop_canonical_json_parses_back(entries in arb_object()) {
            let map: Map<String, Value> = entries
                .into_iter()
                .map(|(k, v)| (k, Value::from(v)))
                .collect();
            let value = Value::Object(map);
            let parsed: Value = serde_json::from_str(&canonical_json(&value)).expect("valid json");
            prop_assert_eq!(parsed, value);
        }
    }
}
