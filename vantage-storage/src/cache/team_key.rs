//! Team-scoped cache keys.
//!
//! A [`TeamScopedKey`] can only be built from a team ID and a cache key, so
//! every store operation names the team it touches. Each store renders the
//! key in its own layout:
//!
//! - Redis: `query_cache:{team_id}:{cache_key}`
//! - Object store: `query_cache/{team_id}/{cache_key}`
//! - LMDB: `[team_id: 8 bytes BE][0xFF][cache_key bytes]`

use vantage_core::{CacheKey, CacheTarget, TeamId};

/// Namespace shared by the Redis and object-store layouts.
pub const KEY_NAMESPACE: &str = "query_cache";

/// Separator byte between the team and the cache key in the binary layout.
/// Never valid inside UTF-8, so it cannot collide with key bytes.
const SEPARATOR: u8 = 0xFF;

const TEAM_BYTES: usize = 8;

/// A cache key bound to the team that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TeamScopedKey {
    inner: TeamKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TeamKeyInner {
    team_id: TeamId,
    cache_key: CacheKey,
}

impl TeamScopedKey {
    pub fn new(team_id: TeamId, cache_key: CacheKey) -> Self {
        Self {
            inner: TeamKeyInner { team_id, cache_key },
        }
    }

    pub fn for_target(target: &CacheTarget) -> Self {
        Self::new(target.team_id, target.cache_key.clone())
    }

    pub fn team_id(&self) -> TeamId {
        self.inner.team_id
    }

    pub fn cache_key(&self) -> &CacheKey {
        &self.inner.cache_key
    }

    pub fn redis_key(&self) -> String {
        format!(
            "{}:{}:{}",
            KEY_NAMESPACE, self.inner.team_id, self.inner.cache_key
        )
    }

    /// Glob matching every Redis key of a team.
    pub fn redis_team_pattern(team_id: TeamId) -> String {
        format!("{}:{}:*", KEY_NAMESPACE, team_id)
    }

    pub fn object_path(&self) -> String {
        format!(
            "{}{}",
            Self::object_team_prefix(self.inner.team_id),
            self.inner.cache_key
        )
    }

    /// Path prefix shared by every object of a team.
    pub fn object_team_prefix(team_id: TeamId) -> String {
        format!("{}/{}/", KEY_NAMESPACE, team_id)
    }

    /// Binary layout used by LMDB.
    pub fn encode(&self) -> Vec<u8> {
        let key = self.inner.cache_key.as_str().as_bytes();
        let mut bytes = Vec::with_capacity(TEAM_BYTES + 1 + key.len());
        bytes.extend_from_slice(&Self::team_prefix(self.inner.team_id));
        bytes.extend_from_slice(key);
        bytes
    }

    /// Decode the binary layout.
    ///
    /// Returns `None` if the buffer is too short, the separator is missing,
    /// or the key part is empty or not UTF-8.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() <= TEAM_BYTES + 1 || bytes[TEAM_BYTES] != SEPARATOR {
            return None;
        }
        let team: [u8; TEAM_BYTES] = bytes[..TEAM_BYTES].try_into().ok()?;
        let key = std::str::from_utf8(&bytes[TEAM_BYTES + 1..]).ok()?;
        Some(Self::new(
            TeamId::from_raw(i64::from_be_bytes(team)),
            CacheKey::new(key),
        ))
    }

    /// Prefix of every binary key belonging to a team, for range scans.
    pub fn team_prefix(team_id: TeamId) -> [u8; TEAM_BYTES + 1] {
        let mut prefix = [0u8; TEAM_BYTES + 1];
        prefix[..TEAM_BYTES].copy_from_slice(&team_id.as_i64().to_be_bytes());
        prefix[TEAM_BYTES] = SEPARATOR;
        prefix
    }
}
