//! Grouped query-result cache with a fixed time-to-live.
//!
//! Entries are JSON values stored under `(group, key)`. Writers never update
//! individual entries; they flush the whole group so every cached aggregate
//! stays consistent with the tables underneath.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::{debug, trace, warn};

use crate::config::DEFAULT_CACHE_TTL_SECS;

/// Cache group for download log queries.
pub const DOWNLOADS_GROUP: &str = "erifl_file_downloads";

/// Cache group for file listings.
pub const FILE_LISTS_GROUP: &str = "erifl_file_lists";

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// In-process cache keyed by group and key.
#[derive(Debug)]
pub struct CacheStore {
    groups: DashMap<String, DashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_CACHE_TTL_SECS))
    }
}

impl CacheStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            groups: DashMap::new(),
            ttl,
        }
    }

    /// Returns a live entry, removing it when it has expired.
    pub fn get<T: DeserializeOwned>(&self, group: &str, key: &str) -> Option<T> {
        let (value, expired) = {
            let entries = self.groups.get(group)?;
            let entry = entries.get(key)?;
            (entry.value.clone(), entry.expires_at <= Instant::now())
        };

        if expired {
            if let Some(entries) = self.groups.get(group) {
                entries.remove(key);
            }
            trace!(group, key, "cache entry expired");
            return None;
        }

        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(error) => {
                warn!(group, key, %error, "discarding undecodable cache entry");
                None
            }
        }
    }

    /// Stores a value; values that fail to serialize are skipped.
    pub fn set<T: Serialize>(&self, group: &str, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(error) => {
                warn!(group, key, %error, "value not cacheable");
                return;
            }
        };
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(key.to_string(), entry);
    }

    /// Drops every entry in `group`.
    pub fn flush_group(&self, group: &str) {
        if let Some((_, entries)) = self.groups.remove(group) {
            debug!(group, entries = entries.len(), "cache group flushed");
        }
    }

    /// Number of entries currently held for `group`, expired ones included.
    #[must_use]
    pub fn len(&self, group: &str) -> usize {
        self.groups.get(group).map_or(0, |entries| entries.len())
    }

    /// Returns true when `group` holds no entries.
    #[must_use]
    pub fn is_empty(&self, group: &str) -> bool {
        self.len(group) == 0
    }
}

/// Builds `prefix_<sha256 of the JSON-encoded args>`.
#[must_use]
pub fn cache_key<A: Serialize>(prefix: &str, args: &A) -> String {
    let encoded = serde_json::to_string(args).unwrap_or_default();
    format!("{prefix}_{}", hex::encode(Sha256::digest(encoded.as_bytes())))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get_returns_value() {
        let cache = CacheStore::default();
        cache.set(DOWNLOADS_GROUP, "top", &vec![(1_i64, 4_i64)]);

        let hit: Option<Vec<(i64, i64)>> = cache.get(DOWNLOADS_GROUP, "top");
        assert_eq!(hit, Some(vec![(1, 4)]));
    }

    #[test]
    fn test_flush_group_leaves_other_groups() {
        let cache = CacheStore::default();
        cache.set(DOWNLOADS_GROUP, "a", &1_u32);
        cache.set(DOWNLOADS_GROUP, "b", &2_u32);
        cache.set(FILE_LISTS_GROUP, "a", &3_u32);

        cache.flush_group(DOWNLOADS_GROUP);

        assert!(cache.is_empty(DOWNLOADS_GROUP));
        assert_eq!(cache.get::<u32>(FILE_LISTS_GROUP, "a"), Some(3));
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = CacheStore::new(Duration::from_millis(0));
        cache.set(DOWNLOADS_GROUP, "k", &"v");

        assert_eq!(cache.get::<String>(DOWNLOADS_GROUP, "k"), None);
        assert_eq!(cache.len(DOWNLOADS_GROUP), 0);
    }

    #[test]
    fn test_type_mismatch_is_a_miss() {
        let cache = CacheStore::default();
        cache.set(DOWNLOADS_GROUP, "k", &"text");
        assert_eq!(cache.get::<u64>(DOWNLOADS_GROUP, "k"), None);
    }

    #[test]
    fn test_cache_key_depends_on_args() {
        let a = cache_key("get_downloads", &(Some(1_i64), None::<String>));
        let b = cache_key("get_downloads", &(Some(2_i64), None::<String>));
        assert!(a.starts_with("get_downloads_"));
        assert_eq!(a.len(), "get_downloads_".len() + 64);
        assert_ne!(a, b);
        assert_eq!(a, cache_key("get_downloads", &(Some(1_i64), None::<String>)));
    }
}
