//! Per-item result cache.
//!
//! The store itself is an external collaborator behind [`CacheStore`];
//! the in-memory implementation backs tests and single-process runs.
//! The one hard rule: an entry past its expiry is a miss, never a stale
//! read — expiry is enforced on the read path.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::core::SourceId;
use crate::errors::CollectError;

/// A cached value with its expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The derived cache key.
    pub key: String,
    /// The serialized cached value.
    pub value: serde_json::Value,
    /// When the entry stops being returnable.
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates an entry expiring `ttl` from now.
    #[must_use]
    pub fn new(key: impl Into<String>, value: serde_json::Value, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            value,
            expires_at: Utc::now()
                + ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::hours(1)),
        }
    }

    /// Returns true if the entry is past its expiry.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// The cache store contract.
///
/// Assumed network-backed and independently available; all methods can
/// fail, and callers decide whether a failure matters (the collector
/// swallows write failures, for instance).
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Gets a value. Expired entries are a miss.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CollectError>;

    /// Sets a value with a TTL.
    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration)
        -> Result<(), CollectError>;

    /// Deletes a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<bool, CollectError>;

    /// Returns true if a live (non-expired) entry exists.
    async fn exists(&self, key: &str) -> Result<bool, CollectError>;
}

/// In-memory cache store with TTL-on-read semantics.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl InMemoryCacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the store holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CollectError> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(key) {
            if entry.is_expired() {
                entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), CollectError> {
        let entry = CacheEntry::new(key, value, ttl);
        self.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CollectError> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, CollectError> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }
}

/// Derives the cache key for an item id and its configured source set.
///
/// The source set is sorted before hashing so the key is stable under
/// configuration reordering.
#[must_use]
pub fn cache_key(item_id: &str, sources: &[SourceId]) -> String {
    let mut sorted: Vec<&str> = sources.iter().map(SourceId::as_str).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(item_id.as_bytes());
    for source in sorted {
        hasher.update(b"|");
        hasher.update(source.as_bytes());
    }
    format!("profile_data:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_round_trip() {
        let store = InMemoryCacheStore::new();
        store
            .set("k", json!({"a": 1}), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1})));
        assert!(store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let store = InMemoryCacheStore::new();
        store
            .set("k", json!(1), Duration::from_millis(20))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
        // The expired entry was dropped on read, not left behind.
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryCacheStore::new();
        store
            .set("k", json!(1), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[test]
    fn test_cache_key_ignores_source_order() {
        let a = cache_key("item-1", &[SourceId::Hunter, SourceId::LinkedIn]);
        let b = cache_key("item-1", &[SourceId::LinkedIn, SourceId::Hunter]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_cache_key_varies_by_id_and_sources() {
        let a = cache_key("item-1", &[SourceId::Hunter]);
        let b = cache_key("item-2", &[SourceId::Hunter]);
        let c = cache_key("item-1", &[SourceId::Hunter, SourceId::Apollo]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_entry_expiry_flag() {
        let live = CacheEntry::new("k", json!(1), Duration::from_secs(60));
        assert!(!live.is_expired());

        let dead = CacheEntry::new("k", json!(1), Duration::from_secs(0));
        assert!(dead.is_expired());
    }
}
