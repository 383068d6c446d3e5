//! In-memory [`Store`] used by the test suite and for local development
//! without a Redis server.
//!
//! Expiry runs on a logical clock that starts at zero and only moves when
//! [`MemoryStore::advance`] is called, which keeps TTL behavior
//! deterministic in tests.

use super::{Store, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

struct Entry {
    value: String,
    /// Logical second at which the entry disappears; `None` means no expiry.
    expires_at: Option<u64>,
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Mutex<u64>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the logical clock forward, expiring entries along the way.
    pub fn advance(&self, seconds: u64) {
        let mut clock = self.clock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *clock += seconds;
        let now = *clock;
        drop(clock);

        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.retain(|_, entry| entry.expires_at.map_or(true, |at| at > now));
    }

    fn now(&self) -> u64 {
        *self.clock.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn live_value(&self, key: &str) -> Option<(String, Option<u64>)> {
        let now = self.now();
        let entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.get(key).and_then(|entry| {
            if entry.expires_at.is_some_and(|at| at <= now) {
                None
            } else {
                Some((entry.value.clone(), entry.expires_at))
            }
        })
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.live_value(key).map(|(value, _)| value))
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: Option<u64>,
    ) -> Result<(), StoreError> {
        let expires_at = ttl_seconds.map(|ttl| self.now() + ttl);
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut removed = 0;
        for key in keys {
            if entries.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn exists(&self, keys: &[String]) -> Result<u64, StoreError> {
        let mut count = 0;
        for key in keys {
            if self.live_value(key).is_some() {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool, StoreError> {
        if self.live_value(key).is_none() {
            return Ok(false);
        }
        let expires_at = Some(self.now() + ttl_seconds);
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = expires_at;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = self.now();
        Ok(self
            .live_value(key)
            .and_then(|(_, expires_at)| expires_at)
            .map(|at| at - now))
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        // Only the `prefix*` form is needed by callers.
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        let now = self.now();
        let entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(entries
            .iter()
            .filter(|(key, entry)| {
                key.starts_with(prefix) && entry.expires_at.map_or(true, |at| at > now)
            })
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_roundtrip() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await.expect("set");
        assert_eq!(store.get("k").await.expect("get"), Some("v".to_string()));
    }

    #[tokio::test]
    async fn entries_expire_when_clock_advances() {
        let store = MemoryStore::new();
        store.set("k", "v", Some(10)).await.expect("set");
        assert_eq!(store.ttl("k").await.expect("ttl"), Some(10));

        store.advance(9);
        assert!(store.get("k").await.expect("get").is_some());
        assert_eq!(store.ttl("k").await.expect("ttl"), Some(1));

        store.advance(1);
        assert!(store.get("k").await.expect("get").is_none());
        assert_eq!(store.ttl("k").await.expect("ttl"), None);
    }

    #[tokio::test]
    async fn delete_counts_removed_keys() {
        let store = MemoryStore::new();
        store.set("a", "1", None).await.expect("set");
        store.set("b", "2", None).await.expect("set");
        let removed = store
            .delete(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .expect("delete");
        assert_eq!(removed, 2);
    }

    #[tokio::test]
    async fn keys_matching_filters_by_prefix() {
        let store = MemoryStore::new();
        store.set("ns:a", "1", None).await.expect("set");
        store.set("ns:b", "2", None).await.expect("set");
        store.set("other", "3", None).await.expect("set");

        let mut keys = store.keys_matching("ns:*").await.expect("keys");
        keys.sort();
        assert_eq!(keys, vec!["ns:a".to_string(), "ns:b".to_string()]);
    }

    #[tokio::test]
    async fn expire_updates_deadline() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await.expect("set");
        assert!(store.expire("k", 5).await.expect("expire"));
        store.advance(5);
        assert!(store.get("k").await.expect("get").is_none());
        assert!(!store.expire("missing", 5).await.expect("expire"));
    }
}
