//! Token revocation list backed by the store.
//!
//! Revoked tokens live under `token_blacklist:<token>` with the session
//! lifetime as TTL, so an entry never outlives the token it blocks and the
//! store cleans up after itself.

use std::sync::Arc;
use tracing::warn;

use crate::store::{Store, StoreError};

const NAMESPACE: &str = "token_blacklist";
const REVOKED_VALUE: &str = "true";

pub struct RevocationList {
    store: Arc<dyn Store>,
    ttl_seconds: u64,
    fail_closed: bool,
}

impl RevocationList {
    pub fn new(store: Arc<dyn Store>, ttl_seconds: u64, fail_closed: bool) -> Self {
        Self {
            store,
            ttl_seconds,
            fail_closed,
        }
    }

    fn storage_key(token: &str) -> String {
        format!("{NAMESPACE}:{token}")
    }

    /// Blacklist a token for the configured session lifetime.
    ///
    /// # Errors
    /// Returns `StoreError` when the entry cannot be written; revocation is
    /// never silently dropped.
    pub async fn revoke(&self, token: &str) -> Result<(), StoreError> {
        self.store
            .set(
                &Self::storage_key(token),
                REVOKED_VALUE,
                Some(self.ttl_seconds),
            )
            .await
    }

    /// Check whether a token has been revoked.
    ///
    /// Store failures are treated as "not revoked" (logged) unless the list
    /// was configured fail-closed, in which case the error propagates and the
    /// caller must reject the request.
    ///
    /// # Errors
    /// Only in fail-closed mode, when the store is unavailable.
    pub async fn is_revoked(&self, token: &str) -> Result<bool, StoreError> {
        match self.store.get(&Self::storage_key(token)).await {
            Ok(value) => Ok(value.as_deref() == Some(REVOKED_VALUE)),
            Err(err) if !self.fail_closed => {
                warn!("revocation lookup failed, treating token as valid: {err}");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Remove blacklist entries that lost their TTL (e.g. written by an older
    /// deployment or a manual `PERSIST`). TTL self-expiry is the primary
    /// cleanup; this sweep only catches stragglers.
    ///
    /// # Errors
    /// Returns `StoreError` when listing or deleting fails.
    pub async fn sweep_expired(&self) -> Result<u64, StoreError> {
        let keys = self.store.keys_matching(&format!("{NAMESPACE}:*")).await?;

        let mut stale = Vec::new();
        for key in keys {
            if self.store.ttl(&key).await?.is_none() {
                stale.push(key);
            }
        }

        if stale.is_empty() {
            return Ok(0);
        }
        self.store.delete(&stale).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl Store for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Transport("connection reset".to_string()))
        }

        async fn set(
            &self,
            _key: &str,
            _value: &str,
            _ttl_seconds: Option<u64>,
        ) -> Result<(), StoreError> {
            Err(StoreError::Transport("connection reset".to_string()))
        }

        async fn delete(&self, _keys: &[String]) -> Result<u64, StoreError> {
            Err(StoreError::Transport("connection reset".to_string()))
        }

        async fn exists(&self, _keys: &[String]) -> Result<u64, StoreError> {
            Err(StoreError::Transport("connection reset".to_string()))
        }

        async fn expire(&self, _key: &str, _ttl_seconds: u64) -> Result<bool, StoreError> {
            Err(StoreError::Transport("connection reset".to_string()))
        }

        async fn ttl(&self, _key: &str) -> Result<Option<u64>, StoreError> {
            Err(StoreError::Transport("connection reset".to_string()))
        }

        async fn keys_matching(&self, _pattern: &str) -> Result<Vec<String>, StoreError> {
            Err(StoreError::Transport("connection reset".to_string()))
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Transport("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn revoked_token_is_detected_until_ttl_expires() {
        let store = Arc::new(MemoryStore::new());
        let list = RevocationList::new(store.clone(), 3600, false);

        list.revoke("token-a").await.expect("revoke");
        assert!(list.is_revoked("token-a").await.expect("lookup"));
        assert!(!list.is_revoked("token-b").await.expect("lookup"));

        store.advance(3600);
        assert!(!list.is_revoked("token-a").await.expect("lookup"));
    }

    #[tokio::test]
    async fn fail_open_treats_store_errors_as_not_revoked() {
        let list = RevocationList::new(Arc::new(BrokenStore), 3600, false);
        assert!(!list.is_revoked("token").await.expect("fail open"));
    }

    #[tokio::test]
    async fn fail_closed_propagates_store_errors() {
        let list = RevocationList::new(Arc::new(BrokenStore), 3600, true);
        assert!(list.is_revoked("token").await.is_err());
    }

    #[tokio::test]
    async fn sweep_removes_entries_without_ttl() {
        let store = Arc::new(MemoryStore::new());
        let list = RevocationList::new(store.clone(), 3600, false);

        list.revoke("fresh").await.expect("revoke");
        // Entry written without a TTL simulates a stale deployment artifact.
        store
            .set("token_blacklist:stale", "true", None)
            .await
            .expect("set");
        store
            .set("unrelated:key", "keep", None)
            .await
            .expect("set");

        let removed = list.sweep_expired().await.expect("sweep");
        assert_eq!(removed, 1);
        assert!(list.is_revoked("fresh").await.expect("lookup"));
        assert_eq!(
            store.get("unrelated:key").await.expect("get"),
            Some("keep".to_string())
        );
    }
}
