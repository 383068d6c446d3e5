//! Fixed-window login rate limiter with a block period, backed by the store.
//!
//! A counter per key lives under `rate_limit:<key>` with the window as its
//! TTL. Exceeding the budget replaces the counter with a `blocked` marker
//! whose TTL is the block period; while the marker exists every call is
//! rejected with the marker's remaining TTL as the retry hint.
//!
//! The read-modify-write on the counter is not atomic across instances; a
//! concurrent burst can slip one extra attempt through. Acceptable for a
//! login brake, not for billing.

use std::sync::Arc;
use thiserror::Error;

use crate::store::{Store, StoreError};

const KEY_PREFIX: &str = "rate_limit";
const BLOCKED_MARKER: &str = "blocked";

#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    pub max_points: u32,
    pub window_seconds: u64,
    pub block_seconds: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub consumed_points: u32,
    pub remaining_points: u32,
}

#[derive(Error, Debug)]
pub enum RateLimitError {
    /// The caller is over budget. This is a legitimate rejection, not an
    /// infrastructure failure.
    #[error("rate limit exceeded, retry after {retry_after_seconds} seconds")]
    Exceeded { retry_after_seconds: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct RateLimiter {
    store: Arc<dyn Store>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn Store>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{KEY_PREFIX}:{key}")
    }

    /// Spend one point for `key`.
    ///
    /// # Errors
    /// `Exceeded` when the budget is spent or the block marker is active;
    /// `Store` when the backing store fails.
    pub async fn consume(&self, key: &str) -> Result<RateLimitStatus, RateLimitError> {
        let storage_key = self.storage_key(key);

        let Some(value) = self.store.get(&storage_key).await? else {
            self.store
                .set(&storage_key, "1", Some(self.config.window_seconds))
                .await?;
            return Ok(RateLimitStatus {
                consumed_points: 1,
                remaining_points: self.config.max_points.saturating_sub(1),
            });
        };

        if value == BLOCKED_MARKER {
            let retry_after_seconds = self
                .store
                .ttl(&storage_key)
                .await?
                .unwrap_or(self.config.block_seconds);
            return Err(RateLimitError::Exceeded {
                retry_after_seconds,
            });
        }

        // A counter that fails to parse is treated as already spent.
        let consumed = value
            .parse::<u32>()
            .unwrap_or(self.config.max_points)
            .saturating_add(1);

        if consumed > self.config.max_points {
            self.store
                .set(
                    &storage_key,
                    BLOCKED_MARKER,
                    Some(self.config.block_seconds),
                )
                .await?;
            return Err(RateLimitError::Exceeded {
                retry_after_seconds: self.config.block_seconds,
            });
        }

        // Re-set with the remaining window so the increment never extends it.
        let remaining_ttl = self
            .store
            .ttl(&storage_key)
            .await?
            .unwrap_or(self.config.window_seconds);
        self.store
            .set(&storage_key, &consumed.to_string(), Some(remaining_ttl))
            .await?;

        Ok(RateLimitStatus {
            consumed_points: consumed,
            remaining_points: self.config.max_points.saturating_sub(consumed),
        })
    }

    /// Forget all consumed points for `key`.
    ///
    /// # Errors
    /// Returns `Store` when the backing store fails.
    pub async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        self.store.delete(&[self.storage_key(key)]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn limiter(store: Arc<MemoryStore>) -> RateLimiter {
        RateLimiter::new(
            store,
            RateLimitConfig {
                max_points: 5,
                window_seconds: 60,
                block_seconds: 60,
            },
        )
    }

    #[tokio::test]
    async fn sixth_attempt_within_window_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let limiter = limiter(store);

        for attempt in 1..=5u32 {
            let status = limiter.consume("login_attempts:a@b.c").await.expect("ok");
            assert_eq!(status.consumed_points, attempt);
            assert_eq!(status.remaining_points, 5 - attempt);
        }

        let err = limiter
            .consume("login_attempts:a@b.c")
            .await
            .expect_err("sixth attempt");
        assert!(matches!(
            err,
            RateLimitError::Exceeded {
                retry_after_seconds: 60
            }
        ));
    }

    #[tokio::test]
    async fn blocked_retry_after_follows_marker_ttl() {
        let store = Arc::new(MemoryStore::new());
        let limiter = limiter(store.clone());

        for _ in 0..5 {
            limiter.consume("k").await.expect("ok");
        }
        let _ = limiter.consume("k").await.expect_err("blocked");

        store.advance(40);
        let err = limiter.consume("k").await.expect_err("still blocked");
        assert!(matches!(
            err,
            RateLimitError::Exceeded {
                retry_after_seconds: 20
            }
        ));
    }

    #[tokio::test]
    async fn window_expiry_restores_budget() {
        let store = Arc::new(MemoryStore::new());
        let limiter = limiter(store.clone());

        for _ in 0..5 {
            limiter.consume("k").await.expect("ok");
        }
        store.advance(61);

        let status = limiter.consume("k").await.expect("fresh window");
        assert_eq!(status.consumed_points, 1);
    }

    #[tokio::test]
    async fn reset_clears_consumed_points() {
        let store = Arc::new(MemoryStore::new());
        let limiter = limiter(store);

        for _ in 0..5 {
            limiter.consume("k").await.expect("ok");
        }
        limiter.reset("k").await.expect("reset");

        let status = limiter.consume("k").await.expect("clean window");
        assert_eq!(status.consumed_points, 1);
        assert_eq!(status.remaining_points, 4);
    }

    #[tokio::test]
    async fn block_expiry_allows_new_attempts() {
        let store = Arc::new(MemoryStore::new());
        let limiter = limiter(store.clone());

        for _ in 0..6 {
            let _ = limiter.consume("k").await;
        }
        store.advance(61);

        let status = limiter.consume("k").await.expect("block expired");
        assert_eq!(status.consumed_points, 1);
    }
}
