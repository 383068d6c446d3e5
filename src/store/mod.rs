//! Key-value store abstraction backing the rate limiter and the token
//! revocation list.
//!
//! The trait covers the handful of primitives the auth core needs; the
//! production implementation is [`redis::RedisStore`], and
//! [`memory::MemoryStore`] provides a deterministic in-memory variant for
//! tests and local development.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use thiserror::Error;

pub use self::redis::RedisStore;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The store server could not be reached after the internal retry budget.
    #[error("store connection failed: {0}")]
    Connection(String),

    /// A transport failure on an established connection. Not retried at this
    /// layer; retry policy belongs to callers.
    #[error("store operation failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set overwrites; `ttl_seconds` of `None` leaves the key without expiry.
    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: Option<u64>,
    ) -> Result<(), StoreError>;

    /// Returns the number of keys removed.
    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Returns the number of keys that exist.
    async fn exists(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Returns false when the key is missing.
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool, StoreError>;

    /// Remaining TTL in seconds; `None` for missing keys or keys without
    /// expiry.
    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError>;

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
