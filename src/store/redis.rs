//! Redis-backed [`Store`] implementation.
//!
//! Maintains one multiplexed connection behind a mutex. Every operation
//! verifies liveness first and reconnects under the same lock, so concurrent
//! callers during a cold start or an outage share a single in-flight
//! connection attempt instead of racing duplicates.

use super::{Store, StoreError};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tokio::{
    sync::Mutex,
    time::{sleep, timeout},
};
use tracing::{debug, warn};

const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_BASE_DELAY_MS: u64 = 250;
const CONNECT_MAX_DELAY: Duration = Duration::from_secs(2);
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RedisStore {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisStore {
    /// Parse the URL and create a disconnected store. The first operation
    /// (or an explicit [`Self::connect`]) establishes the connection.
    ///
    /// # Errors
    /// Returns `StoreError::Connection` if the URL is invalid.
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|err| StoreError::Connection(err.to_string()))?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    /// Establish the connection if absent. Idempotent.
    ///
    /// # Errors
    /// Returns `StoreError::Connection` if the server stays unreachable
    /// after the retry budget.
    pub async fn connect(&self) -> Result<(), StoreError> {
        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect_with_backoff().await?);
        }
        Ok(())
    }

    /// Release the connection; the next operation reconnects.
    pub async fn close(&self) {
        let mut guard = self.connection.lock().await;
        *guard = None;
    }

    async fn connect_with_backoff(&self) -> Result<MultiplexedConnection, StoreError> {
        let mut last_error = String::new();

        for attempt in 1..=CONNECT_ATTEMPTS {
            if attempt > 1 {
                let delay = backoff_delay(attempt);
                warn!(
                    attempt,
                    "store connect failed ({last_error}); backing off for {}ms",
                    delay.as_millis()
                );
                sleep(delay).await;
            }

            match timeout(
                ATTEMPT_TIMEOUT,
                self.client.get_multiplexed_async_connection(),
            )
            .await
            {
                Ok(Ok(connection)) => {
                    debug!(attempt, "store connection established");
                    return Ok(connection);
                }
                Ok(Err(err)) => last_error = err.to_string(),
                Err(_) => {
                    last_error = format!(
                        "connection attempt timed out after {}s",
                        ATTEMPT_TIMEOUT.as_secs()
                    );
                }
            }
        }

        Err(StoreError::Connection(format!(
            "giving up after {CONNECT_ATTEMPTS} attempts: {last_error}"
        )))
    }

    /// Return a live connection, probing the cached one with PING and
    /// reconnecting on failure. The lock is held across the probe and the
    /// reconnect so only one attempt is ever in flight.
    async fn ready_connection(&self) -> Result<MultiplexedConnection, StoreError> {
        let mut guard = self.connection.lock().await;

        if let Some(connection) = guard.as_mut() {
            let pong: Result<String, _> = redis::cmd("PING").query_async(connection).await;
            match pong {
                Ok(_) => return Ok(connection.clone()),
                Err(err) => {
                    warn!("store liveness probe failed: {err}; reconnecting");
                    *guard = None;
                }
            }
        }

        let connection = self.connect_with_backoff().await?;
        *guard = Some(connection.clone());
        Ok(connection)
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(2);
    let delay = Duration::from_millis(CONNECT_BASE_DELAY_MS.saturating_mul(1 << exponent));
    delay.min(CONNECT_MAX_DELAY)
}

fn transport(err: redis::RedisError) -> StoreError {
    StoreError::Transport(err.to_string())
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut connection = self.ready_connection().await?;
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut connection)
            .await
            .map_err(transport)
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: Option<u64>,
    ) -> Result<(), StoreError> {
        let mut connection = self.ready_connection().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl_seconds {
            cmd.arg("EX").arg(ttl);
        }
        cmd.query_async::<_, ()>(&mut connection)
            .await
            .map_err(transport)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut connection = self.ready_connection().await?;
        let mut cmd = redis::cmd("DEL");
        for key in keys {
            cmd.arg(key);
        }
        cmd.query_async(&mut connection).await.map_err(transport)
    }

    async fn exists(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut connection = self.ready_connection().await?;
        let mut cmd = redis::cmd("EXISTS");
        for key in keys {
            cmd.arg(key);
        }
        cmd.query_async(&mut connection).await.map_err(transport)
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool, StoreError> {
        let mut connection = self.ready_connection().await?;
        let updated: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_seconds)
            .query_async(&mut connection)
            .await
            .map_err(transport)?;
        Ok(updated == 1)
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut connection = self.ready_connection().await?;
        let remaining: i64 = redis::cmd("TTL")
            .arg(key)
            .query_async(&mut connection)
            .await
            .map_err(transport)?;
        // -2 means the key is missing, -1 means no expiry is set.
        if remaining < 0 {
            Ok(None)
        } else {
            Ok(Some(remaining as u64))
        }
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut connection = self.ready_connection().await?;
        redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut connection)
            .await
            .map_err(transport)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut connection = self.ready_connection().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut connection)
            .await
            .map_err(transport)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_grows_and_caps_at_two_seconds() {
        assert_eq!(backoff_delay(2), Duration::from_millis(250));
        assert_eq!(backoff_delay(3), Duration::from_millis(500));
        assert_eq!(backoff_delay(4), Duration::from_millis(1000));
        assert_eq!(backoff_delay(5), Duration::from_millis(2000));
        assert_eq!(backoff_delay(6), CONNECT_MAX_DELAY);
    }

    #[test]
    fn open_rejects_invalid_url() {
        assert!(RedisStore::open("not a url").is_err());
    }

    #[test]
    fn open_accepts_redis_url() {
        assert!(RedisStore::open("redis://localhost:6379").is_ok());
    }

    // Paused time lets the backoff sleeps auto-advance; port 9 (discard) is
    // expected to refuse the connection.
    #[tokio::test(start_paused = true)]
    async fn concurrent_connects_serialize_behind_the_lock() {
        let store = RedisStore::open("redis://127.0.0.1:9").expect("url");

        let (first, second) = tokio::join!(store.connect(), store.connect());
        assert!(matches!(first, Err(StoreError::Connection(_))));
        assert!(matches!(second, Err(StoreError::Connection(_))));

        // The failed attempts leave no cached connection behind.
        assert!(store.connection.lock().await.is_none());
    }
}
