//! Auth configuration and shared state.

use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;

use super::rate_limit::{RateLimitConfig, RateLimiter};
use super::revocation::RevocationList;
use super::utils::parse_duration_seconds;
use crate::store::{Store, StoreError};

const DEFAULT_TOKEN_TTL: &str = "24h";
const DEFAULT_RATE_LIMIT_ATTEMPTS: u32 = 5;
const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 60;
const DEFAULT_RATE_LIMIT_BLOCK_SECONDS: u64 = 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    jwt_secret: SecretString,
    token_ttl: String,
    rate_limit_attempts: u32,
    rate_limit_window_seconds: u64,
    rate_limit_block_seconds: u64,
    revocation_fail_closed: bool,
}

impl AuthConfig {
    #[must_use]
    pub fn new(jwt_secret: SecretString) -> Self {
        Self {
            jwt_secret,
            token_ttl: DEFAULT_TOKEN_TTL.to_string(),
            rate_limit_attempts: DEFAULT_RATE_LIMIT_ATTEMPTS,
            rate_limit_window_seconds: DEFAULT_RATE_LIMIT_WINDOW_SECONDS,
            rate_limit_block_seconds: DEFAULT_RATE_LIMIT_BLOCK_SECONDS,
            revocation_fail_closed: false,
        }
    }

    #[must_use]
    pub fn with_token_ttl(mut self, ttl: String) -> Self {
        self.token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_rate_limit_attempts(mut self, attempts: u32) -> Self {
        self.rate_limit_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_rate_limit_window_seconds(mut self, seconds: u64) -> Self {
        self.rate_limit_window_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_rate_limit_block_seconds(mut self, seconds: u64) -> Self {
        self.rate_limit_block_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_revocation_fail_closed(mut self, fail_closed: bool) -> Self {
        self.revocation_fail_closed = fail_closed;
        self
    }

    pub(super) fn jwt_secret(&self) -> &SecretString {
        &self.jwt_secret
    }

    #[must_use]
    pub fn token_ttl(&self) -> &str {
        &self.token_ttl
    }

    #[must_use]
    pub fn rate_limit_attempts(&self) -> u32 {
        self.rate_limit_attempts
    }

    #[must_use]
    pub fn rate_limit_window_seconds(&self) -> u64 {
        self.rate_limit_window_seconds
    }

    #[must_use]
    pub fn rate_limit_block_seconds(&self) -> u64 {
        self.rate_limit_block_seconds
    }

    #[must_use]
    pub fn revocation_fail_closed(&self) -> bool {
        self.revocation_fail_closed
    }
}

pub struct AuthState {
    config: AuthConfig,
    limiter: RateLimiter,
    revocations: RevocationList,
    token_ttl_seconds: u64,
}

impl AuthState {
    /// Build the auth state from config and a connected store.
    ///
    /// # Errors
    /// Returns an error when the configured token TTL does not parse; a
    /// malformed lifetime is a startup failure, never a silent default.
    pub fn new(config: AuthConfig, store: Arc<dyn Store>) -> Result<Self> {
        let token_ttl_seconds = parse_duration_seconds(config.token_ttl())
            .with_context(|| format!("invalid token TTL: {:?}", config.token_ttl()))?;

        let limiter = RateLimiter::new(
            store.clone(),
            RateLimitConfig {
                max_points: config.rate_limit_attempts(),
                window_seconds: config.rate_limit_window_seconds(),
                block_seconds: config.rate_limit_block_seconds(),
            },
        );
        let revocations = RevocationList::new(
            store,
            token_ttl_seconds,
            config.revocation_fail_closed(),
        );

        Ok(Self {
            config,
            limiter,
            revocations,
            token_ttl_seconds,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(super) fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub(super) fn revocations(&self) -> &RevocationList {
        &self.revocations
    }

    /// Best-effort cleanup of blacklist entries that lost their TTL. Called
    /// from the periodic maintenance task.
    ///
    /// # Errors
    /// Returns `StoreError` when the store is unavailable.
    pub(crate) async fn sweep_revoked_tokens(&self) -> Result<u64, StoreError> {
        self.revocations.sweep_expired().await
    }

    pub(super) fn token_ttl_seconds(&self) -> u64 {
        self.token_ttl_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn secret() -> SecretString {
        SecretString::from("test-secret")
    }

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new(secret());

        assert_eq!(config.token_ttl(), DEFAULT_TOKEN_TTL);
        assert_eq!(config.rate_limit_attempts(), DEFAULT_RATE_LIMIT_ATTEMPTS);
        assert_eq!(
            config.rate_limit_window_seconds(),
            DEFAULT_RATE_LIMIT_WINDOW_SECONDS
        );
        assert_eq!(
            config.rate_limit_block_seconds(),
            DEFAULT_RATE_LIMIT_BLOCK_SECONDS
        );
        assert!(!config.revocation_fail_closed());

        let config = config
            .with_token_ttl("30m".to_string())
            .with_rate_limit_attempts(3)
            .with_rate_limit_window_seconds(120)
            .with_rate_limit_block_seconds(300)
            .with_revocation_fail_closed(true);

        assert_eq!(config.token_ttl(), "30m");
        assert_eq!(config.rate_limit_attempts(), 3);
        assert_eq!(config.rate_limit_window_seconds(), 120);
        assert_eq!(config.rate_limit_block_seconds(), 300);
        assert!(config.revocation_fail_closed());
    }

    #[test]
    fn auth_state_parses_token_ttl_once() -> Result<()> {
        let config = AuthConfig::new(secret()).with_token_ttl("24h".to_string());
        let state = AuthState::new(config, Arc::new(MemoryStore::new()))?;
        assert_eq!(state.token_ttl_seconds(), 86_400);
        Ok(())
    }

    #[test]
    fn auth_state_rejects_malformed_token_ttl() {
        let config = AuthConfig::new(secret()).with_token_ttl("soon".to_string());
        assert!(AuthState::new(config, Arc::new(MemoryStore::new())).is_err());
    }
}
