//! Credential validation, token issuance, and session revocation.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use super::rate_limit::RateLimitError;
use super::state::AuthState;
use super::storage::{find_user_by_email, UserRecord};
use super::utils::normalize_email;
use crate::store::StoreError;

const LOGIN_ATTEMPTS_KEY: &str = "login_attempts";

#[derive(Error, Debug)]
pub enum AuthError {
    /// The login brake tripped; the message is surfaced verbatim to clients.
    #[error("Too many login attempts, retry after {retry_after_seconds} seconds")]
    RateLimited { retry_after_seconds: u64 },

    /// Unknown email, inactive account, and password mismatch all collapse
    /// into this one message so responses never reveal which check failed.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("database lookup failed: {0}")]
    Database(#[source] anyhow::Error),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl From<RateLimitError> for AuthError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Exceeded {
                retry_after_seconds,
            } => Self::RateLimited {
                retry_after_seconds,
            },
            RateLimitError::Store(err) => Self::Store(err),
        }
    }
}

/// JWT payload. `sub` is the user id; expiry is enforced on decode.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub(crate) struct Claims {
    pub(crate) sub: Uuid,
    pub(crate) email: String,
    pub(crate) iat: i64,
    pub(crate) exp: i64,
}

/// Seam between the credential check and user persistence. Production uses
/// the sqlx pool; tests substitute fixtures.
#[async_trait]
pub(crate) trait CredentialSource: Send + Sync {
    async fn user_by_email(&self, email: &str) -> anyhow::Result<Option<UserRecord>>;
}

#[async_trait]
impl CredentialSource for PgPool {
    async fn user_by_email(&self, email: &str) -> anyhow::Result<Option<UserRecord>> {
        find_user_by_email(self, email).await
    }
}

/// Check a login attempt against the rate limiter and the user table.
///
/// The limiter point is spent before the user lookup, so lookup cost is
/// gated behind the brake. The key is reset only after the password matched:
/// a proven credential holder gets a clean window.
///
/// # Errors
/// `RateLimited` when over budget, `InvalidCredentials` for any
/// unknown/inactive/mismatch outcome, `Store`/`Database` for infrastructure
/// failures.
pub(crate) async fn validate_credentials(
    users: &dyn CredentialSource,
    state: &AuthState,
    email: &str,
    password: &str,
) -> Result<UserRecord, AuthError> {
    let email = normalize_email(email);
    let limiter_key = format!("{LOGIN_ATTEMPTS_KEY}:{email}");

    state.limiter().consume(&limiter_key).await?;

    let user = users
        .user_by_email(&email)
        .await
        .map_err(AuthError::Database)?
        .ok_or(AuthError::InvalidCredentials)?;

    if !user.is_active {
        return Err(AuthError::InvalidCredentials);
    }

    let parsed_hash =
        PasswordHash::new(&user.password_hash).map_err(|_| AuthError::InvalidCredentials)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)?;

    state.limiter().reset(&limiter_key).await?;

    Ok(user)
}

/// Sign a session token for an already-validated user.
///
/// # Errors
/// Returns `Token` when signing fails.
pub(crate) fn issue_session(state: &AuthState, user: &UserRecord) -> Result<String, AuthError> {
    let iat = Utc::now().timestamp();
    let ttl = i64::try_from(state.token_ttl_seconds()).unwrap_or(i64::MAX);
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        iat,
        exp: iat.saturating_add(ttl),
    };

    let key = EncodingKey::from_secret(state.config().jwt_secret().expose_secret().as_bytes());
    Ok(jsonwebtoken::encode(&Header::default(), &claims, &key)?)
}

/// Verify signature and expiry of a bearer token.
///
/// # Errors
/// Returns `Token` for malformed, tampered, or expired tokens.
pub(crate) fn decode_token(state: &AuthState, token: &str) -> Result<Claims, AuthError> {
    let key = DecodingKey::from_secret(state.config().jwt_secret().expose_secret().as_bytes());
    let data = jsonwebtoken::decode::<Claims>(token, &key, &Validation::new(Algorithm::HS256))?;
    Ok(data.claims)
}

/// Blacklist the presented token for the remainder of its lifetime.
///
/// # Errors
/// Returns `Store` when the revocation entry cannot be written.
pub(crate) async fn revoke_session(state: &AuthState, token: &str) -> Result<(), AuthError> {
    state.revocations().revoke(token).await?;
    Ok(())
}
