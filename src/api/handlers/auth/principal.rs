//! Authenticated principal extraction and authorization helpers.
//!
//! Flow Overview: read the bearer token, verify signature and expiry, check
//! the revocation list, and resolve the subject to a live user row. Handlers
//! receive a principal with just enough context for role checks.

use axum::http::{HeaderMap, StatusCode};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use super::service::decode_token;
use super::state::AuthState;
use super::storage::{find_user_by_id, UserRecord};
use super::utils::extract_bearer_token;

const ADMIN_ROLE_CODE: &str = "admin";

/// Authenticated user context derived from the bearer token.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub role_code: String,
}

impl Principal {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role_code == ADMIN_ROLE_CODE
    }
}

impl From<&UserRecord> for Principal {
    fn from(record: &UserRecord) -> Self {
        Self {
            user_id: record.id,
            email: record.email.clone(),
            role_code: record.role_code.clone(),
        }
    }
}

/// Resolve the bearer token to a full user record.
///
/// Revoked tokens, expired tokens, and deleted or inactive subjects all
/// return 401; nothing distinguishes them to the caller.
pub(crate) async fn authenticate_request(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<UserRecord, StatusCode> {
    let Some(token) = extract_bearer_token(headers) else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    let claims = decode_token(state, &token).map_err(|_| StatusCode::UNAUTHORIZED)?;

    match state.revocations().is_revoked(&token).await {
        Ok(false) => {}
        Ok(true) => return Err(StatusCode::UNAUTHORIZED),
        Err(err) => {
            error!("Failed to check token revocation: {err}");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    let user = match find_user_by_id(pool, claims.sub).await {
        Ok(user) => user,
        Err(err) => {
            error!("Failed to resolve token subject: {err}");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    match user {
        Some(user) if user.is_active => Ok(user),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Resolve the bearer token into a principal, or return 401.
pub(crate) async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<Principal, StatusCode> {
    authenticate_request(headers, pool, state)
        .await
        .map(|record| Principal::from(&record))
}

/// Gate an already-authenticated request on the admin role.
pub(crate) fn require_admin(principal: &Principal) -> Result<(), StatusCode> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(role_code: &str) -> UserRecord {
        let now = Utc::now();
        UserRecord {
            id: Uuid::new_v4(),
            email: "a@example.com".to_string(),
            password_hash: String::new(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role_code: role_code.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn admin_role_passes_require_admin() {
        let principal = Principal::from(&record("admin"));
        assert!(principal.is_admin());
        assert!(require_admin(&principal).is_ok());
    }

    #[test]
    fn user_role_is_forbidden() {
        let principal = Principal::from(&record("user"));
        assert!(!principal.is_admin());
        assert_eq!(require_admin(&principal), Err(StatusCode::FORBIDDEN));
    }
}
