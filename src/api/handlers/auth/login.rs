//! Login endpoint: rate-limited credential check plus token issuance.

use axum::{
    extract::Extension,
    http::{header::RETRY_AFTER, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};

use super::service::{issue_session, validate_credentials, AuthError};
use super::state::AuthState;
use super::types::{LoginRequest, LoginResponse, UserView};
use super::utils::{normalize_email, valid_email};

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login succeeded", body = LoginResponse),
        (status = 400, description = "Malformed email or missing password"),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many login attempts"),
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    let email = normalize_email(&payload.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email format").into_response();
    }
    if payload.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Password is required").into_response();
    }

    let user = match validate_credentials(&pool.0, &auth_state, &email, &payload.password).await {
        Ok(user) => user,
        Err(AuthError::RateLimited {
            retry_after_seconds,
        }) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = retry_after_seconds.to_string().parse() {
                headers.insert(RETRY_AFTER, value);
            }
            let message = AuthError::RateLimited {
                retry_after_seconds,
            }
            .to_string();
            return (StatusCode::TOO_MANY_REQUESTS, headers, message).into_response();
        }
        Err(err @ AuthError::InvalidCredentials) => {
            return (StatusCode::UNAUTHORIZED, err.to_string()).into_response();
        }
        Err(err) => {
            error!("Login failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match issue_session(&auth_state, &user) {
        Ok(access_token) => {
            info!(user_id = %user.id, "user logged in");
            let response = LoginResponse {
                access_token,
                user: UserView::from(user),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => {
            error!("Failed to issue session token: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
