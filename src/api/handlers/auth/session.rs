//! Session endpoints: profile lookup and logout.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};

use super::principal::authenticate_request;
use super::service::revoke_session;
use super::state::AuthState;
use super::types::UserView;
use super::utils::extract_bearer_token;

#[utoipa::path(
    get,
    path = "/api/v1/auth/profile",
    responses(
        (status = 200, description = "Profile of the authenticated user", body = UserView),
        (status = 401, description = "Missing, invalid, or revoked token"),
    ),
    tag = "auth"
)]
pub async fn profile(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    match authenticate_request(&headers, &pool, &auth_state).await {
        Ok(user) => (StatusCode::OK, Json(UserView::from(user))).into_response(),
        Err(status) => status.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/auth/logout",
    responses(
        (status = 204, description = "Token revoked"),
        (status = 401, description = "Missing, invalid, or revoked token"),
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let user = match authenticate_request(&headers, &pool, &auth_state).await {
        Ok(user) => user,
        Err(status) => return status.into_response(),
    };

    // The token passed authentication above, so it is present and valid. The
    // blacklist gets exactly the string the client sent, never a re-signed
    // variant.
    let Some(token) = extract_bearer_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    match revoke_session(&auth_state, &token).await {
        Ok(()) => {
            info!(user_id = %user.id, "session revoked");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            error!("Failed to revoke session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
