//! Administrative user management endpoints.
//!
//! Flow Overview:
//! 1) Authenticate the request via bearer token.
//! 2) Require the admin role for every route in this file.
//! 3) Create, list, update, or soft-delete user accounts.
//!
//! Deleting is always a soft delete: the row keeps its history and the email
//! becomes reusable because uniqueness only covers non-deleted users.

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHasher,
};
use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{error, info, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::principal::{require_admin, require_auth, Principal};
use super::auth::types::UserView;
use super::auth::utils::{normalize_email, valid_email};
use super::auth::{find_user_by_id, AuthState};

const DEFAULT_ROLE_CODE: &str = "user";
const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UserCreateRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UserUpdateRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
    pub role: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = UserCreateRequest,
    responses(
        (status = 201, description = "User created", body = UserView),
        (status = 400, description = "Invalid email, password, or role"),
        (status = 401, description = "Missing, invalid, or revoked token"),
        (status = 403, description = "Caller is not an admin"),
        (status = 409, description = "Email already in use"),
    ),
    tag = "users"
)]
pub async fn create_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<UserCreateRequest>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match insert_user(&pool, &principal, payload).await {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    responses(
        (status = 200, description = "All non-deleted users", body = [UserView]),
        (status = 401, description = "Missing, invalid, or revoked token"),
        (status = 403, description = "Caller is not an admin"),
    ),
    tag = "users"
)]
pub async fn list_users(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = require_admin(&principal) {
        return status.into_response();
    }

    match fetch_users(&pool).await {
        Ok(list) => (StatusCode::OK, Json(list)).into_response(),
        Err(err) => {
            error!("Failed to list users: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    params(
        ("id" = Uuid, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "User detail", body = UserView),
        (status = 400, description = "Invalid user id"),
        (status = 401, description = "Missing, invalid, or revoked token"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "User not found"),
    ),
    tag = "users"
)]
pub async fn get_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = require_admin(&principal) {
        return status.into_response();
    }

    let user_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    match find_user_by_id(&pool, user_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(UserView::from(record))).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch user: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    patch,
    path = "/api/v1/users/{id}",
    request_body = UserUpdateRequest,
    params(
        ("id" = Uuid, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "User updated", body = UserView),
        (status = 400, description = "Invalid id, empty update, bad email or password, or unknown role"),
        (status = 401, description = "Missing, invalid, or revoked token"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Email already in use"),
    ),
    tag = "users"
)]
pub async fn patch_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<UserUpdateRequest>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let user_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    match apply_user_update(&pool, &principal, user_id, payload).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    params(
        ("id" = Uuid, Path, description = "User id")
    ),
    responses(
        (status = 204, description = "User soft-deleted"),
        (status = 400, description = "Invalid user id"),
        (status = 401, description = "Missing, invalid, or revoked token"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "User not found"),
    ),
    tag = "users"
)]
pub async fn delete_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = require_admin(&principal) {
        return status.into_response();
    }

    let user_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    match soft_delete_user(&pool, user_id).await {
        Ok(true) => {
            info!(%user_id, admin = %principal.user_id, "user soft-deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to delete user: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug)]
enum ServiceError {
    Forbidden,
    BadRequest(&'static str),
    Conflict(&'static str),
    NotFound,
    Database(sqlx::Error),
    Internal(anyhow::Error),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            Self::Forbidden => StatusCode::FORBIDDEN.into_response(),
            Self::NotFound => StatusCode::NOT_FOUND.into_response(),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            Self::Conflict(message) => (StatusCode::CONFLICT, message).into_response(),
            Self::Database(err) => {
                error!("Failed to handle user request: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            Self::Internal(err) => {
                error!("Failed to handle user request: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| ServiceError::Internal(anyhow::anyhow!("password hashing failed: {err}")))
}

async fn resolve_role_id(pool: &PgPool, code: &str) -> Result<Option<Uuid>, sqlx::Error> {
    let row = sqlx::query("SELECT id FROM roles WHERE code = $1")
        .bind(code)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| row.get("id")))
}

async fn insert_user(
    pool: &PgPool,
    principal: &Principal,
    payload: UserCreateRequest,
) -> Result<UserView, ServiceError> {
    require_admin(principal).map_err(|_| ServiceError::Forbidden)?;

    let email = normalize_email(&payload.email);
    if !valid_email(&email) {
        return Err(ServiceError::BadRequest("Invalid email format"));
    }
    if payload.password.len() < MIN_PASSWORD_LENGTH {
        return Err(ServiceError::BadRequest(
            "Password must be at least 8 characters",
        ));
    }

    let role_code = payload
        .role
        .as_deref()
        .map_or(DEFAULT_ROLE_CODE, str::trim);
    let role_id = resolve_role_id(pool, role_code)
        .await
        .map_err(ServiceError::Database)?
        .ok_or(ServiceError::BadRequest("Unknown role"))?;

    let password_hash = hash_password(&payload.password)?;

    let query = r"
        INSERT INTO users (email, password_hash, first_name, last_name, role_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(&email)
        .bind(&password_hash)
        .bind(payload.first_name.trim())
        .bind(payload.last_name.trim())
        .bind(role_id)
        .fetch_one(pool)
        .instrument(span)
        .await;

    let user_id: Uuid = match row {
        Ok(row) => row.get("id"),
        Err(err) if is_unique_violation(&err) => {
            return Err(ServiceError::Conflict("Email already in use"));
        }
        Err(err) => return Err(ServiceError::Database(err)),
    };

    info!(%user_id, admin = %principal.user_id, "user created");

    find_user_by_id(pool, user_id)
        .await
        .map_err(ServiceError::Internal)?
        .map(UserView::from)
        .ok_or(ServiceError::NotFound)
}

async fn fetch_users(pool: &PgPool) -> Result<Vec<UserView>, anyhow::Error> {
    use anyhow::Context;

    let query = r"
        SELECT
            users.id,
            users.email,
            users.first_name,
            users.last_name,
            roles.code AS role_code,
            users.is_active,
            users.created_at,
            users.updated_at
        FROM users
        JOIN roles ON roles.id = users.role_id
        WHERE users.deleted_at IS NULL
        ORDER BY users.created_at DESC
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list users")?;

    Ok(rows
        .into_iter()
        .map(|row| UserView {
            id: row.get("id"),
            email: row.get("email"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            role_code: row.get("role_code"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
        .collect())
}

/// Validated and normalized PATCH fields, ready to bind.
struct UserUpdate {
    email: Option<String>,
    password_hash: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    is_active: Option<bool>,
    role: Option<String>,
}

fn prepare_user_update(payload: UserUpdateRequest) -> Result<UserUpdate, ServiceError> {
    let email = match payload.email {
        Some(raw) => {
            let email = normalize_email(&raw);
            if !valid_email(&email) {
                return Err(ServiceError::BadRequest("Invalid email format"));
            }
            Some(email)
        }
        None => None,
    };

    let password_hash = match payload.password {
        Some(password) => {
            if password.len() < MIN_PASSWORD_LENGTH {
                return Err(ServiceError::BadRequest(
                    "Password must be at least 8 characters",
                ));
            }
            Some(hash_password(&password)?)
        }
        None => None,
    };

    let update = UserUpdate {
        email,
        password_hash,
        first_name: normalize_optional(payload.first_name),
        last_name: normalize_optional(payload.last_name),
        is_active: payload.is_active,
        role: payload.role,
    };

    if update.email.is_none()
        && update.password_hash.is_none()
        && update.first_name.is_none()
        && update.last_name.is_none()
        && update.is_active.is_none()
        && update.role.is_none()
    {
        return Err(ServiceError::BadRequest("No updates provided"));
    }

    Ok(update)
}

async fn apply_user_update(
    pool: &PgPool,
    principal: &Principal,
    user_id: Uuid,
    payload: UserUpdateRequest,
) -> Result<UserView, ServiceError> {
    require_admin(principal).map_err(|_| ServiceError::Forbidden)?;

    let update = prepare_user_update(payload)?;

    let role_id = match update.role.as_deref().map(str::trim) {
        Some(code) => Some(
            resolve_role_id(pool, code)
                .await
                .map_err(ServiceError::Database)?
                .ok_or(ServiceError::BadRequest("Unknown role"))?,
        ),
        None => None,
    };

    let query = r"
        UPDATE users
        SET
            email = COALESCE($1, email),
            password_hash = COALESCE($2, password_hash),
            first_name = COALESCE($3, first_name),
            last_name = COALESCE($4, last_name),
            is_active = COALESCE($5, is_active),
            role_id = COALESCE($6, role_id),
            updated_at = NOW()
        WHERE id = $7
          AND deleted_at IS NULL
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(update.email)
        .bind(update.password_hash)
        .bind(update.first_name)
        .bind(update.last_name)
        .bind(update.is_active)
        .bind(role_id)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await;

    let row = match row {
        Ok(row) => row,
        Err(err) if is_unique_violation(&err) => {
            return Err(ServiceError::Conflict("Email already in use"));
        }
        Err(err) => return Err(ServiceError::Database(err)),
    };

    if row.is_none() {
        return Err(ServiceError::NotFound);
    }

    find_user_by_id(pool, user_id)
        .await
        .map_err(ServiceError::Internal)?
        .map(UserView::from)
        .ok_or(ServiceError::NotFound)
}

async fn soft_delete_user(pool: &PgPool, user_id: Uuid) -> Result<bool, sqlx::Error> {
    let query = r"
        UPDATE users
        SET deleted_at = NOW(), updated_at = NOW()
        WHERE id = $1
          AND deleted_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
