//! Task CRUD endpoints, scoped to the authenticated owner.
//!
//! Flow Overview:
//! 1) Authenticate the request via bearer token.
//! 2) Scope every query to the caller's `user_id`.
//! 3) Soft-delete only; a `deleted_at` row is indistinguishable from a
//!    missing one.
//!
//! A task owned by someone else answers 404, the same as a task that does
//! not exist, so ids cannot be probed across accounts.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{error, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::principal::require_auth;
use super::auth::AuthState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "tasks_status_enum", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "tasks_priority_enum", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct TaskCreateRequest {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct TaskUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskListResponse {
    pub data: Vec<TaskResponse>,
    pub total: i64,
}

#[utoipa::path(
    post,
    path = "/api/v1/tasks",
    request_body = TaskCreateRequest,
    responses(
        (status = 201, description = "Task created", body = TaskResponse),
        (status = 400, description = "Missing title"),
        (status = 401, description = "Missing, invalid, or revoked token"),
    ),
    tag = "tasks"
)]
pub async fn create_task(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<TaskCreateRequest>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return (StatusCode::BAD_REQUEST, "Title is required").into_response();
    }

    match insert_task(&pool, principal.user_id, &title, &payload).await {
        Ok(task) => (StatusCode::CREATED, Json(task)).into_response(),
        Err(err) => {
            error!("Failed to create task: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/tasks",
    responses(
        (status = 200, description = "Tasks owned by the caller", body = TaskListResponse),
        (status = 401, description = "Missing, invalid, or revoked token"),
    ),
    tag = "tasks"
)]
pub async fn list_tasks(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match fetch_tasks(&pool, principal.user_id).await {
        Ok(data) => {
            let total = data.len() as i64;
            (StatusCode::OK, Json(TaskListResponse { data, total })).into_response()
        }
        Err(err) => {
            error!("Failed to list tasks: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/tasks/{id}",
    params(
        ("id" = Uuid, Path, description = "Task id")
    ),
    responses(
        (status = 200, description = "Task detail", body = TaskResponse),
        (status = 400, description = "Invalid task id"),
        (status = 401, description = "Missing, invalid, or revoked token"),
        (status = 404, description = "Task not found or owned by another user"),
    ),
    tag = "tasks"
)]
pub async fn get_task(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let task_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    match fetch_task(&pool, principal.user_id, task_id).await {
        Ok(Some(task)) => (StatusCode::OK, Json(task)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch task: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    patch,
    path = "/api/v1/tasks/{id}",
    request_body = TaskUpdateRequest,
    params(
        ("id" = Uuid, Path, description = "Task id")
    ),
    responses(
        (status = 200, description = "Task updated", body = TaskResponse),
        (status = 400, description = "Invalid id or empty update"),
        (status = 401, description = "Missing, invalid, or revoked token"),
        (status = 404, description = "Task not found or owned by another user"),
    ),
    tag = "tasks"
)]
pub async fn update_task(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<TaskUpdateRequest>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let task_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    if !has_updates(&payload) {
        return (StatusCode::BAD_REQUEST, "No updates provided").into_response();
    }

    if let Some(title) = &payload.title {
        if title.trim().is_empty() {
            return (StatusCode::BAD_REQUEST, "Title cannot be empty").into_response();
        }
    }

    match apply_task_update(&pool, principal.user_id, task_id, &payload).await {
        Ok(Some(task)) => (StatusCode::OK, Json(task)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to update task: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/tasks/{id}",
    params(
        ("id" = Uuid, Path, description = "Task id")
    ),
    responses(
        (status = 204, description = "Task soft-deleted"),
        (status = 400, description = "Invalid task id"),
        (status = 401, description = "Missing, invalid, or revoked token"),
        (status = 404, description = "Task not found or owned by another user"),
    ),
    tag = "tasks"
)]
pub async fn delete_task(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let task_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    match soft_delete_task(&pool, principal.user_id, task_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to delete task: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn has_updates(payload: &TaskUpdateRequest) -> bool {
    payload.title.is_some()
        || payload.description.is_some()
        || payload.status.is_some()
        || payload.priority.is_some()
        || payload.due_date.is_some()
}

const TASK_COLUMNS: &str = r"
        id, title, description, status, priority, due_date,
        created_at, updated_at, user_id
";

fn task_from_row(row: &sqlx::postgres::PgRow) -> TaskResponse {
    TaskResponse {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        status: row.get("status"),
        priority: row.get("priority"),
        due_date: row.get("due_date"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        user_id: row.get("user_id"),
    }
}

async fn insert_task(
    pool: &PgPool,
    user_id: Uuid,
    title: &str,
    payload: &TaskCreateRequest,
) -> Result<TaskResponse, sqlx::Error> {
    let query = format!(
        r"
        INSERT INTO tasks (title, description, status, priority, due_date, user_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {TASK_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(title)
        .bind(&payload.description)
        .bind(payload.status.unwrap_or(TaskStatus::Pending))
        .bind(payload.priority.unwrap_or(TaskPriority::Medium))
        .bind(payload.due_date)
        .bind(user_id)
        .fetch_one(pool)
        .instrument(span)
        .await?;
    Ok(task_from_row(&row))
}

async fn fetch_tasks(pool: &PgPool, user_id: Uuid) -> Result<Vec<TaskResponse>, sqlx::Error> {
    let query = format!(
        r"
        SELECT {TASK_COLUMNS}
        FROM tasks
        WHERE user_id = $1
          AND deleted_at IS NULL
        ORDER BY created_at DESC
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await?;
    Ok(rows.iter().map(task_from_row).collect())
}

async fn fetch_task(
    pool: &PgPool,
    user_id: Uuid,
    task_id: Uuid,
) -> Result<Option<TaskResponse>, sqlx::Error> {
    let query = format!(
        r"
        SELECT {TASK_COLUMNS}
        FROM tasks
        WHERE id = $1
          AND user_id = $2
          AND deleted_at IS NULL
        LIMIT 1
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await?;
    Ok(row.as_ref().map(task_from_row))
}

async fn apply_task_update(
    pool: &PgPool,
    user_id: Uuid,
    task_id: Uuid,
    payload: &TaskUpdateRequest,
) -> Result<Option<TaskResponse>, sqlx::Error> {
    let query = format!(
        r"
        UPDATE tasks
        SET
            title = COALESCE($1, title),
            description = COALESCE($2, description),
            status = COALESCE($3, status),
            priority = COALESCE($4, priority),
            due_date = COALESCE($5, due_date),
            updated_at = NOW()
        WHERE id = $6
          AND user_id = $7
          AND deleted_at IS NULL
        RETURNING {TASK_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let title = payload.title.as_ref().map(|title| title.trim().to_string());
    let row = sqlx::query(&query)
        .bind(title)
        .bind(&payload.description)
        .bind(payload.status)
        .bind(payload.priority)
        .bind(payload.due_date)
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await?;
    Ok(row.as_ref().map(task_from_row))
}

async fn soft_delete_task(
    pool: &PgPool,
    user_id: Uuid,
    task_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let query = r"
        UPDATE tasks
        SET deleted_at = NOW(), updated_at = NOW()
        WHERE id = $1
          AND user_id = $2
          AND deleted_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(task_id)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn task_status_serializes_snake_case() -> Result<()> {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress)?,
            r#""in_progress""#
        );
        let status: TaskStatus = serde_json::from_str(r#""cancelled""#)?;
        assert_eq!(status, TaskStatus::Cancelled);
        Ok(())
    }

    #[test]
    fn task_priority_serializes_snake_case() -> Result<()> {
        assert_eq!(serde_json::to_string(&TaskPriority::Urgent)?, r#""urgent""#);
        let priority: TaskPriority = serde_json::from_str(r#""low""#)?;
        assert_eq!(priority, TaskPriority::Low);
        Ok(())
    }

    #[test]
    fn update_request_rejects_unknown_fields() {
        let result =
            serde_json::from_str::<TaskUpdateRequest>(r#"{"title":"x","owner":"someone"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn has_updates_detects_empty_patch() -> Result<()> {
        let empty: TaskUpdateRequest = serde_json::from_str("{}")?;
        assert!(!has_updates(&empty));

        let patch: TaskUpdateRequest = serde_json::from_str(r#"{"status":"completed"}"#)?;
        assert!(has_updates(&patch));
        Ok(())
    }
}
