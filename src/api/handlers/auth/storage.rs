//! Database lookups shared by the auth handlers.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

/// Full user row joined with its role code. Carries the password hash; only
/// the auth core may see it, the HTTP surface projects to `UserView`.
#[derive(Clone)]
pub(crate) struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) email: String,
    pub(crate) password_hash: String,
    pub(crate) first_name: String,
    pub(crate) last_name: String,
    pub(crate) role_code: String,
    pub(crate) is_active: bool,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

const USER_COLUMNS: &str = r"
        users.id,
        users.email,
        users.password_hash,
        users.first_name,
        users.last_name,
        roles.code AS role_code,
        users.is_active,
        users.created_at,
        users.updated_at
";

fn record_from_row(row: &sqlx::postgres::PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        role_code: row.get("role_code"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Look up a non-deleted user by normalized email.
pub(crate) async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = format!(
        r"
        SELECT {USER_COLUMNS}
        FROM users
        JOIN roles ON roles.id = users.role_id
        WHERE users.email = $1
          AND users.deleted_at IS NULL
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
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;

    Ok(row.as_ref().map(record_from_row))
}

/// Look up a non-deleted user by id.
pub(crate) async fn find_user_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = format!(
        r"
        SELECT {USER_COLUMNS}
        FROM users
        JOIN roles ON roles.id = users.role_id
        WHERE users.id = $1
          AND users.deleted_at IS NULL
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
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by id")?;

    Ok(row.as_ref().map(record_from_row))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_record_holds_values() {
        let now = Utc::now();
        let record = UserRecord {
            id: Uuid::nil(),
            email: "a@example.com".to_string(),
            password_hash: "$argon2id$...".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role_code: "user".to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(record.id, Uuid::nil());
        assert_eq!(record.role_code, "user");
        assert!(record.is_active);
    }
}
