//! Request/response types for auth endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::storage::UserRecord;

#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct LoginResponse {
    pub access_token: String,
    pub user: UserView,
}

/// Public projection of a user row. The password hash never crosses this
/// boundary.
#[derive(ToSchema, Serialize, Debug)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role_code: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRecord> for UserView {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            first_name: record.first_name,
            last_name: record.last_name,
            role_code: record.role_code,
            is_active: record.is_active,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn user_view_never_serializes_password_hash() -> Result<()> {
        let now = Utc::now();
        let record = UserRecord {
            id: Uuid::new_v4(),
            email: "a@example.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role_code: "user".to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let serialized = serde_json::to_string(&UserView::from(record))?;
        assert!(!serialized.contains("password"));
        assert!(!serialized.contains("argon2"));
        assert!(serialized.contains("\"role_code\":\"user\""));
        Ok(())
    }

    #[test]
    fn user_view_names_the_role_field_role_code() -> Result<()> {
        let now = Utc::now();
        let view = UserView {
            id: Uuid::nil(),
            email: "a@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role_code: "admin".to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let value: serde_json::Value = serde_json::to_value(&view)?;
        assert_eq!(value["role_code"], "admin");
        assert!(value.get("role").is_none());
        Ok(())
    }

    #[test]
    fn login_request_deserializes() -> Result<()> {
        let request: LoginRequest =
            serde_json::from_str(r#"{"email":"a@b.c","password":"hunter2"}"#)?;
        assert_eq!(request.email, "a@b.c");
        assert_eq!(request.password, "hunter2");
        Ok(())
    }
}
