use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// An authentication account. Whether it may manage anything is decided by
/// the presence of an [`Admin`](super::admin::Admin) row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct User {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = "admin@timefly.app")]
    pub email: String,

    #[schema(example = "2026-01-01T08:00:00Z", format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,

    #[schema(example = "2026-01-02T08:00:00Z", format = "date-time", value_type = Option<String>)]
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

/// `users` row including the password hash, never serialized.
#[derive(sqlx::FromRow)]
pub struct UserSql {
    pub id: u64,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

impl From<UserSql> for User {
    fn from(row: UserSql) -> Self {
        Self {
            id: row.id,
            email: row.email,
            created_at: row.created_at,
            last_sign_in_at: row.last_sign_in_at,
        }
    }
}
