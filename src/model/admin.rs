use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Admin {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = 1)]
    pub user_id: u64,

    #[schema(example = "Office manager", nullable = true)]
    pub display_name: Option<String>,

    #[schema(example = "2026-01-01T08:00:00Z", format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,
}
