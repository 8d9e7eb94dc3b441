use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Pagination;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "first_name": "Ada",
        "last_name": "Lovelace",
        "pin": "1234",
        "department": "Bakery",
        "is_active": true,
        "created_at": "2026-01-01T08:00:00Z",
        "updated_at": "2026-01-01T08:00:00Z"
    })
)]
pub struct Worker {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = "Ada")]
    pub first_name: String,

    #[schema(example = "Lovelace")]
    pub last_name: String,

    #[schema(example = "1234")]
    pub pin: String,

    #[schema(example = "Bakery", nullable = true)]
    pub department: Option<String>,

    #[schema(example = true)]
    pub is_active: bool,

    #[schema(example = "2026-01-01T08:00:00Z", format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,

    #[schema(example = "2026-01-01T08:00:00Z", format = "date-time", value_type = String)]
    pub updated_at: DateTime<Utc>,
}

/// A validated worker, ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWorker {
    pub first_name: String,
    pub last_name: String,
    pub pin: String,
    pub department: Option<String>,
    pub is_active: bool,
}

/// A validated partial update. `department: Some(None)` clears the department.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub pin: Option<String>,
    pub department: Option<Option<String>>,
    pub is_active: Option<bool>,
}

impl WorkerChanges {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.pin.is_none()
            && self.department.is_none()
            && self.is_active.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkerFilter {
    /// Matches first or last name, case-insensitive
    pub search: Option<String>,
    pub department: Option<String>,
    pub is_active: Option<bool>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerCounts {
    pub total: i64,
    pub active: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_changes_are_detected() {
        assert!(WorkerChanges::default().is_empty());
        assert!(
            !WorkerChanges {
                department: Some(None),
                ..Default::default()
            }
            .is_empty()
        );
    }
}
