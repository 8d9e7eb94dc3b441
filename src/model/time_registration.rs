use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};
use utoipa::ToSchema;

use super::Pagination;
use crate::validation::ValidationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct TimeRegistration {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = 1)]
    pub worker_id: u64,

    #[schema(example = "2026-01-05T07:58:00Z", format = "date-time", value_type = String)]
    pub clock_in: DateTime<Utc>,

    #[schema(example = "2026-01-05T16:02:00Z", format = "date-time", value_type = Option<String>)]
    pub clock_out: Option<DateTime<Utc>>,

    #[schema(example = "2026-01-05T07:58:00Z", format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,
}

impl TimeRegistration {
    pub fn is_open(&self) -> bool {
        self.clock_out.is_none()
    }

    /// Worked time. Open registrations count up to `now`, never negative.
    pub fn worked(&self, now: DateTime<Utc>) -> Duration {
        let end = self.clock_out.unwrap_or(now);
        (end - self.clock_in).max(Duration::zero())
    }
}

/// Registration joined with the worker's name, used by listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct TimeRegistrationEntry {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = 1)]
    pub worker_id: u64,

    #[schema(example = "Ada")]
    pub first_name: String,

    #[schema(example = "Lovelace")]
    pub last_name: String,

    #[schema(example = "2026-01-05T07:58:00Z", format = "date-time", value_type = String)]
    pub clock_in: DateTime<Utc>,

    #[schema(example = "2026-01-05T16:02:00Z", format = "date-time", value_type = Option<String>)]
    pub clock_out: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ClockAction {
    ClockIn,
    ClockOut,
}

/// Outcome of a clock toggle.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockEvent {
    pub action: ClockAction,
    pub registration: TimeRegistration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    /// Inclusive lower bound on `clock_in`
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `clock_in`
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// The UTC calendar day containing `at`.
    pub fn day_of(at: DateTime<Utc>) -> Self {
        let start = at.date_naive().and_time(NaiveTime::MIN).and_utc();
        Self {
            from: Some(start),
            to: Some(start + Duration::days(1)),
        }
    }

    pub fn is_valid(&self) -> bool {
        match (self.from, self.to) {
            (Some(from), Some(to)) => from < to,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationFilter {
    pub worker_id: Option<u64>,
    pub range: TimeRange,
    /// `Some(true)` only open, `Some(false)` only closed registrations
    pub open: Option<bool>,
    pub pagination: Pagination,
}

/// Corrections an admin applies to an existing registration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationChanges {
    pub clock_in: Option<DateTime<Utc>>,
    pub clock_out: Option<DateTime<Utc>>,
}

impl RegistrationChanges {
    pub fn is_empty(&self) -> bool {
        self.clock_in.is_none() && self.clock_out.is_none()
    }

    /// The registration as it would look after the changes. Fails if the
    /// clock-out would end up before the clock-in.
    pub fn merged(&self, current: &TimeRegistration) -> Result<TimeRegistration, ValidationError> {
        let merged = TimeRegistration {
            clock_in: self.clock_in.unwrap_or(current.clock_in),
            clock_out: self.clock_out.or(current.clock_out),
            ..current.clone()
        };

        match merged.clock_out {
            Some(out) if out < merged.clock_in => Err(ValidationError::InvalidFormat {
                field: "clock_out",
                reason: "must not be before clock_in",
            }),
            _ => Ok(merged),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct WorkSummary {
    #[schema(example = 1)]
    pub worker_id: u64,
    #[schema(example = 5)]
    pub registrations: usize,
    #[schema(example = 144000)]
    pub total_seconds: i64,
    #[schema(example = false)]
    pub clocked_in: bool,
}

impl WorkSummary {
    pub fn compute(worker_id: u64, registrations: &[TimeRegistration], now: DateTime<Utc>) -> Self {
        let total = registrations
            .iter()
            .fold(Duration::zero(), |acc, r| acc + r.worked(now));

        Self {
            worker_id,
            registrations: registrations.len(),
            total_seconds: total.num_seconds(),
            clocked_in: registrations.iter().any(TimeRegistration::is_open),
        }
    }
}
