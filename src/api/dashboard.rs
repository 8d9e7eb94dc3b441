use crate::{
    auth::session::AdminSession,
    backend::Backend,
    error::ApiError,
    model::{
        Pagination,
        time_registration::{RegistrationFilter, TimeRange, TimeRegistrationEntry},
    },
};
use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::Serialize;
use tracing::debug;
use utoipa::ToSchema;

/// Upper bound on how many open registrations the dashboard lists.
const CLOCKED_IN_LIMIT: u32 = 100;

#[derive(Serialize, ToSchema)]
pub struct DashboardResponse {
    #[schema(example = 12)]
    pub total_workers: i64,
    #[schema(example = 10)]
    pub active_workers: i64,
    /// Open registrations, most recent clock-in first
    pub clocked_in: Vec<TimeRegistrationEntry>,
    /// Registrations with a clock-in on the current UTC day
    #[schema(example = 8)]
    pub registrations_today: i64,
}

/// Admin dashboard figures
#[utoipa::path(
    get,
    path = "/api/admin/dashboard",
    responses(
        (status = 200, description = "Dashboard figures", body = DashboardResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    tag = "Admin"
)]
pub async fn dashboard(
    auth: AdminSession,
    backend: web::Data<dyn Backend>,
) -> Result<HttpResponse, ApiError> {
    debug!(admin_id = auth.admin.id, "Loading dashboard");

    let counts = backend.count_workers().await?;

    let clocked_in = backend
        .list_time_registrations(&RegistrationFilter {
            open: Some(true),
            pagination: Pagination::new(None, Some(CLOCKED_IN_LIMIT)),
            ..Default::default()
        })
        .await?;

    // only the total matters here
    let today = backend
        .list_time_registrations(&RegistrationFilter {
            range: TimeRange::day_of(Utc::now()),
            pagination: Pagination::new(None, Some(1)),
            ..Default::default()
        })
        .await?;

    Ok(HttpResponse::Ok().json(DashboardResponse {
        total_workers: counts.total,
        active_workers: counts.active,
        clocked_in: clocked_in.data,
        registrations_today: today.total,
    }))
}
