use crate::{
    api::MessageResponse,
    auth::session::AdminSession,
    backend::Backend,
    error::ApiError,
    model::{
        Pagination,
        time_registration::{
            RegistrationChanges, RegistrationFilter, TimeRange, TimeRegistration,
            TimeRegistrationEntry,
        },
    },
    validation::ValidationError,
};
use actix_web::{HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RegistrationQuery {
    pub worker_id: Option<u64>,
    /// Inclusive lower bound on clock-in, RFC 3339
    #[param(value_type = Option<String>, example = "2026-01-05T00:00:00Z")]
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on clock-in, RFC 3339
    #[param(value_type = Option<String>, example = "2026-01-06T00:00:00Z")]
    pub to: Option<DateTime<Utc>>,
    /// true for open registrations only, false for closed ones only
    pub open: Option<bool>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl RegistrationQuery {
    fn to_filter(&self) -> Result<RegistrationFilter, ValidationError> {
        let range = TimeRange {
            from: self.from,
            to: self.to,
        };
        if !range.is_valid() {
            return Err(ValidationError::InvalidFormat {
                field: "from",
                reason: "must be before to",
            });
        }

        Ok(RegistrationFilter {
            worker_id: self.worker_id,
            range,
            open: self.open,
            pagination: Pagination::new(self.page, self.per_page),
        })
    }
}

#[derive(Serialize, ToSchema)]
pub struct RegistrationListResponse {
    pub data: Vec<TimeRegistrationEntry>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 120)]
    pub total: i64,
}

#[derive(Deserialize, Default, ToSchema)]
pub struct UpdateRegistration {
    #[schema(example = "2026-01-05T08:00:00Z", format = "date-time", value_type = Option<String>)]
    pub clock_in: Option<DateTime<Utc>>,
    #[schema(example = "2026-01-05T16:30:00Z", format = "date-time", value_type = Option<String>)]
    pub clock_out: Option<DateTime<Utc>>,
}

fn registration_not_found() -> ApiError {
    ApiError::NotFound("Time registration not found".into())
}

/// List time registrations, newest first
#[utoipa::path(
    get,
    path = "/api/time-registrations",
    params(RegistrationQuery),
    responses(
        (status = 200, description = "Paginated registrations", body = RegistrationListResponse),
        (status = 400, description = "Invalid range")
    ),
    tag = "Time registrations"
)]
pub async fn list_registrations(
    backend: web::Data<dyn Backend>,
    query: web::Query<RegistrationQuery>,
) -> Result<HttpResponse, ApiError> {
    let filter = query.to_filter()?;
    let page = backend.list_time_registrations(&filter).await?;

    Ok(HttpResponse::Ok().json(RegistrationListResponse {
        data: page.data,
        page: page.page,
        per_page: page.per_page,
        total: page.total,
    }))
}

/// Correct a time registration
#[utoipa::path(
    put,
    path = "/api/time-registrations/{registration_id}",
    params(
        ("registration_id" = u64, Path, description = "Time registration ID")
    ),
    request_body = UpdateRegistration,
    responses(
        (status = 200, description = "Registration updated", body = TimeRegistration),
        (status = 400, description = "Empty update or clock-out before clock-in", body = Object, example = json!({
            "error": "clock_out: must not be before clock_in"
        })),
        (status = 404, description = "Registration not found")
    ),
    tag = "Time registrations"
)]
pub async fn update_registration(
    auth: AdminSession,
    backend: web::Data<dyn Backend>,
    path: web::Path<u64>,
    payload: web::Json<UpdateRegistration>,
) -> Result<HttpResponse, ApiError> {
    let registration_id = path.into_inner();
    let changes = RegistrationChanges {
        clock_in: payload.clock_in,
        clock_out: payload.clock_out,
    };
    if changes.is_empty() {
        return Err(ValidationError::NothingToUpdate.into());
    }

    // the order check runs in the backend against the locked row
    let updated = backend
        .update_time_registration(registration_id, &changes)
        .await?
        .ok_or_else(registration_not_found)?;

    info!(admin_id = auth.admin.id, registration_id, "Time registration corrected");

    Ok(HttpResponse::Ok().json(updated))
}

/// Delete a time registration
#[utoipa::path(
    delete,
    path = "/api/time-registrations/{registration_id}",
    params(
        ("registration_id" = u64, Path, description = "Time registration ID")
    ),
    responses(
        (status = 200, description = "Successfully deleted", body = MessageResponse),
        (status = 404, description = "Registration not found")
    ),
    tag = "Time registrations"
)]
pub async fn delete_registration(
    auth: AdminSession,
    backend: web::Data<dyn Backend>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let registration_id = path.into_inner();

    if !backend.delete_time_registration(registration_id).await? {
        return Err(registration_not_found());
    }

    info!(admin_id = auth.admin.id, registration_id, "Time registration deleted");

    Ok(HttpResponse::Ok().json(MessageResponse::new("Successfully deleted")))
}
