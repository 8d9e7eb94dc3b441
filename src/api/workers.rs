use crate::{
    api::MessageResponse,
    auth::session::AdminSession,
    backend::Backend,
    error::ApiError,
    model::{
        Pagination,
        time_registration::{TimeRange, TimeRegistration, WorkSummary},
        worker::{NewWorker, Worker, WorkerChanges, WorkerFilter},
    },
    validation::{self, DEPARTMENT_MAX_LEN, NAME_MAX_LEN, ValidationError},
};
use actix_web::{HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateWorker {
    #[schema(example = "Ada")]
    pub first_name: String,
    #[schema(example = "Lovelace")]
    pub last_name: String,
    #[schema(example = "1234")]
    pub pin: String,
    #[schema(example = "Bakery", nullable = true)]
    pub department: Option<String>,
    /// defaults to true
    #[schema(example = true)]
    pub is_active: Option<bool>,
}

impl CreateWorker {
    pub fn validate(&self) -> Result<NewWorker, ValidationError> {
        Ok(NewWorker {
            first_name: validation::required_text("first_name", &self.first_name, NAME_MAX_LEN)?,
            last_name: validation::required_text("last_name", &self.last_name, NAME_MAX_LEN)?,
            pin: validation::pin(&self.pin)?,
            department: validation::optional_text(
                "department",
                self.department.as_deref(),
                DEPARTMENT_MAX_LEN,
            )?,
            is_active: self.is_active.unwrap_or(true),
        })
    }
}

#[derive(Deserialize, Serialize, Default, ToSchema)]
pub struct UpdateWorker {
    #[schema(example = "Ada")]
    pub first_name: Option<String>,
    #[schema(example = "King")]
    pub last_name: Option<String>,
    #[schema(example = "4321")]
    pub pin: Option<String>,
    /// empty string clears the department
    #[schema(example = "Front desk")]
    pub department: Option<String>,
    #[schema(example = false)]
    pub is_active: Option<bool>,
}

impl UpdateWorker {
    pub fn validate(&self) -> Result<WorkerChanges, ValidationError> {
        let changes = WorkerChanges {
            first_name: self
                .first_name
                .as_deref()
                .map(|v| validation::required_text("first_name", v, NAME_MAX_LEN))
                .transpose()?,
            last_name: self
                .last_name
                .as_deref()
                .map(|v| validation::required_text("last_name", v, NAME_MAX_LEN))
                .transpose()?,
            pin: self.pin.as_deref().map(validation::pin).transpose()?,
            department: self
                .department
                .as_deref()
                .map(|v| validation::optional_text("department", Some(v), DEPARTMENT_MAX_LEN))
                .transpose()?,
            is_active: self.is_active,
        };

        if changes.is_empty() {
            return Err(ValidationError::NothingToUpdate);
        }
        Ok(changes)
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WorkerQuery {
    /// Page number, starting at 1
    pub page: Option<u32>,
    /// Items per page, at most 100
    pub per_page: Option<u32>,
    /// Search in first and last name
    pub search: Option<String>,
    pub department: Option<String>,
    pub is_active: Option<bool>,
}

impl WorkerQuery {
    fn to_filter(&self) -> WorkerFilter {
        let non_blank = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        WorkerFilter {
            search: non_blank(&self.search),
            department: non_blank(&self.department),
            is_active: self.is_active,
            pagination: Pagination::new(self.page, self.per_page),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct WorkerListResponse {
    pub data: Vec<Worker>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 42)]
    pub total: i64,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SummaryQuery {
    /// Inclusive start, RFC 3339
    #[param(value_type = Option<String>, example = "2026-01-01T00:00:00Z")]
    pub from: Option<DateTime<Utc>>,
    /// Exclusive end, RFC 3339
    #[param(value_type = Option<String>, example = "2026-02-01T00:00:00Z")]
    pub to: Option<DateTime<Utc>>,
}

#[derive(Serialize, ToSchema)]
pub struct WorkerSummaryResponse {
    pub worker: Worker,
    pub summary: WorkSummary,
    pub registrations: Vec<TimeRegistration>,
}

fn worker_not_found() -> ApiError {
    ApiError::NotFound("Worker not found".into())
}

/// List workers
#[utoipa::path(
    get,
    path = "/api/workers",
    params(WorkerQuery),
    responses(
        (status = 200, description = "Paginated worker list", body = WorkerListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    tag = "Workers"
)]
pub async fn list_workers(
    backend: web::Data<dyn Backend>,
    query: web::Query<WorkerQuery>,
) -> Result<HttpResponse, ApiError> {
    let page = backend.list_workers(&query.to_filter()).await?;

    Ok(HttpResponse::Ok().json(WorkerListResponse {
        data: page.data,
        page: page.page,
        per_page: page.per_page,
        total: page.total,
    }))
}

/// Create Worker
#[utoipa::path(
    post,
    path = "/api/workers",
    request_body = CreateWorker,
    responses(
        (status = 201, description = "Worker created", body = Worker),
        (status = 400, description = "Invalid payload", body = Object, example = json!({
            "error": "pin: must be exactly 4 digits"
        })),
        (status = 409, description = "PIN already in use", body = Object, example = json!({
            "error": "PIN is already in use"
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Workers"
)]
pub async fn create_worker(
    auth: AdminSession,
    backend: web::Data<dyn Backend>,
    payload: web::Json<CreateWorker>,
) -> Result<HttpResponse, ApiError> {
    let new_worker = payload.validate()?;
    let worker = backend.create_worker(&new_worker).await?;

    info!(admin_id = auth.admin.id, worker_id = worker.id, "Worker created");

    Ok(HttpResponse::Created().json(worker))
}

/// Get Worker by ID
#[utoipa::path(
    get,
    path = "/api/workers/{worker_id}",
    params(
        ("worker_id" = u64, Path, description = "Worker ID")
    ),
    responses(
        (status = 200, description = "Worker found", body = Worker),
        (status = 404, description = "Worker not found", body = Object, example = json!({
            "error": "Worker not found"
        }))
    ),
    tag = "Workers"
)]
pub async fn get_worker(
    backend: web::Data<dyn Backend>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let worker = backend
        .get_worker(path.into_inner())
        .await?
        .ok_or_else(worker_not_found)?;

    Ok(HttpResponse::Ok().json(worker))
}

/// Update Worker
#[utoipa::path(
    put,
    path = "/api/workers/{worker_id}",
    params(
        ("worker_id" = u64, Path, description = "Worker ID")
    ),
    request_body = UpdateWorker,
    responses(
        (status = 200, description = "Worker updated", body = Worker),
        (status = 400, description = "Invalid or empty update"),
        (status = 404, description = "Worker not found"),
        (status = 409, description = "PIN already in use")
    ),
    tag = "Workers"
)]
pub async fn update_worker(
    auth: AdminSession,
    backend: web::Data<dyn Backend>,
    path: web::Path<u64>,
    payload: web::Json<UpdateWorker>,
) -> Result<HttpResponse, ApiError> {
    let worker_id = path.into_inner();
    let changes = payload.validate()?;

    let worker = backend
        .update_worker(worker_id, &changes)
        .await?
        .ok_or_else(worker_not_found)?;

    info!(admin_id = auth.admin.id, worker_id, "Worker updated");

    Ok(HttpResponse::Ok().json(worker))
}

/// Delete Worker
#[utoipa::path(
    delete,
    path = "/api/workers/{worker_id}",
    params(
        ("worker_id" = u64, Path, description = "Worker ID")
    ),
    responses(
        (status = 200, description = "Successfully deleted", body = MessageResponse, example = json!({
            "message": "Successfully deleted"
        })),
        (status = 404, description = "Worker not found")
    ),
    tag = "Workers"
)]
pub async fn delete_worker(
    auth: AdminSession,
    backend: web::Data<dyn Backend>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let worker_id = path.into_inner();

    if !backend.delete_worker(worker_id).await? {
        return Err(worker_not_found());
    }

    info!(admin_id = auth.admin.id, worker_id, "Worker deleted");

    Ok(HttpResponse::Ok().json(MessageResponse::new("Successfully deleted")))
}

/// Worked time of a worker
#[utoipa::path(
    get,
    path = "/api/workers/{worker_id}/summary",
    params(
        ("worker_id" = u64, Path, description = "Worker ID"),
        SummaryQuery
    ),
    responses(
        (status = 200, description = "Registrations and worked time in the range", body = WorkerSummaryResponse),
        (status = 400, description = "Range start is not before its end"),
        (status = 404, description = "Worker not found")
    ),
    tag = "Workers"
)]
pub async fn worker_summary(
    backend: web::Data<dyn Backend>,
    path: web::Path<u64>,
    query: web::Query<SummaryQuery>,
) -> Result<HttpResponse, ApiError> {
    let worker_id = path.into_inner();
    let range = TimeRange {
        from: query.from,
        to: query.to,
    };
    if !range.is_valid() {
        return Err(ValidationError::InvalidFormat {
            field: "from",
            reason: "must be before to",
        }
        .into());
    }

    let worker = backend
        .get_worker(worker_id)
        .await?
        .ok_or_else(worker_not_found)?;
    let registrations = backend.registrations_for_worker(worker_id, range).await?;
    let summary = WorkSummary::compute(worker_id, &registrations, Utc::now());

    Ok(HttpResponse::Ok().json(WorkerSummaryResponse {
        worker,
        summary,
        registrations,
    }))
}
