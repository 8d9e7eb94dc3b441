use crate::{
    backend::Backend,
    error::ApiError,
    model::{
        time_registration::{ClockAction, TimeRegistration},
        worker::Worker,
    },
    validation,
};
use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct ClockRequest {
    #[schema(example = "1234")]
    pub pin: String,
}

/// What the kiosk may show about a worker; never includes the PIN.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClockWorker {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "Ada")]
    pub first_name: String,
    #[schema(example = "Lovelace")]
    pub last_name: String,
}

impl From<Worker> for ClockWorker {
    fn from(worker: Worker) -> Self {
        Self {
            id: worker.id,
            first_name: worker.first_name,
            last_name: worker.last_name,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClockResponse {
    pub action: ClockAction,
    #[schema(example = "Welcome, Ada!")]
    pub message: String,
    pub worker: ClockWorker,
    pub registration: TimeRegistration,
}

fn greeting(action: ClockAction, first_name: &str) -> String {
    match action {
        ClockAction::ClockIn => format!("Welcome, {first_name}!"),
        ClockAction::ClockOut => format!("Goodbye, {first_name}!"),
    }
}

/// Clock in or out with a PIN
///
/// Closes the worker's open registration if there is one, otherwise opens a new one.
#[utoipa::path(
    post,
    path = "/api/clock",
    request_body = ClockRequest,
    responses(
        (status = 200, description = "Clocked in or out", body = ClockResponse),
        (status = 400, description = "Malformed PIN", body = Object, example = json!({
            "error": "pin: must be exactly 4 digits"
        })),
        (status = 403, description = "Worker is inactive", body = Object, example = json!({
            "error": "Worker is inactive"
        })),
        (status = 404, description = "No worker with this PIN", body = Object, example = json!({
            "error": "Invalid PIN"
        })),
        (status = 429, description = "Too many attempts"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Clock"
)]
pub async fn clock(
    backend: web::Data<dyn Backend>,
    payload: web::Json<ClockRequest>,
) -> Result<HttpResponse, ApiError> {
    let pin = validation::pin(&payload.pin)?;

    let Some(worker) = backend.find_worker_by_pin(&pin).await? else {
        debug!("Clock attempt with unknown PIN");
        return Err(ApiError::NotFound("Invalid PIN".into()));
    };

    if !worker.is_active {
        info!(worker_id = worker.id, "Clock attempt by inactive worker");
        return Err(ApiError::Forbidden("Worker is inactive".into()));
    }

    let event = backend.toggle_clock(worker.id, Utc::now()).await?;

    info!(
        worker_id = worker.id,
        registration_id = event.registration.id,
        action = %event.action,
        "Clock event"
    );

    Ok(HttpResponse::Ok().json(ClockResponse {
        action: event.action,
        message: greeting(event.action, &worker.first_name),
        worker: worker.into(),
        registration: event.registration,
    }))
}
