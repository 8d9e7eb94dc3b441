use crate::api::MessageResponse;
use crate::api::clock::{ClockRequest, ClockResponse, ClockWorker};
use crate::api::dashboard::DashboardResponse;
use crate::api::time_registrations::{RegistrationListResponse, UpdateRegistration};
use crate::api::workers::{CreateWorker, UpdateWorker, WorkerListResponse, WorkerSummaryResponse};
use crate::auth::handlers::{LoginRequest, ResetPasswordRequest, UpdatePasswordRequest};
use crate::auth::session::SessionResponse;
use crate::model::admin::Admin;
use crate::model::time_registration::{
    ClockAction, TimeRegistration, TimeRegistrationEntry, WorkSummary,
};
use crate::model::user::User;
use crate::model::worker::Worker;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "TimeFly API",
        version = "1.0.0",
        description = r#"
## TimeFly

Time registration for small teams. Workers clock in and out at a kiosk with a
4-digit PIN, admins manage workers and correct registrations.

### Key Features
- **Auth**: admin sign-in, session refresh, logout and password reset
- **Clock**: PIN based clock-in / clock-out toggle
- **Workers**: create, update, list and summarize workers
- **Time registrations**: list, correct and delete registrations

### Security
Admin endpoints accept the `tf-access-token` cookie set on login or a
**JWT Bearer** token. Expired access tokens are refreshed from the
`tf-refresh-token` cookie.

### Response Format
- Successful responses are JSON documents
- Errors are `{"error": "..."}`
- List endpoints are paginated with `page` and `per_page`
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::me,
        crate::auth::handlers::refresh,
        crate::auth::handlers::logout,
        crate::auth::handlers::reset_password,
        crate::auth::handlers::update_password,

        crate::api::dashboard::dashboard,

        crate::api::clock::clock,

        crate::api::workers::list_workers,
        crate::api::workers::create_worker,
        crate::api::workers::get_worker,
        crate::api::workers::update_worker,
        crate::api::workers::delete_worker,
        crate::api::workers::worker_summary,

        crate::api::time_registrations::list_registrations,
        crate::api::time_registrations::update_registration,
        crate::api::time_registrations::delete_registration
    ),
    components(
        schemas(
            LoginRequest,
            ResetPasswordRequest,
            UpdatePasswordRequest,
            SessionResponse,
            MessageResponse,
            User,
            Admin,
            DashboardResponse,
            ClockRequest,
            ClockResponse,
            ClockWorker,
            ClockAction,
            Worker,
            CreateWorker,
            UpdateWorker,
            WorkerListResponse,
            WorkerSummaryResponse,
            WorkSummary,
            TimeRegistration,
            TimeRegistrationEntry,
            RegistrationListResponse,
            UpdateRegistration
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Auth", description = "Admin authentication APIs"),
        (name = "Admin", description = "Admin dashboard APIs"),
        (name = "Clock", description = "Kiosk clock-in / clock-out APIs"),
        (name = "Workers", description = "Worker management APIs"),
        (name = "Time registrations", description = "Time registration management APIs"),
    )
)]
pub struct ApiDoc;

pub struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
