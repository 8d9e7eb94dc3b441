use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use tracing::{debug, warn};

use crate::auth::session::{AdminSession, SessionTokens, resolve_session, session_cookies};
use crate::backend::Backend;
use crate::config::Config;
use crate::error::ApiError;

/// Lets the request through only for a signed-in user with an admin row.
///
/// No session answers 401, a session without admin rights 403. When the
/// access token had to be refreshed the rotated cookies are added to the
/// response.
pub async fn require_admin(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let backend = req
        .app_data::<Data<dyn Backend>>()
        .cloned()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("Backend missing"))?;
    let config = req
        .app_data::<Data<Config>>()
        .cloned()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    let tokens = SessionTokens::from_request(req.request());

    let resolved = match resolve_session(backend.get_ref(), &tokens).await {
        Ok(Some(resolved)) => resolved,
        Ok(None) => {
            debug!(path = %req.path(), "Rejected: no session");
            let resp = ApiError::Unauthenticated.error_response();
            return Ok(req.into_response(resp));
        }
        Err(e) => {
            let resp = ApiError::from(e).error_response();
            return Ok(req.into_response(resp));
        }
    };

    let Some(admin) = resolved.admin else {
        debug!(user_id = resolved.user.id, path = %req.path(), "Rejected: not an admin");
        let resp = ApiError::Forbidden("Admin access required".into()).error_response();
        return Ok(req.into_response(resp));
    };

    req.extensions_mut().insert(AdminSession {
        user: resolved.user,
        admin,
    });

    let mut res = next.call(req).await?;

    if let Some(session) = resolved.refreshed {
        for cookie in session_cookies(&session, &config) {
            if let Err(e) = res.response_mut().add_cookie(&cookie) {
                warn!(error = %e, "Failed to attach refreshed session cookie");
            }
        }
    }

    Ok(res)
}
