use crate::{
    api::MessageResponse,
    auth::session::{
        SessionResponse, SessionTokens, cleared_cookies, resolve_session, session_cookies,
    },
    backend::{Backend, BackendError},
    config::Config,
    error::ApiError,
    validation,
};
use actix_web::{HttpRequest, HttpResponse, HttpResponseBuilder, http::StatusCode, web};
use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;

// auth end points

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "admin@timefly.app", format = "email")]
    pub email: String,
    #[schema(example = "correct horse battery staple", format = "password")]
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    #[schema(example = "admin@timefly.app", format = "email")]
    pub email: String,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdatePasswordRequest {
    /// token from the reset link
    #[schema(example = "3f2a9c4e5b6d4e8f9a0b1c2d3e4f5a6b")]
    pub token: String,
    #[schema(example = "a new long password", format = "password")]
    pub password: String,
}

fn with_cookies<'a>(
    builder: &'a mut HttpResponseBuilder,
    cookies: impl IntoIterator<Item = actix_web::cookie::Cookie<'static>>,
) -> &'a mut HttpResponseBuilder {
    for cookie in cookies {
        builder.cookie(cookie);
    }
    builder
}

/// Sign in an admin
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in, session cookies set", body = SessionResponse),
        (status = 400, description = "Invalid payload or credentials", body = Object, example = json!({
            "error": "Invalid login credentials"
        })),
        (status = 403, description = "User is not an admin", body = Object, example = json!({
            "error": "You do not have admin access"
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(backend, config, body),
    fields(email = %body.email)
)]
pub async fn login(
    body: web::Json<LoginRequest>,
    backend: web::Data<dyn Backend>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    info!("Login request received");

    let email = validation::email(&body.email)?;
    validation::password(&body.password)?;

    let session = backend.sign_in_with_password(&email, &body.password).await?;

    debug!(user_id = session.user.id, "Credentials accepted, checking admin row");

    let Some(admin) = backend.find_admin_by_user(session.user.id).await? else {
        info!(user_id = session.user.id, "Login refused: not an admin");
        if let Err(e) = backend.sign_out(&session.refresh_token).await {
            warn!(error = %e, "Failed to sign out refused session");
        }
        return Err(ApiError::Forbidden("You do not have admin access".into()));
    };

    info!(user_id = session.user.id, admin_id = admin.id, "Login successful");

    let cookies = session_cookies(&session, &config);
    Ok(with_cookies(&mut HttpResponse::Ok(), cookies).json(SessionResponse {
        user: session.user,
        admin: Some(admin),
    }))
}

/// Current session
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "The signed-in user and admin row (null if not an admin)", body = SessionResponse),
        (status = 401, description = "No session", body = Object, example = json!({
            "error": "Not authenticated"
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Auth"
)]
pub async fn me(
    req: HttpRequest,
    backend: web::Data<dyn Backend>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let tokens = SessionTokens::from_request(&req);

    let resolved = resolve_session(backend.get_ref(), &tokens)
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    let mut response = HttpResponse::Ok();
    if let Some(session) = &resolved.refreshed {
        with_cookies(&mut response, session_cookies(session, &config));
    }

    Ok(response.json(SessionResponse {
        user: resolved.user,
        admin: resolved.admin,
    }))
}

/// Rotate the session using the refresh token
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    responses(
        (status = 200, description = "New session cookies set", body = SessionResponse),
        (status = 401, description = "Refresh token missing, revoked or expired")
    ),
    tag = "Auth"
)]
pub async fn refresh(
    req: HttpRequest,
    backend: web::Data<dyn Backend>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let tokens = SessionTokens::from_request(&req);
    let refresh_token = tokens.refresh_token.ok_or(ApiError::Unauthenticated)?;

    let session = backend.refresh_session(&refresh_token).await?;
    let admin = backend.find_admin_by_user(session.user.id).await?;

    let cookies = session_cookies(&session, &config);
    Ok(with_cookies(&mut HttpResponse::Ok(), cookies).json(SessionResponse {
        user: session.user,
        admin,
    }))
}

/// Sign out
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Signed out, cookies cleared", body = MessageResponse, example = json!({
            "message": "Logged out successfully"
        })),
        (status = 500, description = "The backend failed to sign out", body = Object, example = json!({
            "error": "Something went wrong, contact your system administrator"
        }))
    ),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    backend: web::Data<dyn Backend>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let tokens = SessionTokens::from_request(&req);

    // no refresh token means nothing to revoke, still a success
    if let Some(refresh_token) = &tokens.refresh_token {
        if let Err(e) = backend.sign_out(refresh_token).await {
            error!(error = %e, "Sign out failed");
            return Err(ApiError::upstream(StatusCode::INTERNAL_SERVER_ERROR, e));
        }
    }

    Ok(with_cookies(&mut HttpResponse::Ok(), cleared_cookies(&config))
        .json(MessageResponse::new("Logged out successfully")))
}

/// Request a password reset email
#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Reset email sent if the account exists", body = MessageResponse, example = json!({
            "message": "Password reset email sent"
        })),
        (status = 400, description = "Invalid email or backend error", body = Object, example = json!({
            "error": "email: must be a valid email address"
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_reset_password", skip(backend, config, body))]
pub async fn reset_password(
    body: web::Json<ResetPasswordRequest>,
    backend: web::Data<dyn Backend>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let email = validation::email(&body.email)?;

    backend
        .reset_password_for_email(&email, &config.password_reset_url())
        .await
        .map_err(|e| ApiError::upstream(StatusCode::BAD_REQUEST, e))?;

    Ok(HttpResponse::Ok().json(MessageResponse::new("Password reset email sent")))
}

/// Set a new password with a reset token
#[utoipa::path(
    post,
    path = "/api/auth/update-password",
    request_body = UpdatePasswordRequest,
    responses(
        (status = 200, description = "Password updated, all sessions signed out", body = MessageResponse),
        (status = 400, description = "Invalid password or reset token", body = Object, example = json!({
            "error": "Reset link is invalid or has expired"
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_update_password", skip_all)]
pub async fn update_password(
    body: web::Json<UpdatePasswordRequest>,
    backend: web::Data<dyn Backend>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let token = body.token.trim();
    if token.is_empty() {
        return Err(BackendError::InvalidResetToken.into());
    }
    validation::new_password(&body.password)?;

    backend.update_password(token, &body.password).await?;

    info!("Password updated through reset link");

    Ok(with_cookies(&mut HttpResponse::Ok(), cleared_cookies(&config))
        .json(MessageResponse::new("Password updated successfully")))
}
