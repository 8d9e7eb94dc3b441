use actix_web::{
    FromRequest, HttpMessage, HttpRequest,
    cookie::{Cookie, SameSite, time::Duration as CookieDuration},
    dev::Payload,
};
use futures::future::{Ready, ready};
use serde::Serialize;
use tracing::debug;
use utoipa::ToSchema;

use crate::{
    backend::{Backend, BackendError, BackendResult, Session},
    config::Config,
    error::ApiError,
    model::{admin::Admin, user::User},
};

pub const ACCESS_COOKIE: &str = "tf-access-token";
pub const REFRESH_COOKIE: &str = "tf-refresh-token";

/// Tokens a request carries, from cookies or an `Authorization: Bearer` header.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl SessionTokens {
    pub fn from_request(req: &HttpRequest) -> Self {
        let bearer = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let cookie = |name: &str| {
            req.cookie(name)
                .map(|c| c.value().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            access_token: bearer.or_else(|| cookie(ACCESS_COOKIE)),
            refresh_token: cookie(REFRESH_COOKIE),
        }
    }
}

/// The signed-in user and their admin row, if any.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SessionResponse {
    pub user: User,
    #[schema(nullable = true)]
    pub admin: Option<Admin>,
}

#[derive(Debug)]
pub struct ResolvedSession {
    pub user: User,
    pub admin: Option<Admin>,
    /// Set when an expired access token was replaced using the refresh token
    pub refreshed: Option<Session>,
}

/// Looks up the session behind `tokens`, refreshing it when the access token
/// is missing or expired. `Ok(None)` means there is no usable session.
pub async fn resolve_session(
    backend: &dyn Backend,
    tokens: &SessionTokens,
) -> BackendResult<Option<ResolvedSession>> {
    if let Some(access_token) = &tokens.access_token {
        match backend.get_user(access_token).await {
            Ok(user) => {
                let admin = backend.find_admin_by_user(user.id).await?;
                return Ok(Some(ResolvedSession {
                    user,
                    admin,
                    refreshed: None,
                }));
            }
            Err(BackendError::InvalidSession) => debug!("Access token rejected"),
            Err(e) => return Err(e),
        }
    }

    let Some(refresh_token) = &tokens.refresh_token else {
        return Ok(None);
    };

    match backend.refresh_session(refresh_token).await {
        Ok(session) => {
            debug!(user_id = session.user.id, "Session refreshed from cookie");
            let admin = backend.find_admin_by_user(session.user.id).await?;
            Ok(Some(ResolvedSession {
                user: session.user.clone(),
                admin,
                refreshed: Some(session),
            }))
        }
        Err(BackendError::InvalidSession) => Ok(None),
        Err(e) => Err(e),
    }
}

fn session_cookie(name: &'static str, value: String, max_age: usize, config: &Config) -> Cookie<'static> {
    Cookie::build(name, value)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.cookie_secure)
        .max_age(CookieDuration::seconds(max_age as i64))
        .finish()
}

pub fn session_cookies(session: &Session, config: &Config) -> [Cookie<'static>; 2] {
    [
        session_cookie(
            ACCESS_COOKIE,
            session.access_token.clone(),
            config.access_token_ttl,
            config,
        ),
        session_cookie(
            REFRESH_COOKIE,
            session.refresh_token.clone(),
            config.refresh_token_ttl,
            config,
        ),
    ]
}

pub fn cleared_cookies(config: &Config) -> [Cookie<'static>; 2] {
    [ACCESS_COOKIE, REFRESH_COOKIE].map(|name| {
        let mut cookie = session_cookie(name, String::new(), 0, config);
        cookie.make_removal();
        cookie
    })
}

/// An authenticated admin, put in the request extensions by
/// [`require_admin`](super::middleware::require_admin).
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub user: User,
    pub admin: Admin,
}

impl FromRequest for AdminSession {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AdminSession>()
                .cloned()
                .ok_or(ApiError::Unauthenticated),
        )
    }
}
