use crate::{
    api::{clock, dashboard, time_registrations, workers},
    auth::{handlers, middleware::require_admin},
    config::Config,
    error::ApiError,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

/// Per-IP limiters. Built once so every worker thread shares the same buckets.
#[derive(Clone)]
pub struct RateLimiters {
    login: Limiter,
    reset: Limiter,
    clock: Limiter,
    protected: Limiter,
}

impl RateLimiters {
    pub fn from_config(config: &Config) -> Self {
        Self {
            login: build_limiter(config.rate_login_per_min),
            reset: build_limiter(config.rate_reset_per_min),
            clock: build_limiter(config.rate_clock_per_min),
            protected: build_limiter(config.rate_protected_per_min),
        }
    }
}

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Limiter {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);

    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        // only None for a zero period or burst, both ruled out above
        .unwrap_or_else(GovernorConfig::default);

    Arc::new(Governor::new(&cfg))
}

/// Malformed JSON, query strings and paths answer `{"error": ...}` like every other 400.
fn extractor_configs(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    );
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiters: &RateLimiters) {
    let prefix = config.api_prefix.trim_end_matches('/');

    extractor_configs(cfg);

    // Public routes
    cfg.service(
        web::scope(&format!("{prefix}/auth"))
            .service(
                web::resource("/login")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(web::resource("/logout").route(web::post().to(handlers::logout)))
            .service(web::resource("/me").route(web::get().to(handlers::me)))
            .service(
                web::resource("/refresh")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::refresh)),
            )
            .service(
                web::resource("/reset-password")
                    .wrap(limiters.reset.clone())
                    .route(web::post().to(handlers::reset_password)),
            )
            .service(
                web::resource("/update-password")
                    .wrap(limiters.reset.clone())
                    .route(web::post().to(handlers::update_password)),
            ),
    );

    // Kiosk
    cfg.service(
        web::resource(format!("{prefix}/clock"))
            .wrap(limiters.clock.clone())
            .route(web::post().to(clock::clock)),
    );

    // Admin routes
    cfg.service(
        web::scope(&format!("{prefix}/admin"))
            .wrap(from_fn(require_admin))
            .wrap(limiters.protected.clone())
            .service(web::resource("/dashboard").route(web::get().to(dashboard::dashboard))),
    );

    cfg.service(
        web::scope(&format!("{prefix}/workers"))
            .wrap(from_fn(require_admin))
            .wrap(limiters.protected.clone())
            // /workers
            .service(
                web::resource("")
                    .route(web::get().to(workers::list_workers))
                    .route(web::post().to(workers::create_worker)),
            )
            // /workers/{id}
            .service(
                web::resource("/{id}")
                    .route(web::get().to(workers::get_worker))
                    .route(web::put().to(workers::update_worker))
                    .route(web::delete().to(workers::delete_worker)),
            )
            // /workers/{id}/summary
            .service(
                web::resource("/{id}/summary").route(web::get().to(workers::worker_summary)),
            ),
    );

    cfg.service(
        web::scope(&format!("{prefix}/time-registrations"))
            .wrap(from_fn(require_admin))
            .wrap(limiters.protected.clone())
            .service(
                web::resource("").route(web::get().to(time_registrations::list_registrations)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::put().to(time_registrations::update_registration))
                    .route(web::delete().to(time_registrations::delete_registration)),
            ),
    );
}

// LOGIN
//  ├─ tf-access-token cookie (1 hour)
//  └─ tf-refresh-token cookie (7 days)

// ADMIN REQUEST
//  └─ cookie or Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ refreshed from the refresh cookie on the next request
