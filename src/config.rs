use anyhow::{Context, Result, anyhow};
use std::env;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,
    pub password_reset_ttl: usize,
    /// How long a just-rotated refresh token is still honoured, in seconds
    pub refresh_reuse_grace: usize,

    /// Public URL of the site, used to build password reset links
    pub site_url: String,
    pub cookie_secure: bool,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_reset_per_min: u32,
    pub rate_clock_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    pub log_dir: String,
    pub log_level: tracing::Level,
    pub run_migrations: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).ok_or_else(|| anyhow!("{key} must be set"));

        let jwt_secret = required("JWT_SECRET")?;
        if jwt_secret.len() < 32 {
            return Err(anyhow!("JWT_SECRET must be at least 32 characters"));
        }

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret,
            access_token_ttl: bounded_or(&lookup, "ACCESS_TOKEN_TTL", 3600, 1, MAX_TTL)?, // 1 hour
            refresh_token_ttl: bounded_or(&lookup, "REFRESH_TOKEN_TTL", 604_800, 1, MAX_TTL)?, // 7 days
            password_reset_ttl: bounded_or(&lookup, "PASSWORD_RESET_TTL", 3600, 1, MAX_TTL)?,
            refresh_reuse_grace: bounded_or(&lookup, "REFRESH_REUSE_GRACE", 30, 0, MAX_REUSE_GRACE)?,

            site_url: lookup("SITE_URL")
                .unwrap_or_else(|| "http://localhost:4321".to_string())
                .trim_end_matches('/')
                .to_string(),
            cookie_secure: parse_or(&lookup, "COOKIE_SECURE", false)?,

            rate_login_per_min: parse_or(&lookup, "RATE_LOGIN_PER_MIN", 60)?,
            rate_reset_per_min: parse_or(&lookup, "RATE_RESET_PER_MIN", 10)?,
            rate_clock_per_min: parse_or(&lookup, "RATE_CLOCK_PER_MIN", 120)?,
            rate_protected_per_min: parse_or(&lookup, "RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: lookup("API_PREFIX").unwrap_or_else(|| "/api".to_string()),

            log_dir: lookup("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
            log_level: parse_or(&lookup, "LOG_LEVEL", tracing::Level::INFO)?,
            run_migrations: parse_or(&lookup, "RUN_MIGRATIONS", true)?,
        })
    }

    /// Where the password reset email link points to
    pub fn password_reset_url(&self) -> String {
        format!("{}/reset-password", self.site_url)
    }
}

/// Upper bound for every token lifetime: one year in seconds.
pub const MAX_TTL: usize = 31_536_000;
pub const MAX_REUSE_GRACE: usize = 300;

fn bounded_or<F>(lookup: &F, key: &str, default: usize, min: usize, max: usize) -> Result<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, key, default)?;
    if !(min..=max).contains(&value) {
        return Err(anyhow!("{key} must be between {min} and {max} seconds"));
    }
    Ok(value)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}
