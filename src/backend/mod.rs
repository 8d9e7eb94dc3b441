//! The persistence and authentication seam.
//!
//! Handlers talk to a `dyn Backend`, which is the union of [`AuthApi`]
//! (accounts and sessions) and [`Database`] (admins, workers, time
//! registrations). [`MySqlBackend`] is the production implementation.

pub mod mysql;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use derive_more::Display;
use serde::Serialize;

use crate::model::{
    Page,
    admin::Admin,
    time_registration::{
        ClockEvent, RegistrationChanges, RegistrationFilter, TimeRange, TimeRegistration,
        TimeRegistrationEntry,
    },
    user::User,
    worker::{NewWorker, Worker, WorkerChanges, WorkerCounts, WorkerFilter},
};
use crate::validation::ValidationError;

pub use mysql::MySqlBackend;

/// A signed-in session as handed out by [`AuthApi`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: usize,
    pub user: User,
}

#[derive(Debug, Display)]
pub enum BackendError {
    #[display(fmt = "Invalid login credentials")]
    InvalidCredentials,

    #[display(fmt = "Invalid or expired session")]
    InvalidSession,

    #[display(fmt = "Reset link is invalid or has expired")]
    InvalidResetToken,

    /// A unique constraint was violated
    #[display(fmt = "{}", _0)]
    Conflict(String),

    /// The stored row would break a field rule after the change
    #[display(fmt = "{}", _0)]
    Invalid(ValidationError),

    /// The backend refused or failed the operation and said why
    #[display(fmt = "{}", _0)]
    Rejected(String),

    #[display(fmt = "database error: {}", _0)]
    Database(sqlx::Error),

    #[display(fmt = "token error: {}", _0)]
    Token(jsonwebtoken::errors::Error),

    #[display(fmt = "password hashing error: {}", _0)]
    PasswordHash(argon2::password_hash::Error),
}

impl std::error::Error for BackendError {}

impl BackendError {
    /// Errors whose details must not leave the server.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            BackendError::Database(_) | BackendError::Token(_) | BackendError::PasswordHash(_)
        )
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return BackendError::Conflict(db_err.message().to_string());
            }
        }
        BackendError::Database(e)
    }
}

impl From<jsonwebtoken::errors::Error> for BackendError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        BackendError::Token(e)
    }
}

impl From<argon2::password_hash::Error> for BackendError {
    fn from(e: argon2::password_hash::Error) -> Self {
        BackendError::PasswordHash(e)
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// What a presented, correctly signed refresh token may still be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshUse {
    /// Never used, rotate it.
    Rotate,
    /// Rotated moments ago by a parallel request of the same client.
    Replay,
    /// Rotated long ago and presented again, treat it as leaked.
    Reuse,
    /// Signed out, reset, or revoked with the rest of the user's sessions.
    Revoked,
}

/// Rotation marks a token revoked and records when. Bulk revocation clears
/// `rotated_at`, so those tokens are never replayable.
pub fn classify_refresh(
    revoked: bool,
    rotated_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    grace: Duration,
) -> RefreshUse {
    match (revoked, rotated_at) {
        (false, _) => RefreshUse::Rotate,
        (true, Some(at)) if now - at <= grace => RefreshUse::Replay,
        (true, Some(_)) => RefreshUse::Reuse,
        (true, None) => RefreshUse::Revoked,
    }
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Fails with [`BackendError::InvalidCredentials`] on unknown email or wrong password.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> BackendResult<Session>;

    /// Resolves an access token. Fails with [`BackendError::InvalidSession`].
    async fn get_user(&self, access_token: &str) -> BackendResult<User>;

    /// Exchanges a refresh token for a new session, revoking the old token.
    /// A token rotated within the reuse grace window still yields a session,
    /// one presented again after it revokes every session of the user.
    async fn refresh_session(&self, refresh_token: &str) -> BackendResult<Session>;

    /// Revokes the refresh token. Unknown or malformed tokens are not an error.
    async fn sign_out(&self, refresh_token: &str) -> BackendResult<()>;

    /// Starts a password reset. Succeeds for unknown emails as well.
    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> BackendResult<()>;

    /// Completes a password reset and revokes every session of the user.
    async fn update_password(&self, reset_token: &str, new_password: &str) -> BackendResult<()>;
}

#[async_trait]
pub trait Database: Send + Sync {
    async fn find_admin_by_user(&self, user_id: u64) -> BackendResult<Option<Admin>>;

    async fn list_workers(&self, filter: &WorkerFilter) -> BackendResult<Page<Worker>>;
    async fn count_workers(&self) -> BackendResult<WorkerCounts>;
    async fn get_worker(&self, id: u64) -> BackendResult<Option<Worker>>;
    async fn find_worker_by_pin(&self, pin: &str) -> BackendResult<Option<Worker>>;
    /// Fails with [`BackendError::Conflict`] if the PIN is taken.
    async fn create_worker(&self, worker: &NewWorker) -> BackendResult<Worker>;
    async fn update_worker(&self, id: u64, changes: &WorkerChanges) -> BackendResult<Option<Worker>>;
    /// Also removes the worker's registrations. Returns false if nothing was deleted.
    async fn delete_worker(&self, id: u64) -> BackendResult<bool>;

    /// Closes the worker's open registration, or opens one if there is none.
    async fn toggle_clock(&self, worker_id: u64, at: DateTime<Utc>) -> BackendResult<ClockEvent>;

    async fn list_time_registrations(
        &self,
        filter: &RegistrationFilter,
    ) -> BackendResult<Page<TimeRegistrationEntry>>;
    /// All registrations of a worker with `clock_in` in `range`, oldest first.
    async fn registrations_for_worker(
        &self,
        worker_id: u64,
        range: TimeRange,
    ) -> BackendResult<Vec<TimeRegistration>>;
    async fn get_time_registration(&self, id: u64) -> BackendResult<Option<TimeRegistration>>;
    /// Applies the changes only if `clock_out` stays at or after `clock_in`,
    /// otherwise fails with [`BackendError::Invalid`].
    async fn update_time_registration(
        &self,
        id: u64,
        changes: &RegistrationChanges,
    ) -> BackendResult<Option<TimeRegistration>>;
    async fn delete_time_registration(&self, id: u64) -> BackendResult<bool>;
}

pub trait Backend: AuthApi + Database {}

impl<T: AuthApi + Database> Backend for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::{borrow::Cow, error::Error as StdError, fmt};

    #[derive(Debug, Clone, Copy)]
    enum Violation {
        Unique,
        ForeignKey,
        NotNull,
    }

    #[derive(Debug)]
    struct FakeDbError {
        code: &'static str,
        violation: Violation,
    }

    impl fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("constraint failed")
        }
    }

    impl StdError for FakeDbError {}

    impl DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            "constraint failed"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            match self.violation {
                Violation::Unique => ErrorKind::UniqueViolation,
                Violation::ForeignKey => ErrorKind::ForeignKeyViolation,
                Violation::NotNull => ErrorKind::NotNullViolation,
            }
        }
    }

    fn db_error(violation: Violation) -> sqlx::Error {
        // MySQL reports both duplicate keys and foreign key failures as 23000
        sqlx::Error::Database(Box::new(FakeDbError {
            code: "23000",
            violation,
        }))
    }

    #[test]
    fn refresh_use_depends_on_rotation_age() {
        let now = Utc::now();
        let grace = Duration::seconds(30);

        assert_eq!(classify_refresh(false, None, now, grace), RefreshUse::Rotate);
        assert_eq!(
            classify_refresh(true, Some(now - Duration::seconds(2)), now, grace),
            RefreshUse::Replay
        );
        assert_eq!(
            classify_refresh(true, Some(now - grace), now, grace),
            RefreshUse::Replay
        );
        assert_eq!(
            classify_refresh(true, Some(now - Duration::seconds(31)), now, grace),
            RefreshUse::Reuse
        );
        assert_eq!(classify_refresh(true, None, now, grace), RefreshUse::Revoked);
    }

    #[test]
    fn zero_grace_disables_replay() {
        let now = Utc::now();
        let rotated = now - Duration::milliseconds(1);
        assert_eq!(
            classify_refresh(true, Some(rotated), now, Duration::zero()),
            RefreshUse::Reuse
        );
    }

    #[test]
    fn only_unique_violations_become_conflicts() {
        assert!(matches!(
            BackendError::from(db_error(Violation::Unique)),
            BackendError::Conflict(_)
        ));
        assert!(matches!(
            BackendError::from(db_error(Violation::ForeignKey)),
            BackendError::Database(_)
        ));
        assert!(matches!(
            BackendError::from(db_error(Violation::NotNull)),
            BackendError::Database(_)
        ));
    }
}
