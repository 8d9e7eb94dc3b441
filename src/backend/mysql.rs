use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Executor, MySql, MySqlPool, QueryBuilder};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::{
    AuthApi, BackendError, BackendResult, Database, RefreshUse, Session, classify_refresh,
};
use crate::{
    auth::{
        jwt::{TokenType, generate_access_token, generate_refresh_token, verify_token_of_type},
        password::{hash_password, verify_password},
    },
    config::Config,
    model::{
        Page,
        admin::Admin,
        time_registration::{
            ClockAction, ClockEvent, RegistrationChanges, RegistrationFilter, TimeRange,
            TimeRegistration, TimeRegistrationEntry,
        },
        user::{User, UserSql},
        worker::{NewWorker, Worker, WorkerChanges, WorkerCounts, WorkerFilter},
    },
    utils::db_utils::SqlUpdate,
};

const USER_COLUMNS: &str = "id, email, password_hash, created_at, last_sign_in_at";
const WORKER_COLUMNS: &str =
    "id, first_name, last_name, pin, department, is_active, created_at, updated_at";
const REGISTRATION_COLUMNS: &str = "id, worker_id, clock_in, clock_out, created_at";

/// Accounts, sessions and time-clock data stored in MySQL.
#[derive(Clone)]
pub struct MySqlBackend {
    pool: MySqlPool,
    jwt_secret: String,
    access_token_ttl: usize,
    refresh_token_ttl: usize,
    password_reset_ttl: usize,
    refresh_reuse_grace: usize,
}

impl MySqlBackend {
    pub fn new(pool: MySqlPool, config: &Config) -> Self {
        Self {
            pool,
            jwt_secret: config.jwt_secret.clone(),
            access_token_ttl: config.access_token_ttl,
            refresh_token_ttl: config.refresh_token_ttl,
            password_reset_ttl: config.password_reset_ttl,
            refresh_reuse_grace: config.refresh_reuse_grace,
        }
    }

    /// Issues an access/refresh token pair and stores the refresh token.
    async fn issue_session<'c, E>(&self, executor: E, user: User) -> BackendResult<Session>
    where
        E: Executor<'c, Database = MySql>,
    {
        let access_token =
            generate_access_token(user.id, &user.email, &self.jwt_secret, self.access_token_ttl)?;
        let (refresh_token, refresh_claims) =
            generate_refresh_token(user.id, &user.email, &self.jwt_secret, self.refresh_token_ttl)?;

        debug!(user_id = user.id, jti = %refresh_claims.jti, "Storing refresh token");

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, jti, expires_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(user.id)
        .bind(&refresh_claims.jti)
        .bind(Utc::now() + seconds(self.refresh_token_ttl))
        .execute(executor)
        .await?;

        Ok(Session {
            access_token,
            refresh_token,
            expires_in: self.access_token_ttl,
            user,
        })
    }

    async fn fetch_user(&self, user_id: u64) -> BackendResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let row = sqlx::query_as::<_, UserSql>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(User::from))
    }

    async fn fetch_registration<'c, E>(&self, executor: E, id: u64) -> BackendResult<TimeRegistration>
    where
        E: Executor<'c, Database = MySql>,
    {
        let sql = format!("SELECT {REGISTRATION_COLUMNS} FROM time_registrations WHERE id = ?");
        Ok(sqlx::query_as::<_, TimeRegistration>(&sql)
            .bind(id)
            .fetch_one(executor)
            .await?)
    }
}

// Config bounds every lifetime well below i64::MAX seconds.
fn seconds(ttl: usize) -> Duration {
    Duration::seconds(ttl as i64)
}

async fn revoke_all<'c, E>(executor: E, user_id: u64) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE, rotated_at = NULL WHERE user_id = ?")
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(())
}

fn push_worker_conditions(qb: &mut QueryBuilder<'_, MySql>, filter: &WorkerFilter) {
    qb.push(" WHERE 1 = 1");

    if let Some(is_active) = filter.is_active {
        qb.push(" AND is_active = ").push_bind(is_active);
    }
    if let Some(department) = &filter.department {
        qb.push(" AND department = ").push_bind(department.clone());
    }
    if let Some(search) = &filter.search {
        let like = format!("%{}%", escape_like(search));
        qb.push(" AND (first_name LIKE ")
            .push_bind(like.clone())
            .push(" OR last_name LIKE ")
            .push_bind(like)
            .push(")");
    }
}

fn push_registration_conditions(
    qb: &mut QueryBuilder<'_, MySql>,
    worker_id: Option<u64>,
    range: TimeRange,
    open: Option<bool>,
) {
    qb.push(" WHERE 1 = 1");

    if let Some(worker_id) = worker_id {
        qb.push(" AND r.worker_id = ").push_bind(worker_id);
    }
    if let Some(from) = range.from {
        qb.push(" AND r.clock_in >= ").push_bind(from);
    }
    if let Some(to) = range.to {
        qb.push(" AND r.clock_in < ").push_bind(to);
    }
    match open {
        Some(true) => {
            qb.push(" AND r.clock_out IS NULL");
        }
        Some(false) => {
            qb.push(" AND r.clock_out IS NOT NULL");
        }
        None => {}
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl AuthApi for MySqlBackend {
    #[instrument(name = "sign_in", skip(self, password))]
    async fn sign_in_with_password(&self, email: &str, password: &str) -> BackendResult<Session> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
        let row = sqlx::query_as::<_, UserSql>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            info!("Invalid credentials: user not found");
            return Err(BackendError::InvalidCredentials);
        };

        if let Err(e) = verify_password(password, &row.password_hash) {
            info!(user_id = row.id, error = %e, "Invalid credentials: password mismatch");
            return Err(BackendError::InvalidCredentials);
        }

        let now = Utc::now();
        if let Err(e) = sqlx::query("UPDATE users SET last_sign_in_at = ? WHERE id = ?")
            .bind(now)
            .bind(row.id)
            .execute(&self.pool)
            .await
        {
            // the login goes ahead regardless
            error!(error = %e, "Failed to update last_sign_in_at");
        }

        let mut user = User::from(row);
        user.last_sign_in_at = Some(now);

        self.issue_session(&self.pool, user).await
    }

    async fn get_user(&self, access_token: &str) -> BackendResult<User> {
        let claims = verify_token_of_type(access_token, &self.jwt_secret, TokenType::Access)
            .ok_or(BackendError::InvalidSession)?;

        self.fetch_user(claims.user_id)
            .await?
            .ok_or(BackendError::InvalidSession)
    }

    #[instrument(name = "refresh_session", skip_all)]
    async fn refresh_session(&self, refresh_token: &str) -> BackendResult<Session> {
        let claims = verify_token_of_type(refresh_token, &self.jwt_secret, TokenType::Refresh)
            .ok_or(BackendError::InvalidSession)?;

        let mut tx = self.pool.begin().await?;

        // parallel refreshes with the same token queue up on this row
        let record = sqlx::query_as::<_, (u64, u64, bool, Option<DateTime<Utc>>)>(
            "SELECT id, user_id, revoked, rotated_at FROM refresh_tokens WHERE jti = ? FOR UPDATE",
        )
        .bind(&claims.jti)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((record_id, user_id, revoked, rotated_at)) = record else {
            return Err(BackendError::InvalidSession);
        };

        let now = Utc::now();
        match classify_refresh(revoked, rotated_at, now, seconds(self.refresh_reuse_grace)) {
            RefreshUse::Rotate => {
                sqlx::query("UPDATE refresh_tokens SET revoked = TRUE, rotated_at = ? WHERE id = ?")
                    .bind(now)
                    .bind(record_id)
                    .execute(&mut *tx)
                    .await?;
            }
            RefreshUse::Replay => {
                debug!(user_id, "Refresh token replayed within the grace window");
            }
            RefreshUse::Reuse => {
                warn!(user_id, "Rotated refresh token reused, revoking all sessions");
                revoke_all(&mut *tx, user_id).await?;
                tx.commit().await?;
                return Err(BackendError::InvalidSession);
            }
            RefreshUse::Revoked => return Err(BackendError::InvalidSession),
        }

        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let user = sqlx::query_as::<_, UserSql>(&sql)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(User::from)
            .ok_or(BackendError::InvalidSession)?;

        let session = self.issue_session(&mut *tx, user).await?;
        tx.commit().await?;

        debug!(user_id, "Session refreshed");
        Ok(session)
    }

    async fn sign_out(&self, refresh_token: &str) -> BackendResult<()> {
        let Some(claims) =
            verify_token_of_type(refresh_token, &self.jwt_secret, TokenType::Refresh)
        else {
            debug!("Sign out with an unusable refresh token, nothing to revoke");
            return Ok(());
        };

        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE, rotated_at = NULL WHERE jti = ?")
            .bind(&claims.jti)
            .execute(&self.pool)
            .await?;

        info!(user_id = claims.user_id, "Signed out");
        Ok(())
    }

    #[instrument(name = "reset_password_for_email", skip(self))]
    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> BackendResult<()> {
        let user_id = sqlx::query_scalar::<_, u64>("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        let Some(user_id) = user_id else {
            info!("Password reset requested for unknown email");
            return Ok(());
        };

        let token = Uuid::new_v4().to_simple().to_string();
        sqlx::query(
            r#"
            INSERT INTO password_resets (user_id, token, expires_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(&token)
        .bind(Utc::now() + seconds(self.password_reset_ttl))
        .execute(&self.pool)
        .await?;

        // picked up by the outbound mail relay
        info!(
            user_id,
            reset_link = %format!("{redirect_to}?token={token}"),
            "Password reset link issued"
        );
        Ok(())
    }

    async fn update_password(&self, reset_token: &str, new_password: &str) -> BackendResult<()> {
        let mut tx = self.pool.begin().await?;

        let reset = sqlx::query_as::<_, (u64, u64)>(
            r#"
            SELECT id, user_id
            FROM password_resets
            WHERE token = ? AND used_at IS NULL AND expires_at > ?
            FOR UPDATE
            "#,
        )
        .bind(reset_token)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?;

        let Some((reset_id, user_id)) = reset else {
            return Err(BackendError::InvalidResetToken);
        };

        let hashed = hash_password(new_password)?;

        sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(hashed)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE password_resets SET used_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(reset_id)
            .execute(&mut *tx)
            .await?;
        revoke_all(&mut *tx, user_id).await?;

        tx.commit().await?;

        info!(user_id, "Password updated, sessions revoked");
        Ok(())
    }
}

#[async_trait]
impl Database for MySqlBackend {
    async fn find_admin_by_user(&self, user_id: u64) -> BackendResult<Option<Admin>> {
        Ok(sqlx::query_as::<_, Admin>(
            "SELECT id, user_id, display_name, created_at FROM admins WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_workers(&self, filter: &WorkerFilter) -> BackendResult<Page<Worker>> {
        let mut count = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM workers");
        push_worker_conditions(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut data = QueryBuilder::<MySql>::new(format!("SELECT {WORKER_COLUMNS} FROM workers"));
        push_worker_conditions(&mut data, filter);
        data.push(" ORDER BY last_name, first_name, id LIMIT ")
            .push_bind(filter.pagination.limit() as i64)
            .push(" OFFSET ")
            .push_bind(filter.pagination.offset() as i64);

        debug!(sql = %data.sql(), "Fetching workers");

        let workers = data
            .build_query_as::<Worker>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(workers, filter.pagination, total))
    }

    async fn count_workers(&self) -> BackendResult<WorkerCounts> {
        let (total, active) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COUNT(CASE WHEN is_active THEN 1 END) FROM workers",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(WorkerCounts { total, active })
    }

    async fn get_worker(&self, id: u64) -> BackendResult<Option<Worker>> {
        let sql = format!("SELECT {WORKER_COLUMNS} FROM workers WHERE id = ?");
        Ok(sqlx::query_as::<_, Worker>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_worker_by_pin(&self, pin: &str) -> BackendResult<Option<Worker>> {
        let sql = format!("SELECT {WORKER_COLUMNS} FROM workers WHERE pin = ?");
        Ok(sqlx::query_as::<_, Worker>(&sql)
            .bind(pin)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_worker(&self, worker: &NewWorker) -> BackendResult<Worker> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO workers
            (first_name, last_name, pin, department, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&worker.first_name)
        .bind(&worker.last_name)
        .bind(&worker.pin)
        .bind(&worker.department)
        .bind(worker.is_active)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match BackendError::from(e) {
            BackendError::Conflict(_) => BackendError::Conflict("PIN is already in use".into()),
            other => other,
        })?;

        let id = result.last_insert_id();
        info!(worker_id = id, "Worker created");

        self.get_worker(id)
            .await?
            .ok_or_else(|| BackendError::Rejected(format!("Worker {id} disappeared after insert")))
    }

    async fn update_worker(&self, id: u64, changes: &WorkerChanges) -> BackendResult<Option<Worker>> {
        let update = SqlUpdate::new("workers")
            .set_opt("first_name", changes.first_name.clone())
            .set_opt("last_name", changes.last_name.clone())
            .set_opt("pin", changes.pin.clone())
            .set_opt("department", changes.department.clone())
            .set_opt("is_active", changes.is_active);

        if !update.is_empty() {
            update
                .set("updated_at", Utc::now())
                .execute(&self.pool, "id", id)
                .await
                .map_err(|e| match BackendError::from(e) {
                    BackendError::Conflict(_) => {
                        BackendError::Conflict("PIN is already in use".into())
                    }
                    other => other,
                })?;
        }

        // rows_affected is 0 for no-op updates, so read back instead
        self.get_worker(id).await
    }

    async fn delete_worker(&self, id: u64) -> BackendResult<bool> {
        // time_registrations cascade
        let result = sqlx::query("DELETE FROM workers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(name = "toggle_clock", skip(self))]
    async fn toggle_clock(&self, worker_id: u64, at: DateTime<Utc>) -> BackendResult<ClockEvent> {
        let mut tx = self.pool.begin().await?;

        // serializes concurrent toggles of the same worker
        let locked = sqlx::query_scalar::<_, u64>("SELECT id FROM workers WHERE id = ? FOR UPDATE")
            .bind(worker_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(BackendError::Rejected("Worker not found".into()));
        }

        let sql = format!(
            "SELECT {REGISTRATION_COLUMNS} FROM time_registrations \
             WHERE worker_id = ? AND clock_out IS NULL ORDER BY clock_in DESC LIMIT 1"
        );
        let open = sqlx::query_as::<_, TimeRegistration>(&sql)
            .bind(worker_id)
            .fetch_optional(&mut *tx)
            .await?;

        let (action, id) = match open {
            Some(open) => {
                let clock_out = at.max(open.clock_in);
                sqlx::query("UPDATE time_registrations SET clock_out = ? WHERE id = ?")
                    .bind(clock_out)
                    .bind(open.id)
                    .execute(&mut *tx)
                    .await?;
                (ClockAction::ClockOut, open.id)
            }
            None => {
                let result = sqlx::query(
                    "INSERT INTO time_registrations (worker_id, clock_in, created_at) VALUES (?, ?, ?)",
                )
                .bind(worker_id)
                .bind(at)
                .bind(at)
                .execute(&mut *tx)
                .await?;
                (ClockAction::ClockIn, result.last_insert_id())
            }
        };

        let registration = self.fetch_registration(&mut *tx, id).await?;
        tx.commit().await?;

        info!(registration_id = id, action = %action, "Clock toggled");
        Ok(ClockEvent {
            action,
            registration,
        })
    }

    async fn list_time_registrations(
        &self,
        filter: &RegistrationFilter,
    ) -> BackendResult<Page<TimeRegistrationEntry>> {
        let mut count = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM time_registrations r");
        push_registration_conditions(&mut count, filter.worker_id, filter.range, filter.open);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut data = QueryBuilder::<MySql>::new(
            r#"
            SELECT r.id, r.worker_id, w.first_name, w.last_name, r.clock_in, r.clock_out
            FROM time_registrations r
            JOIN workers w ON w.id = r.worker_id
            "#,
        );
        push_registration_conditions(&mut data, filter.worker_id, filter.range, filter.open);
        data.push(" ORDER BY r.clock_in DESC, r.id DESC LIMIT ")
            .push_bind(filter.pagination.limit() as i64)
            .push(" OFFSET ")
            .push_bind(filter.pagination.offset() as i64);

        let entries = data
            .build_query_as::<TimeRegistrationEntry>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(entries, filter.pagination, total))
    }

    async fn registrations_for_worker(
        &self,
        worker_id: u64,
        range: TimeRange,
    ) -> BackendResult<Vec<TimeRegistration>> {
        let mut query = QueryBuilder::<MySql>::new(
            "SELECT r.id, r.worker_id, r.clock_in, r.clock_out, r.created_at FROM time_registrations r",
        );
        push_registration_conditions(&mut query, Some(worker_id), range, None);
        query.push(" ORDER BY r.clock_in, r.id");

        Ok(query
            .build_query_as::<TimeRegistration>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_time_registration(&self, id: u64) -> BackendResult<Option<TimeRegistration>> {
        let sql = format!("SELECT {REGISTRATION_COLUMNS} FROM time_registrations WHERE id = ?");
        Ok(sqlx::query_as::<_, TimeRegistration>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_time_registration(
        &self,
        id: u64,
        changes: &RegistrationChanges,
    ) -> BackendResult<Option<TimeRegistration>> {
        let mut tx = self.pool.begin().await?;

        // a concurrent clock-out cannot slip in between the check and the write
        let sql = format!(
            "SELECT {REGISTRATION_COLUMNS} FROM time_registrations WHERE id = ? FOR UPDATE"
        );
        let current = sqlx::query_as::<_, TimeRegistration>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(current) = current else {
            return Ok(None);
        };

        changes.merged(&current).map_err(BackendError::Invalid)?;

        let update = SqlUpdate::new("time_registrations")
            .set_opt("clock_in", changes.clock_in)
            .set_opt("clock_out", changes.clock_out);
        if !update.is_empty() {
            update.execute(&mut *tx, "id", id).await?;
        }

        let updated = self.fetch_registration(&mut *tx, id).await?;
        tx.commit().await?;

        Ok(Some(updated))
    }

    async fn delete_time_registration(&self, id: u64) -> BackendResult<bool> {
        let result = sqlx::query("DELETE FROM time_registrations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
