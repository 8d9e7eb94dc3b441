#![allow(dead_code, unused_macros)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use actix_web::test::TestRequest;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use timefly::api::workers::CreateWorker;
use timefly::backend::{
    AuthApi, BackendError, BackendResult, Database, RefreshUse, Session, classify_refresh,
};
use timefly::config::Config;
use timefly::model::{
    Page, Pagination,
    admin::Admin,
    time_registration::{
        ClockAction, ClockEvent, RegistrationChanges, RegistrationFilter, TimeRange,
        TimeRegistration, TimeRegistrationEntry,
    },
    user::User,
    worker::{NewWorker, Worker, WorkerChanges, WorkerCounts, WorkerFilter},
};

/// Builds the full app around an in-memory backend.
macro_rules! test_app {
    ($backend:expr) => {{
        let config = common::test_config();
        let limiters = timefly::routes::RateLimiters::from_config(&config);
        let backend: std::sync::Arc<dyn timefly::backend::Backend> = $backend.clone();
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::from(backend))
                .app_data(actix_web::web::Data::new(config.clone()))
                .configure(|cfg| timefly::routes::configure(cfg, &config, &limiters)),
        )
        .await
    }};
}

pub const ADMIN_EMAIL: &str = "admin@timefly.app";
pub const ADMIN_PASSWORD: &str = "correct horse battery";
pub const STAFF_EMAIL: &str = "staff@timefly.app";
pub const STAFF_PASSWORD: &str = "staff password 1";

/// Same as the `REFRESH_REUSE_GRACE` default.
pub const REFRESH_REUSE_GRACE_SECS: i64 = 30;

pub fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "SERVER_ADDR" => Some("127.0.0.1:0".into()),
        "DATABASE_URL" => Some("mysql://localhost/timefly_test".into()),
        "JWT_SECRET" => Some("test-secret-test-secret-test-secret".into()),
        "SITE_URL" => Some("http://kiosk.test".into()),
        _ => None,
    })
    .expect("test config")
}

fn peer() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40_000))
}

// The per-IP limiters need a peer address on every request.
pub fn get(uri: &str) -> TestRequest {
    TestRequest::get().uri(uri).peer_addr(peer())
}

pub fn post(uri: &str) -> TestRequest {
    TestRequest::post().uri(uri).peer_addr(peer())
}

pub fn put(uri: &str) -> TestRequest {
    TestRequest::put().uri(uri).peer_addr(peer())
}

pub fn delete(uri: &str) -> TestRequest {
    TestRequest::delete().uri(uri).peer_addr(peer())
}

fn token() -> String {
    Uuid::new_v4().to_simple().to_string()
}

struct Account {
    user: User,
    password: String,
}

struct RefreshRecord {
    user_id: u64,
    revoked: bool,
    rotated_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    accounts: Vec<Account>,
    admins: Vec<Admin>,
    /// access token -> user id
    access_tokens: HashMap<String, u64>,
    refresh_tokens: HashMap<String, RefreshRecord>,
    /// reset token -> user id
    reset_tokens: HashMap<String, u64>,
    reset_requests: Vec<(String, String)>,
    workers: Vec<Worker>,
    registrations: Vec<TimeRegistration>,
}

impl State {
    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn session_for(&mut self, user: User) -> Session {
        let access_token = token();
        let refresh_token = token();
        self.access_tokens.insert(access_token.clone(), user.id);
        self.refresh_tokens.insert(
            refresh_token.clone(),
            RefreshRecord {
                user_id: user.id,
                revoked: false,
                rotated_at: None,
            },
        );
        Session {
            access_token,
            refresh_token,
            expires_in: 3600,
            user,
        }
    }

    fn user(&self, user_id: u64) -> Option<User> {
        self.accounts
            .iter()
            .find(|a| a.user.id == user_id)
            .map(|a| a.user.clone())
    }

    fn revoke_all(&mut self, user_id: u64) {
        for record in self.refresh_tokens.values_mut() {
            if record.user_id == user_id {
                record.revoked = true;
                record.rotated_at = None;
            }
        }
    }

    fn pin_taken(&self, pin: &str, except: Option<u64>) -> bool {
        self.workers
            .iter()
            .any(|w| w.pin == pin && Some(w.id) != except)
    }
}

/// `Backend` kept in memory, with switches to make the auth calls fail.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
    pub fail_sign_out: AtomicBool,
    pub fail_reset: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> std::sync::Arc<Self> {
        let backend = Self::default();
        backend.add_user(STAFF_EMAIL, STAFF_PASSWORD);
        let admin_user = backend.add_user(ADMIN_EMAIL, ADMIN_PASSWORD);
        backend.make_admin(admin_user.id);
        std::sync::Arc::new(backend)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("state lock")
    }

    pub fn add_user(&self, email: &str, password: &str) -> User {
        let mut state = self.state();
        let user = User {
            id: state.id(),
            email: email.to_string(),
            created_at: Utc::now(),
            last_sign_in_at: None,
        };
        state.accounts.push(Account {
            user: user.clone(),
            password: password.to_string(),
        });
        user
    }

    pub fn make_admin(&self, user_id: u64) -> Admin {
        let mut state = self.state();
        let admin = Admin {
            id: state.id(),
            user_id,
            display_name: Some("Office".into()),
            created_at: Utc::now(),
        };
        state.admins.push(admin.clone());
        admin
    }

    /// Signs in without going through HTTP.
    pub fn session(&self, email: &str) -> Session {
        let mut state = self.state();
        let user = state
            .accounts
            .iter()
            .find(|a| a.user.email == email)
            .map(|a| a.user.clone())
            .expect("known user");
        state.session_for(user)
    }

    pub fn expire_access_token(&self, access_token: &str) {
        self.state().access_tokens.remove(access_token);
    }

    pub fn is_revoked(&self, refresh_token: &str) -> bool {
        self.state()
            .refresh_tokens
            .get(refresh_token)
            .map_or(true, |record| record.revoked)
    }

    /// Moves the rotation of `refresh_token` back in time, past any grace window.
    pub fn age_rotation(&self, refresh_token: &str, by: Duration) {
        if let Some(record) = self.state().refresh_tokens.get_mut(refresh_token) {
            record.rotated_at = record.rotated_at.map(|at| at - by);
        }
    }

    pub fn reset_requests(&self) -> Vec<(String, String)> {
        self.state().reset_requests.clone()
    }

    pub fn insert_worker(&self, worker: NewWorker) -> Worker {
        let mut state = self.state();
        let now = Utc::now();
        let worker = Worker {
            id: state.id(),
            first_name: worker.first_name,
            last_name: worker.last_name,
            pin: worker.pin,
            department: worker.department,
            is_active: worker.is_active,
            created_at: now,
            updated_at: now,
        };
        state.workers.push(worker.clone());
        worker
    }

    pub fn insert_registration(
        &self,
        worker_id: u64,
        clock_in: DateTime<Utc>,
        clock_out: Option<DateTime<Utc>>,
    ) -> TimeRegistration {
        let mut state = self.state();
        let registration = TimeRegistration {
            id: state.id(),
            worker_id,
            clock_in,
            clock_out,
            created_at: clock_in,
        };
        state.registrations.push(registration.clone());
        registration
    }

    pub fn registrations_of(&self, worker_id: u64) -> Vec<TimeRegistration> {
        self.state()
            .registrations
            .iter()
            .filter(|r| r.worker_id == worker_id)
            .cloned()
            .collect()
    }
}

/// Case-insensitive name search plus exact department and active flag, as the SQL does.
fn worker_matches(filter: &WorkerFilter, worker: &Worker) -> bool {
    let search = filter.search.as_deref().map(str::to_lowercase);
    let name_hit = search.map_or(true, |needle| {
        worker.first_name.to_lowercase().contains(&needle)
            || worker.last_name.to_lowercase().contains(&needle)
    });

    name_hit
        && filter
            .department
            .as_ref()
            .map_or(true, |d| worker.department.as_ref() == Some(d))
        && filter.is_active.map_or(true, |a| worker.is_active == a)
}

fn apply_worker_changes(changes: &WorkerChanges, worker: &mut Worker) {
    if let Some(first_name) = &changes.first_name {
        worker.first_name = first_name.clone();
    }
    if let Some(last_name) = &changes.last_name {
        worker.last_name = last_name.clone();
    }
    if let Some(pin) = &changes.pin {
        worker.pin = pin.clone();
    }
    if let Some(department) = &changes.department {
        worker.department = department.clone();
    }
    if let Some(is_active) = changes.is_active {
        worker.is_active = is_active;
    }
}

/// Half-open `[from, to)` like the SQL conditions.
fn in_range(range: TimeRange, at: DateTime<Utc>) -> bool {
    range.from.map_or(true, |from| at >= from) && range.to.map_or(true, |to| at < to)
}

fn registration_matches(filter: &RegistrationFilter, registration: &TimeRegistration) -> bool {
    filter.worker_id.map_or(true, |id| registration.worker_id == id)
        && in_range(filter.range, registration.clock_in)
        && filter.open.map_or(true, |open| registration.is_open() == open)
}

/// One page cut out of an already sorted list.
fn page_of<T>(items: Vec<T>, pagination: Pagination) -> Page<T> {
    let total = items.len() as i64;
    let data = items
        .into_iter()
        .skip(pagination.offset() as usize)
        .take(pagination.limit() as usize)
        .collect();
    Page::new(data, pagination, total)
}

#[async_trait]
impl AuthApi for MemoryBackend {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> BackendResult<Session> {
        let mut state = self.state();
        let user = state
            .accounts
            .iter_mut()
            .find(|a| a.user.email == email && a.password == password)
            .map(|a| {
                a.user.last_sign_in_at = Some(Utc::now());
                a.user.clone()
            })
            .ok_or(BackendError::InvalidCredentials)?;
        Ok(state.session_for(user))
    }

    async fn get_user(&self, access_token: &str) -> BackendResult<User> {
        let state = self.state();
        state
            .access_tokens
            .get(access_token)
            .and_then(|id| state.user(*id))
            .ok_or(BackendError::InvalidSession)
    }

    async fn refresh_session(&self, refresh_token: &str) -> BackendResult<Session> {
        let mut state = self.state();
        let now = Utc::now();
        let record = state
            .refresh_tokens
            .get_mut(refresh_token)
            .ok_or(BackendError::InvalidSession)?;
        let user_id = record.user_id;

        match classify_refresh(
            record.revoked,
            record.rotated_at,
            now,
            Duration::seconds(REFRESH_REUSE_GRACE_SECS),
        ) {
            RefreshUse::Rotate => {
                record.revoked = true;
                record.rotated_at = Some(now);
            }
            RefreshUse::Replay => {}
            RefreshUse::Reuse => {
                state.revoke_all(user_id);
                return Err(BackendError::InvalidSession);
            }
            RefreshUse::Revoked => return Err(BackendError::InvalidSession),
        }
        let user = state.user(user_id).ok_or(BackendError::InvalidSession)?;
        Ok(state.session_for(user))
    }

    async fn sign_out(&self, refresh_token: &str) -> BackendResult<()> {
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected("Session could not be revoked".into()));
        }
        if let Some(record) = self.state().refresh_tokens.get_mut(refresh_token) {
            record.revoked = true;
            record.rotated_at = None;
        }
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> BackendResult<()> {
        if self.fail_reset.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected("Email rate limit exceeded".into()));
        }
        let mut state = self.state();
        let user_id = state
            .accounts
            .iter()
            .find(|a| a.user.email == email)
            .map(|a| a.user.id);
        if let Some(user_id) = user_id {
            let reset = token();
            state.reset_tokens.insert(reset.clone(), user_id);
            state
                .reset_requests
                .push((email.to_string(), format!("{redirect_to}?token={reset}")));
        }
        Ok(())
    }

    async fn update_password(&self, reset_token: &str, new_password: &str) -> BackendResult<()> {
        let mut state = self.state();
        let user_id = state
            .reset_tokens
            .remove(reset_token)
            .ok_or(BackendError::InvalidResetToken)?;
        if let Some(account) = state.accounts.iter_mut().find(|a| a.user.id == user_id) {
            account.password = new_password.to_string();
        }
        state.revoke_all(user_id);
        Ok(())
    }
}

#[async_trait]
impl Database for MemoryBackend {
    async fn find_admin_by_user(&self, user_id: u64) -> BackendResult<Option<Admin>> {
        Ok(self
            .state()
            .admins
            .iter()
            .find(|a| a.user_id == user_id)
            .cloned())
    }

    async fn list_workers(&self, filter: &WorkerFilter) -> BackendResult<Page<Worker>> {
        let mut workers: Vec<Worker> = self
            .state()
            .workers
            .iter()
            .filter(|w| worker_matches(filter, w))
            .cloned()
            .collect();
        workers.sort_by(|a, b| {
            (&a.last_name, &a.first_name, a.id).cmp(&(&b.last_name, &b.first_name, b.id))
        });
        Ok(page_of(workers, filter.pagination))
    }

    async fn count_workers(&self) -> BackendResult<WorkerCounts> {
        let state = self.state();
        Ok(WorkerCounts {
            total: state.workers.len() as i64,
            active: state.workers.iter().filter(|w| w.is_active).count() as i64,
        })
    }

    async fn get_worker(&self, id: u64) -> BackendResult<Option<Worker>> {
        Ok(self.state().workers.iter().find(|w| w.id == id).cloned())
    }

    async fn find_worker_by_pin(&self, pin: &str) -> BackendResult<Option<Worker>> {
        Ok(self.state().workers.iter().find(|w| w.pin == pin).cloned())
    }

    async fn create_worker(&self, worker: &NewWorker) -> BackendResult<Worker> {
        if self.state().pin_taken(&worker.pin, None) {
            return Err(BackendError::Conflict("PIN is already in use".into()));
        }
        Ok(self.insert_worker(worker.clone()))
    }

    async fn update_worker(&self, id: u64, changes: &WorkerChanges) -> BackendResult<Option<Worker>> {
        let mut state = self.state();
        if let Some(pin) = &changes.pin {
            if state.pin_taken(pin, Some(id)) {
                return Err(BackendError::Conflict("PIN is already in use".into()));
            }
        }
        let Some(worker) = state.workers.iter_mut().find(|w| w.id == id) else {
            return Ok(None);
        };
        apply_worker_changes(changes, worker);
        worker.updated_at = Utc::now();
        Ok(Some(worker.clone()))
    }

    async fn delete_worker(&self, id: u64) -> BackendResult<bool> {
        let mut state = self.state();
        let before = state.workers.len();
        state.workers.retain(|w| w.id != id);
        state.registrations.retain(|r| r.worker_id != id);
        Ok(state.workers.len() != before)
    }

    async fn toggle_clock(&self, worker_id: u64, at: DateTime<Utc>) -> BackendResult<ClockEvent> {
        let mut state = self.state();
        if let Some(open) = state
            .registrations
            .iter_mut()
            .find(|r| r.worker_id == worker_id && r.is_open())
        {
            open.clock_out = Some(at.max(open.clock_in));
            return Ok(ClockEvent {
                action: ClockAction::ClockOut,
                registration: open.clone(),
            });
        }

        let registration = TimeRegistration {
            id: state.id(),
            worker_id,
            clock_in: at,
            clock_out: None,
            created_at: at,
        };
        state.registrations.push(registration.clone());
        Ok(ClockEvent {
            action: ClockAction::ClockIn,
            registration,
        })
    }

    async fn list_time_registrations(
        &self,
        filter: &RegistrationFilter,
    ) -> BackendResult<Page<TimeRegistrationEntry>> {
        let state = self.state();
        let mut matching: Vec<&TimeRegistration> = state
            .registrations
            .iter()
            .filter(|r| registration_matches(filter, r))
            .collect();
        matching.sort_by(|a, b| (b.clock_in, b.id).cmp(&(a.clock_in, a.id)));

        let entries = matching
            .into_iter()
            .filter_map(|r| {
                let worker = state.workers.iter().find(|w| w.id == r.worker_id)?;
                Some(TimeRegistrationEntry {
                    id: r.id,
                    worker_id: r.worker_id,
                    first_name: worker.first_name.clone(),
                    last_name: worker.last_name.clone(),
                    clock_in: r.clock_in,
                    clock_out: r.clock_out,
                })
            })
            .collect();
        Ok(page_of(entries, filter.pagination))
    }

    async fn registrations_for_worker(
        &self,
        worker_id: u64,
        range: TimeRange,
    ) -> BackendResult<Vec<TimeRegistration>> {
        let mut registrations: Vec<TimeRegistration> = self
            .state()
            .registrations
            .iter()
            .filter(|r| r.worker_id == worker_id && in_range(range, r.clock_in))
            .cloned()
            .collect();
        registrations.sort_by_key(|r| (r.clock_in, r.id));
        Ok(registrations)
    }

    async fn get_time_registration(&self, id: u64) -> BackendResult<Option<TimeRegistration>> {
        Ok(self
            .state()
            .registrations
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn update_time_registration(
        &self,
        id: u64,
        changes: &RegistrationChanges,
    ) -> BackendResult<Option<TimeRegistration>> {
        let mut state = self.state();
        let Some(registration) = state.registrations.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        *registration = changes.merged(registration).map_err(BackendError::Invalid)?;
        Ok(Some(registration.clone()))
    }

    async fn delete_time_registration(&self, id: u64) -> BackendResult<bool> {
        let mut state = self.state();
        let before = state.registrations.len();
        state.registrations.retain(|r| r.id != id);
        Ok(state.registrations.len() != before)
    }
}

/// Worker payloads with sensible defaults, override what a test cares about.
pub struct WorkerBuilder {
    first_name: String,
    last_name: String,
    pin: String,
    department: Option<String>,
    is_active: bool,
}

pub fn a_worker() -> WorkerBuilder {
    WorkerBuilder {
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        pin: "1234".into(),
        department: Some("Bakery".into()),
        is_active: true,
    }
}

impl WorkerBuilder {
    pub fn with_first_name(mut self, first_name: &str) -> Self {
        self.first_name = first_name.into();
        self
    }

    pub fn with_last_name(mut self, last_name: &str) -> Self {
        self.last_name = last_name.into();
        self
    }

    pub fn with_pin(mut self, pin: &str) -> Self {
        self.pin = pin.into();
        self
    }

    pub fn with_department(mut self, department: Option<&str>) -> Self {
        self.department = department.map(str::to_string);
        self
    }

    pub fn with_is_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    /// The JSON payload of `POST /api/workers`.
    pub fn build(self) -> CreateWorker {
        CreateWorker {
            first_name: self.first_name,
            last_name: self.last_name,
            pin: self.pin,
            department: self.department,
            is_active: Some(self.is_active),
        }
    }

    /// The validated form, for seeding a backend directly.
    pub fn build_new(self) -> NewWorker {
        NewWorker {
            first_name: self.first_name,
            last_name: self.last_name,
            pin: self.pin,
            department: self.department,
            is_active: self.is_active,
        }
    }
}
