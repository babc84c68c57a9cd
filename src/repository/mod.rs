//! Data access layer
//!
//! Each store is a trait so services can run against PostgreSQL in
//! production and against the in-memory stores in [`memory`] in tests.

pub mod audit_repo;
pub mod login_attempt_repo;
pub mod memory;
pub mod session_repo;
pub mod user_repo;

pub use audit_repo::AuditRepository;
pub use login_attempt_repo::LoginAttemptRepository;
pub use session_repo::{hash_token, SessionRepository};
pub use user_repo::UserRepository;

use crate::{
    error::AppError,
    models::{
        audit::AuditEntry,
        login_attempt::LoginAttemptRecord,
        session::{NewSession, Session},
        user::{LockoutState, NewUser, User, UserChanges, UserFilter},
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// 服务所依赖的全部存储
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn CredentialStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub attempts: Arc<dyn LoginAttemptLog>,
    pub audit: Arc<dyn AuditSink>,
}

impl Stores {
    /// PostgreSQL 存储
    pub fn postgres(db: PgPool) -> Self {
        Self {
            users: Arc::new(UserRepository::new(db.clone())),
            sessions: Arc::new(SessionRepository::new(db.clone())),
            attempts: Arc::new(LoginAttemptRepository::new(db.clone())),
            audit: Arc::new(AuditRepository::new(db)),
        }
    }

    /// 内存存储（测试与无数据库的本地运行）
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(memory::MemoryCredentialStore::new()),
            sessions: Arc::new(memory::MemorySessionStore::new()),
            attempts: Arc::new(memory::MemoryLoginAttemptLog::new()),
            audit: Arc::new(memory::MemoryAuditSink::new()),
        }
    }
}

/// Persisted user records with hashed secrets and lockout counters.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Look up by already-normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Whether `email` belongs to a user other than `exclude`.
    async fn email_taken(&self, email: &str, exclude: Option<Uuid>) -> Result<bool, AppError>;

    /// Insert a user. A duplicate email yields `AppError::Conflict`.
    async fn create(&self, user: NewUser, now: DateTime<Utc>) -> Result<User, AppError>;

    async fn update(
        &self,
        id: Uuid,
        changes: UserChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError>;

    /// Users matching `filter`, newest first.
    async fn list(&self, filter: &UserFilter) -> Result<Vec<User>, AppError>;

    /// Case-insensitive substring match over name, email and role, newest first.
    async fn search(&self, query: &str) -> Result<Vec<User>, AppError>;

    /// Reset `login_attempts` and clear `account_locked_at`, but only if the
    /// lock is still the one observed at `locked_at`. Returns whether this
    /// call performed the reset.
    async fn clear_expired_lock(
        &self,
        id: Uuid,
        locked_at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Atomically increment `login_attempts`, stamp `last_failed_login_at`
    /// and set `account_locked_at` once the counter reaches `threshold`.
    async fn record_failed_login(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        threshold: i32,
    ) -> Result<LockoutState, AppError>;

    /// Reset lockout state and stamp `last_login_at`, but only while the
    /// account is unlocked or its lock was set at or before `lock_cutoff`.
    /// Returns `None` when the user is missing or still locked.
    async fn record_successful_login(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        lock_cutoff: DateTime<Utc>,
    ) -> Result<Option<User>, AppError>;
}

/// Active refresh-token-backed sessions plus the revoked-token denylist.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Insert a session. An existing row with the same token is fatal and
    /// yields `AppError::SessionConflict`.
    async fn create(&self, session: NewSession) -> Result<Session, AppError>;

    /// Update `last_seen_at` of the active session owned by `user_id` with
    /// exactly this token. Returns whether a row matched.
    async fn touch(&self, user_id: Uuid, token: &str, at: DateTime<Utc>) -> Result<bool, AppError>;

    /// Delete the active session matching both user and token and deny-list
    /// the token. Returns `false` when no such session exists.
    async fn revoke(&self, user_id: Uuid, token: &str, at: DateTime<Utc>)
        -> Result<bool, AppError>;

    async fn is_revoked(&self, token: &str) -> Result<bool, AppError>;

    /// Sessions of one user, or of every user when `user_id` is `None`.
    async fn list(&self, user_id: Option<Uuid>) -> Result<Vec<Session>, AppError>;
}

/// Append-only login outcome log.
#[async_trait]
pub trait LoginAttemptLog: Send + Sync + 'static {
    async fn append(&self, record: &LoginAttemptRecord) -> Result<(), AppError>;

    /// Most recent first.
    async fn list(
        &self,
        user_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<LoginAttemptRecord>, AppError>;
}

/// Sink for before/after snapshots on write paths.
#[async_trait]
pub trait AuditSink: Send + Sync + 'static {
    async fn record(&self, entry: &AuditEntry) -> Result<(), AppError>;
}
