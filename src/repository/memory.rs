//! In-memory stores.
//!
//! Used by the test suites and for running the API without PostgreSQL.
//! Every read-modify-write happens under a single write guard, which gives
//! the same per-row atomicity as the SQL statements in the sibling modules.

use super::{hash_token, AuditSink, CredentialStore, LoginAttemptLog, SessionStore};
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
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> DateTime<Utc>) {
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryCredentialStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a stored row wholesale, e.g. to seed lockout state.
    pub async fn put(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn email_taken(&self, email: &str, exclude: Option<Uuid>) -> Result<bool, AppError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .any(|u| u.email == email && Some(u.id) != exclude))
    }

    async fn create(&self, new: NewUser, now: DateTime<Utc>) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == new.email) {
            return Err(AppError::Conflict("Email is already in use.".to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            name: new.name,
            phone: new.phone,
            role: new.role,
            status: new.status,
            department_id: new.department_id,
            is_active: new.is_active,
            is_verified: new.is_verified,
            is_staff: new.is_staff,
            login_attempts: 0,
            last_login_at: None,
            last_failed_login_at: None,
            account_locked_at: None,
            created_by: new.created_by,
            updated_by: new.created_by,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn update(
        &self,
        id: Uuid,
        changes: UserChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let mut users = self.users.write().await;

        if let Some(email) = &changes.email {
            if users.values().any(|u| &u.email == email && u.id != id) {
                return Err(AppError::Conflict("Email is already in use.".to_string()));
            }
        }

        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(v) = changes.email {
            user.email = v;
        }
        if let Some(v) = changes.password_hash {
            user.password_hash = v;
        }
        if let Some(v) = changes.name {
            user.name = Some(v);
        }
        if let Some(v) = changes.phone {
            user.phone = Some(v);
        }
        if let Some(v) = changes.role {
            user.role = Some(v);
        }
        if let Some(v) = changes.status {
            user.status = v;
        }
        if let Some(v) = changes.department_id {
            user.department_id = Some(v);
        }
        if let Some(v) = changes.is_active {
            user.is_active = v;
        }
        if let Some(v) = changes.updated_by {
            user.updated_by = Some(v);
        }
        user.updated_at = now;

        Ok(Some(user.clone()))
    }

    async fn list(&self, filter: &UserFilter) -> Result<Vec<User>, AppError> {
        let mut users: Vec<User> = self
            .users
            .read()
            .await
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect();
        newest_first(&mut users, |u| u.created_at);

        Ok(users)
    }

    async fn search(&self, query: &str) -> Result<Vec<User>, AppError> {
        let needle = query.to_lowercase();
        let contains = |field: Option<&str>| {
            field.is_some_and(|f| f.to_lowercase().contains(&needle))
        };

        let mut users: Vec<User> = self
            .users
            .read()
            .await
            .values()
            .filter(|u| {
                contains(u.name.as_deref()) || contains(Some(&u.email)) || contains(u.role.as_deref())
            })
            .cloned()
            .collect();
        newest_first(&mut users, |u| u.created_at);

        Ok(users)
    }

    async fn clear_expired_lock(
        &self,
        id: Uuid,
        locked_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(user) if user.account_locked_at == Some(locked_at) => {
                user.login_attempts = 0;
                user.account_locked_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        threshold: i32,
    ) -> Result<LockoutState, AppError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        user.login_attempts += 1;
        user.last_failed_login_at = Some(at);
        if user.account_locked_at.is_none() && user.login_attempts >= threshold {
            user.account_locked_at = Some(at);
        }

        Ok(LockoutState {
            login_attempts: user.login_attempts,
            account_locked_at: user.account_locked_at,
        })
    }

    async fn record_successful_login(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        lock_cutoff: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let mut users = self.users.write().await;
        let unlocked = |user: &&mut User| {
            user.account_locked_at
                .map_or(true, |locked_at| locked_at <= lock_cutoff)
        };
        Ok(users.get_mut(&id).filter(unlocked).map(|user| {
            user.login_attempts = 0;
            user.account_locked_at = None;
            user.last_login_at = Some(at);
            user.clone()
        }))
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SessionTables {
    sessions: HashMap<String, Session>,
    revoked: HashSet<String>,
}

#[derive(Default)]
pub struct MemorySessionStore {
    inner: RwLock<SessionTables>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, new: NewSession) -> Result<Session, AppError> {
        let mut tables = self.inner.write().await;
        if tables.sessions.contains_key(&new.session_token) {
            tracing::error!(user_id = %new.user_id, "Session token collision");
            return Err(AppError::SessionConflict);
        }

        let session = Session {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            session_token: new.session_token,
            ip_address: new.ip_address,
            user_agent: new.user_agent,
            created_at: new.created_at,
            last_seen_at: new.created_at,
            is_active: true,
        };
        tables
            .sessions
            .insert(session.session_token.clone(), session.clone());

        Ok(session)
    }

    async fn touch(&self, user_id: Uuid, token: &str, at: DateTime<Utc>) -> Result<bool, AppError> {
        let mut tables = self.inner.write().await;
        match tables.sessions.get_mut(token) {
            Some(session) if session.user_id == user_id && session.is_active => {
                session.last_seen_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke(
        &self,
        user_id: Uuid,
        token: &str,
        _at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut tables = self.inner.write().await;
        let owned = tables
            .sessions
            .get(token)
            .is_some_and(|s| s.user_id == user_id && s.is_active);
        if !owned {
            return Ok(false);
        }

        tables.sessions.remove(token);
        tables.revoked.insert(hash_token(token));

        Ok(true)
    }

    async fn is_revoked(&self, token: &str) -> Result<bool, AppError> {
        Ok(self.inner.read().await.revoked.contains(&hash_token(token)))
    }

    async fn list(&self, user_id: Option<Uuid>) -> Result<Vec<Session>, AppError> {
        let mut sessions: Vec<Session> = self
            .inner
            .read()
            .await
            .sessions
            .values()
            .filter(|s| user_id.map_or(true, |id| s.user_id == id))
            .cloned()
            .collect();
        newest_first(&mut sessions, |s| s.created_at);

        Ok(sessions)
    }
}

// ---------------------------------------------------------------------------
// Login attempts
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryLoginAttemptLog {
    records: RwLock<Vec<LoginAttemptRecord>>,
}

impl MemoryLoginAttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record in insertion order.
    pub async fn all(&self) -> Vec<LoginAttemptRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl LoginAttemptLog for MemoryLoginAttemptLog {
    async fn append(&self, record: &LoginAttemptRecord) -> Result<(), AppError> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn list(
        &self,
        user_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<LoginAttemptRecord>, AppError> {
        let mut records: Vec<LoginAttemptRecord> = self
            .records
            .read()
            .await
            .iter()
            .filter(|r| user_id.map_or(true, |id| r.user_id == Some(id)))
            .cloned()
            .collect();
        newest_first(&mut records, |r| r.occurred_at);
        records.truncate(limit.max(0) as usize);

        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, entry: &AuditEntry) -> Result<(), AppError> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }
}
