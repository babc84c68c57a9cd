//! User domain models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Default value of `User::status` for new accounts.
pub const STATUS_ACTIVE: &str = "Active";

/// Role allowed to toggle account activation.
pub const ROLE_ADMIN: &str = "Admin";

/// User account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,

    // Profile
    pub name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub status: String,
    pub department_id: Option<Uuid>,

    // Account state
    pub is_active: bool,
    pub is_verified: bool,
    pub is_staff: bool,

    // Lockout bookkeeping
    pub login_attempts: i32,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_failed_login_at: Option<DateTime<Utc>>,
    pub account_locked_at: Option<DateTime<Utc>>,

    // Metadata
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Lowercase and trim an email so lookups are case-insensitive.
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// Whether a lock set at `account_locked_at` is still in force at `now`.
    pub fn is_locked_at(&self, now: DateTime<Utc>, lockout: chrono::Duration) -> bool {
        match self.account_locked_at {
            Some(locked_at) => now - locked_at < lockout,
            None => false,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some(ROLE_ADMIN)
    }
}

/// Result of an atomic failed-login update
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct LockoutState {
    pub login_attempts: i32,
    pub account_locked_at: Option<DateTime<Utc>>,
}

impl LockoutState {
    pub fn is_locked(&self) -> bool {
        self.account_locked_at.is_some()
    }

    /// Whether this update is the one that locked the account.
    pub fn newly_locked(&self, was_locked: bool) -> bool {
        !was_locked && self.is_locked()
    }
}

/// Fields required to insert a user row
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub status: String,
    pub department_id: Option<Uuid>,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_staff: bool,
    pub created_by: Option<Uuid>,
}

/// Partial update applied to a user row; `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
    pub department_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub updated_by: Option<Uuid>,
}

/// Create user request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email(message = "Enter a valid email address."), length(max = 150))]
    pub email: String,
    pub password: String,
    #[validate(length(max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    #[validate(length(max = 50))]
    pub role: Option<String>,
    #[validate(length(max = 20))]
    pub status: Option<String>,
    pub department_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
}

/// Update user request
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(email(message = "Enter a valid email address."), length(max = 150))]
    pub email: Option<String>,
    pub password: Option<String>,
    #[validate(length(max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    #[validate(length(max = 50))]
    pub role: Option<String>,
    #[validate(length(max = 20))]
    pub status: Option<String>,
    pub department_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

/// Activation toggle request
#[derive(Debug, Deserialize)]
pub struct ToggleStatusRequest {
    pub is_active: Option<bool>,
}

/// Query for `GET /users/search`
#[derive(Debug, Default, Deserialize)]
pub struct UserSearchQuery {
    #[serde(default)]
    pub query: String,
}

/// Query for `GET /users/filter`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        let eq_ci = |want: &Option<String>, have: Option<&str>| match want {
            Some(w) => have.is_some_and(|h| h.eq_ignore_ascii_case(w)),
            None => true,
        };

        let created = user.created_at.date_naive();

        eq_ci(&self.role, user.role.as_deref())
            && eq_ci(&self.status, Some(user.status.as_str()))
            && self.start_date.map_or(true, |d| created >= d)
            && self.end_date.map_or(true, |d| created <= d)
    }
}

/// User response (without sensitive data)
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub status: String,
    pub department_id: Option<Uuid>,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_staff: bool,
    pub login_attempts: i32,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_failed_login_at: Option<DateTime<Utc>>,
    pub account_locked_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            phone: user.phone,
            role: user.role,
            status: user.status,
            department_id: user.department_id,
            is_active: user.is_active,
            is_verified: user.is_verified,
            is_staff: user.is_staff,
            login_attempts: user.login_attempts,
            last_login_at: user.last_login_at,
            last_failed_login_at: user.last_failed_login_at,
            account_locked_at: user.account_locked_at,
            created_by: user.created_by,
            updated_by: user.updated_by,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}
