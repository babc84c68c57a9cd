//! Login attempt log models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a login attempt was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Locked,
    InvalidCredentials,
    InactiveAccount,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Locked => "locked",
            FailureReason::InvalidCredentials => "invalid credentials",
            FailureReason::InactiveAccount => "inactive account",
        }
    }
}

/// Network origin of a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOrigin {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Immutable record of one login attempt
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LoginAttemptRecord {
    pub id: Uuid,
    /// `None` when the submitted email matched no account
    pub user_id: Option<Uuid>,
    pub email: String,
    pub occurred_at: DateTime<Utc>,
    pub success: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub reason: Option<String>,
}

impl LoginAttemptRecord {
    pub fn success(
        user_id: Uuid,
        email: &str,
        origin: &ClientOrigin,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::new(Some(user_id), email, origin, occurred_at, None)
    }

    pub fn failure(
        user_id: Option<Uuid>,
        email: &str,
        origin: &ClientOrigin,
        occurred_at: DateTime<Utc>,
        reason: FailureReason,
    ) -> Self {
        Self::new(user_id, email, origin, occurred_at, Some(reason))
    }

    fn new(
        user_id: Option<Uuid>,
        email: &str,
        origin: &ClientOrigin,
        occurred_at: DateTime<Utc>,
        reason: Option<FailureReason>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            email: email.to_string(),
            occurred_at,
            success: reason.is_none(),
            ip_address: origin.ip_address.clone(),
            user_agent: origin.user_agent.clone(),
            reason: reason.map(|r| r.as_str().to_string()),
        }
    }
}

/// Query for `GET /auth/login-attempts`
#[derive(Debug, Default, Deserialize)]
pub struct LoginAttemptQuery {
    pub user_id: Option<Uuid>,
    pub limit: Option<i64>,
}
