//! 登录服务：锁定状态机、凭证校验与会话创建
//!
//! Per-user states are `UNLOCKED` and `LOCKED` (`account_locked_at` set).
//! The lock check always runs before any credential is evaluated, and a lock
//! older than the lockout window is cleared lazily on the next attempt.

use crate::{
    auth::{captcha::ChallengeVerifier, middleware::AuthContext, password::PasswordHasher},
    config::AppConfig,
    error::AppError,
    models::{
        auth::{LoginRequest, LoginResponse},
        login_attempt::{ClientOrigin, FailureReason, LoginAttemptRecord},
        user::User,
    },
    repository::{CredentialStore, LoginAttemptLog},
    services::token_service::TokenService,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Lockout and challenge settings
#[derive(Debug, Clone)]
pub struct LoginPolicy {
    pub max_attempts: i32,
    pub lockout: Duration,
    pub debug_mode: bool,
    pub test_token: String,
}

impl LoginPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.security.max_login_attempts as i32,
            lockout: config.security.lockout_duration(),
            debug_mode: config.security.debug_mode,
            test_token: config.captcha.test_token.clone(),
        }
    }
}

pub struct LoginService {
    users: Arc<dyn CredentialStore>,
    attempts: Arc<dyn LoginAttemptLog>,
    tokens: Arc<TokenService>,
    challenge: Arc<dyn ChallengeVerifier>,
    hasher: PasswordHasher,
    policy: LoginPolicy,
}

impl LoginService {
    pub fn new(
        users: Arc<dyn CredentialStore>,
        attempts: Arc<dyn LoginAttemptLog>,
        tokens: Arc<TokenService>,
        challenge: Arc<dyn ChallengeVerifier>,
        hasher: PasswordHasher,
        policy: LoginPolicy,
    ) -> Self {
        Self {
            users,
            attempts,
            tokens,
            challenge,
            hasher,
            policy,
        }
    }

    /// 用户登录
    pub async fn login(
        &self,
        req: LoginRequest,
        origin: ClientOrigin,
    ) -> Result<LoginResponse, AppError> {
        self.login_at(req, origin, Utc::now()).await
    }

    /// 以给定时间执行登录
    pub async fn login_at(
        &self,
        req: LoginRequest,
        origin: ClientOrigin,
        now: DateTime<Utc>,
    ) -> Result<LoginResponse, AppError> {
        let mut req = req;
        req.email = User::normalize_email(&req.email);
        req.validate()?;
        let email = req.email.clone();

        let Some(mut user) = self.users.find_by_email(&email).await? else {
            tracing::info!(%email, "Login attempt for unknown email");
            self.reject(None, &email, &origin, now, FailureReason::InvalidCredentials)
                .await?;
            return Err(AppError::Authentication);
        };

        // 1. 锁定检查先于凭证校验
        if let Some(locked_at) = user.account_locked_at {
            if user.is_locked_at(now, self.policy.lockout) {
                self.reject(Some(user.id), &email, &origin, now, FailureReason::Locked)
                    .await?;
                return Err(AppError::AccountLocked);
            }

            if self.users.clear_expired_lock(user.id, locked_at).await? {
                tracing::info!(user_id = %user.id, "Lockout window elapsed; account unlocked");
            }
            user.login_attempts = 0;
            user.account_locked_at = None;
        }

        // 2. 人机验证 + 密码
        if !self.credentials_valid(&req, &user).await {
            let state = self
                .users
                .record_failed_login(user.id, now, self.policy.max_attempts)
                .await?;

            if state.newly_locked(user.account_locked_at.is_some()) {
                tracing::warn!(
                    user_id = %user.id,
                    attempts = state.login_attempts,
                    "Account locked after repeated failed logins"
                );
                metrics::counter!("auth_account_lockouts_total").increment(1);
            }

            self.reject(Some(user.id), &email, &origin, now, FailureReason::InvalidCredentials)
                .await?;
            return Err(AppError::Authentication);
        }

        // 3. 账户状态
        if !user.is_active {
            self.reject(Some(user.id), &email, &origin, now, FailureReason::InactiveAccount)
                .await?;
            return Err(AppError::AccountInactive);
        }

        // 4. 登录成功：仅在账户仍未被锁定时重置计数，之后才创建会话
        let Some(user) = self
            .users
            .record_successful_login(user.id, now, now - self.policy.lockout)
            .await?
        else {
            tracing::warn!(user_id = %user.id, "Account locked by a concurrent attempt");
            self.reject(Some(user.id), &email, &origin, now, FailureReason::Locked)
                .await?;
            return Err(AppError::AccountLocked);
        };

        let tokens = self.tokens.issue(&user)?;
        self.tokens.open_session(user.id, &tokens, &origin, now).await?;

        self.attempts
            .append(&LoginAttemptRecord::success(user.id, &email, &origin, now))
            .await?;

        metrics::counter!("auth_login_total", "outcome" => "success").increment(1);
        tracing::info!(user_id = %user.id, "User logged in");

        Ok(LoginResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user: user.into(),
        })
    }

    /// 登录记录（仅特权用户）
    pub async fn attempt_history(
        &self,
        caller: &AuthContext,
        user_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<LoginAttemptRecord>, AppError> {
        if !caller.is_staff {
            return Err(AppError::PermissionDenied);
        }

        self.attempts.list(user_id, limit.clamp(1, 500)).await
    }

    async fn credentials_valid(&self, req: &LoginRequest, user: &User) -> bool {
        self.challenge_passed(&req.recaptcha_token).await
            && self.hasher.verify(&req.password, &user.password_hash)
    }

    /// 校验人机验证；校验服务不可用时按失败处理
    async fn challenge_passed(&self, token: &str) -> bool {
        if self.policy.debug_mode && token == self.policy.test_token {
            return true;
        }

        match self.challenge.verify(token).await {
            Ok(passed) => passed,
            Err(e) => {
                tracing::warn!(error = %e, "Challenge verifier unavailable; rejecting login");
                false
            }
        }
    }

    /// 记录失败的登录尝试；记录失败时整个请求失败
    async fn reject(
        &self,
        user_id: Option<Uuid>,
        email: &str,
        origin: &ClientOrigin,
        now: DateTime<Utc>,
        reason: FailureReason,
    ) -> Result<(), AppError> {
        self.attempts
            .append(&LoginAttemptRecord::failure(user_id, email, origin, now, reason))
            .await?;

        metrics::counter!("auth_login_total", "outcome" => reason.as_str()).increment(1);
        tracing::info!(
            user_id = ?user_id,
            ip = ?origin.ip_address,
            reason = reason.as_str(),
            "Login rejected"
        );

        Ok(())
    }
}
