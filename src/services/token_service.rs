//! 令牌服务：签发、刷新、吊销与会话活跃度

use crate::{
    auth::{
        jwt::{JwtService, TokenPair},
        middleware::AuthContext,
    },
    error::AppError,
    models::{
        login_attempt::ClientOrigin,
        session::{NewSession, Session},
        user::User,
    },
    repository::{CredentialStore, SessionStore},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub struct TokenService {
    jwt: Arc<JwtService>,
    users: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    require_session_on_refresh: bool,
}

impl TokenService {
    pub fn new(
        jwt: Arc<JwtService>,
        users: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        require_session_on_refresh: bool,
    ) -> Self {
        Self {
            jwt,
            users,
            sessions,
            require_session_on_refresh,
        }
    }

    /// 为用户签发令牌对（刷新令牌 + 派生的访问令牌）
    pub fn issue(&self, user: &User) -> Result<TokenPair, AppError> {
        self.jwt.generate_token_pair(user)
    }

    /// 以刷新令牌原文作为会话令牌创建会话；令牌冲突时拒绝
    pub async fn open_session(
        &self,
        user_id: Uuid,
        tokens: &TokenPair,
        origin: &ClientOrigin,
        now: DateTime<Utc>,
    ) -> Result<Session, AppError> {
        self.sessions
            .create(NewSession {
                user_id,
                session_token: tokens.refresh_token.clone(),
                ip_address: origin.ip_address.clone(),
                user_agent: origin.user_agent.clone(),
                created_at: now,
            })
            .await
    }

    /// 用刷新令牌换取新的访问令牌
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, AppError> {
        self.refresh_at(refresh_token, Utc::now()).await
    }

    pub async fn refresh_at(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let claims = self.jwt.validate_refresh_token(refresh_token)?;

        if self.sessions.is_revoked(refresh_token).await? {
            tracing::debug!(jti = %claims.jti, "Refresh with revoked token");
            return Err(AppError::InvalidToken);
        }

        let user_id = claims.user_id()?;

        // 用户已删除或停用时不再续签
        if self.active_user(user_id).await?.is_none() {
            tracing::debug!(%user_id, "Refresh for a missing or inactive user");
            return Err(AppError::InvalidToken);
        }

        // 会话缺失时仍允许刷新，仅不记录活跃时间
        if !self.sessions.touch(user_id, refresh_token, now).await? {
            if self.require_session_on_refresh {
                tracing::debug!(%user_id, "Refresh without a live session rejected");
                return Err(AppError::InvalidToken);
            }
            tracing::debug!(%user_id, "Refresh without a matching session; liveness not recorded");
        }

        self.jwt.generate_access_token(&claims)
    }

    /// 删除调用者自己的会话并吊销其刷新令牌
    pub async fn revoke(&self, user_id: Uuid, refresh_token: &str) -> Result<(), AppError> {
        self.revoke_at(user_id, refresh_token, Utc::now()).await
    }

    pub async fn revoke_at(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if !self.sessions.revoke(user_id, refresh_token, now).await? {
            return Err(AppError::NotFound("Session".to_string()));
        }

        tracing::info!(%user_id, "Session revoked");
        Ok(())
    }

    /// 列出会话：特权用户可查看任意用户，普通用户只能查看自己
    pub async fn list_sessions(
        &self,
        caller: &AuthContext,
        user_id: Option<Uuid>,
    ) -> Result<Vec<Session>, AppError> {
        let scope = match (caller.is_staff, user_id) {
            (true, requested) => requested,
            (false, Some(requested)) if requested != caller.user_id => {
                return Err(AppError::PermissionDenied)
            }
            (false, _) => Some(caller.user_id),
        };

        self.sessions.list(scope).await
    }

    /// 校验访问令牌，并以当前用户记录构建认证上下文
    ///
    /// Role and staff flag come from the stored row, not from the token, so a
    /// demotion or deactivation takes effect on the next request.
    pub async fn validate_access(&self, token: &str) -> Result<AuthContext, AppError> {
        let claims = self.jwt.validate_access_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)?;

        let Some(user) = self.active_user(user_id).await? else {
            tracing::debug!(%user_id, "Access token for a missing or inactive user");
            return Err(AppError::Unauthorized);
        };

        Ok(AuthContext {
            user_id: user.id,
            email: user.email,
            role: user.role,
            is_staff: user.is_staff,
        })
    }

    async fn active_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .find_by_id(user_id)
            .await?
            .filter(|user| user.is_active))
    }
}
