//! 用户目录服务：创建、查询、更新与启用/停用

use crate::{
    auth::{middleware::AuthContext, password::PasswordHasher},
    config::SecurityConfig,
    error::AppError,
    models::user::*,
    repository::CredentialStore,
    services::audit_service::{AuditAction, AuditService},
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

pub struct UserService {
    users: Arc<dyn CredentialStore>,
    audit: Arc<AuditService>,
    hasher: PasswordHasher,
    security: SecurityConfig,
}

impl UserService {
    pub fn new(
        users: Arc<dyn CredentialStore>,
        audit: Arc<AuditService>,
        hasher: PasswordHasher,
        security: SecurityConfig,
    ) -> Self {
        Self {
            users,
            audit,
            hasher,
            security,
        }
    }

    /// 创建用户
    pub async fn create(
        &self,
        actor: &AuthContext,
        req: CreateUserRequest,
    ) -> Result<User, AppError> {
        req.validate()?;
        PasswordHasher::validate_password_policy(&req.password, &self.security)?;

        let email = User::normalize_email(&req.email);
        if self.users.email_taken(&email, None).await? {
            return Err(AppError::Conflict("Email is already in use.".to_string()));
        }

        let new_user = NewUser {
            email,
            password_hash: self.hasher.hash(&req.password)?,
            name: req.name,
            phone: req.phone,
            role: req.role,
            status: req.status.unwrap_or_else(|| STATUS_ACTIVE.to_string()),
            department_id: req.department_id,
            is_active: req.is_active.unwrap_or(true),
            is_verified: req.is_verified.unwrap_or(false),
            is_staff: false,
            created_by: Some(actor.user_id),
        };

        let user = self.users.create(new_user, Utc::now()).await?;

        let snapshot = UserResponse::from(user.clone());
        self.audit
            .log_change(
                Some(actor.user_id),
                AuditAction::UserCreate,
                Some(user.id),
                None,
                Some(&snapshot),
            )
            .await?;

        tracing::info!(user_id = %user.id, created_by = %actor.user_id, "User created");
        Ok(user)
    }

    /// 获取用户详情
    pub async fn get(&self, id: Uuid) -> Result<User, AppError> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))
    }

    /// 列出状态为 Active 的用户
    pub async fn list_active(&self) -> Result<Vec<User>, AppError> {
        self.users
            .list(&UserFilter {
                status: Some(STATUS_ACTIVE.to_string()),
                ..Default::default()
            })
            .await
    }

    /// 按名称、邮箱或角色搜索
    pub async fn search(&self, query: &str) -> Result<Vec<User>, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation("Search query cannot be empty.".to_string()));
        }

        self.users.search(query).await
    }

    /// 按角色、状态和创建日期筛选
    pub async fn filter(&self, filter: &UserFilter) -> Result<Vec<User>, AppError> {
        if let (Some(start), Some(end)) = (filter.start_date, filter.end_date) {
            if start > end {
                return Err(AppError::Validation(
                    "start_date must not be after end_date.".to_string(),
                ));
            }
        }

        self.users.list(filter).await
    }

    /// 部分更新用户
    pub async fn update(
        &self,
        actor: &AuthContext,
        id: Uuid,
        req: UpdateUserRequest,
    ) -> Result<User, AppError> {
        req.validate()?;

        let before = self.get(id).await?;

        let email = req.email.as_deref().map(User::normalize_email);
        if let Some(email) = &email {
            if self.users.email_taken(email, Some(id)).await? {
                return Err(AppError::Conflict("Email is already in use.".to_string()));
            }
        }

        let password_hash = match req.password.as_deref() {
            Some(password) => {
                PasswordHasher::validate_password_policy(password, &self.security)?;
                Some(self.hasher.hash(password)?)
            }
            None => None,
        };

        let changes = UserChanges {
            email,
            password_hash,
            name: req.name,
            phone: req.phone,
            role: req.role,
            status: req.status,
            department_id: req.department_id,
            is_active: req.is_active,
            updated_by: Some(actor.user_id),
        };

        let after = self
            .users
            .update(id, changes, Utc::now())
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        self.audit
            .log_change(
                Some(actor.user_id),
                AuditAction::UserUpdate,
                Some(id),
                Some(&UserResponse::from(before)),
                Some(&UserResponse::from(after.clone())),
            )
            .await?;

        tracing::info!(user_id = %id, updated_by = %actor.user_id, "User updated");
        Ok(after)
    }

    /// 启用/停用账户（仅 Admin 角色）
    pub async fn set_active(
        &self,
        actor: &AuthContext,
        id: Uuid,
        is_active: Option<bool>,
    ) -> Result<User, AppError> {
        if actor.role.as_deref() != Some(ROLE_ADMIN) {
            tracing::warn!(actor = %actor.user_id, target = %id, "Non-admin tried to change account status");
            return Err(AppError::PermissionDenied);
        }

        let is_active = is_active
            .ok_or_else(|| AppError::Validation("Missing 'is_active' in request body".to_string()))?;

        let before = self.get(id).await?;

        let after = self
            .users
            .update(
                id,
                UserChanges {
                    is_active: Some(is_active),
                    updated_by: Some(actor.user_id),
                    ..Default::default()
                },
                Utc::now(),
            )
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        self.audit
            .log_change(
                Some(actor.user_id),
                AuditAction::UserStatusChange,
                Some(id),
                Some(&UserResponse::from(before)),
                Some(&UserResponse::from(after.clone())),
            )
            .await?;

        tracing::info!(user_id = %id, is_active, "User status changed");
        Ok(after)
    }
}
