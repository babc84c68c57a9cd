//! User repository (数据库访问层)

use super::CredentialStore;
use crate::{error::AppError, models::user::*};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct UserRepository {
    db: PgPool,
}

impl UserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// 唯一约束冲突转换为业务冲突
fn map_unique_violation(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("Email is already in use.".to_string())
        }
        _ => AppError::Database(e),
    }
}

#[async_trait]
impl CredentialStore for UserRepository {
    /// 根据邮箱查找用户
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.db)
            .await?;

        Ok(user)
    }

    /// 根据 ID 查找用户
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(user)
    }

    async fn email_taken(&self, email: &str, exclude: Option<Uuid>) -> Result<bool, AppError> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE email = $1 AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(email)
        .bind(exclude)
        .fetch_one(&self.db)
        .await?;

        Ok(taken)
    }

    /// 创建用户
    async fn create(&self, user: NewUser, now: DateTime<Utc>) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                id, email, password_hash, name, phone, role, status, department_id,
                is_active, is_verified, is_staff, created_by, updated_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12, $13, $13)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(&user.phone)
        .bind(&user.role)
        .bind(&user.status)
        .bind(user.department_id)
        .bind(user.is_active)
        .bind(user.is_verified)
        .bind(user.is_staff)
        .bind(user.created_by)
        .bind(now)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique_violation)?;

        Ok(user)
    }

    /// 更新用户
    async fn update(
        &self,
        id: Uuid,
        changes: UserChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET
                email = COALESCE($2, email),
                password_hash = COALESCE($3, password_hash),
                name = COALESCE($4, name),
                phone = COALESCE($5, phone),
                role = COALESCE($6, role),
                status = COALESCE($7, status),
                department_id = COALESCE($8, department_id),
                is_active = COALESCE($9, is_active),
                updated_by = COALESCE($10, updated_by),
                updated_at = $11
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&changes.email)
        .bind(&changes.password_hash)
        .bind(&changes.name)
        .bind(&changes.phone)
        .bind(&changes.role)
        .bind(&changes.status)
        .bind(changes.department_id)
        .bind(changes.is_active)
        .bind(changes.updated_by)
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .map_err(map_unique_violation)?;

        Ok(user)
    }

    /// 按条件列出用户
    async fn list(&self, filter: &UserFilter) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE ($1::text IS NULL OR LOWER(role) = LOWER($1))
                AND ($2::text IS NULL OR LOWER(status) = LOWER($2))
                AND ($3::date IS NULL OR created_at::date >= $3)
                AND ($4::date IS NULL OR created_at::date <= $4)
            ORDER BY created_at DESC
            "#,
        )
        .bind(&filter.role)
        .bind(&filter.status)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .fetch_all(&self.db)
        .await?;

        Ok(users)
    }

    /// 模糊搜索用户
    async fn search(&self, query: &str) -> Result<Vec<User>, AppError> {
        let pattern = format!("%{}%", query.replace('%', "\\%").replace('_', "\\_"));
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE name ILIKE $1 OR email ILIKE $1 OR role ILIKE $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.db)
        .await?;

        Ok(users)
    }

    /// 锁定到期后重置计数（以观察到的锁定时间做比较交换）
    async fn clear_expired_lock(
        &self,
        id: Uuid,
        locked_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET
                login_attempts = 0,
                account_locked_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND account_locked_at = $2
            "#,
        )
        .bind(id)
        .bind(locked_at)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 原子地增加失败次数，达到阈值时锁定
    async fn record_failed_login(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        threshold: i32,
    ) -> Result<LockoutState, AppError> {
        let state = sqlx::query_as::<_, LockoutState>(
            r#"
            UPDATE users
            SET
                login_attempts = login_attempts + 1,
                last_failed_login_at = $2,
                account_locked_at = CASE
                    WHEN account_locked_at IS NULL AND login_attempts + 1 >= $3 THEN $2
                    ELSE account_locked_at
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING login_attempts, account_locked_at
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(threshold)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        Ok(state)
    }

    /// 登录成功：重置失败次数并记录登录时间
    async fn record_successful_login(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        lock_cutoff: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET
                login_attempts = 0,
                account_locked_at = NULL,
                last_login_at = $2,
                updated_at = NOW()
            WHERE id = $1
              AND (account_locked_at IS NULL OR account_locked_at <= $3)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(lock_cutoff)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }
}
