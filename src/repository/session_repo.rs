//! Session repository (会话数据访问)

use super::SessionStore;
use crate::{
    error::AppError,
    models::session::{NewSession, Session},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

/// 哈希令牌用于吊销名单，避免存储可用凭证
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct SessionRepository {
    db: PgPool,
}

impl SessionRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    /// 创建会话
    async fn create(&self, session: NewSession) -> Result<Session, AppError> {
        let created = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO user_sessions (
                id, user_id, session_token, ip_address, user_agent, created_at, last_seen_at, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $6, TRUE)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session.user_id)
        .bind(&session.session_token)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.created_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                tracing::error!(user_id = %session.user_id, "Session token collision");
                AppError::SessionConflict
            }
            _ => AppError::Database(e),
        })?;

        Ok(created)
    }

    /// 更新会话活跃时间
    async fn touch(&self, user_id: Uuid, token: &str, at: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE user_sessions
            SET last_seen_at = $3
            WHERE user_id = $1 AND session_token = $2 AND is_active
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(at)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 删除会话并吊销令牌
    async fn revoke(
        &self,
        user_id: Uuid,
        token: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut tx = self.db.begin().await?;

        let deleted = sqlx::query(
            "DELETE FROM user_sessions WHERE user_id = $1 AND session_token = $2 AND is_active",
        )
        .bind(user_id)
        .bind(token)
        .execute(&mut *tx)
        .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO revoked_tokens (token_hash, user_id, revoked_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (token_hash) DO NOTHING
            "#,
        )
        .bind(hash_token(token))
        .bind(user_id)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(true)
    }

    async fn is_revoked(&self, token: &str) -> Result<bool, AppError> {
        let revoked: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM revoked_tokens WHERE token_hash = $1)",
        )
        .bind(hash_token(token))
        .fetch_one(&self.db)
        .await?;

        Ok(revoked)
    }

    /// 列出会话
    async fn list(&self, user_id: Option<Uuid>) -> Result<Vec<Session>, AppError> {
        let sessions = sqlx::query_as::<_, Session>(
            r#"
            SELECT * FROM user_sessions
            WHERE $1::uuid IS NULL OR user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(sessions)
    }
}
