//! Login attempt log repository (登录记录数据访问)

use super::LoginAttemptLog;
use crate::{error::AppError, models::login_attempt::LoginAttemptRecord};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

pub struct LoginAttemptRepository {
    db: PgPool,
}

impl LoginAttemptRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LoginAttemptLog for LoginAttemptRepository {
    /// 追加登录记录
    async fn append(&self, record: &LoginAttemptRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO login_attempts (
                id, user_id, email, occurred_at, success, ip_address, user_agent, reason
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.email)
        .bind(record.occurred_at)
        .bind(record.success)
        .bind(&record.ip_address)
        .bind(&record.user_agent)
        .bind(&record.reason)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// 查询登录记录
    async fn list(
        &self,
        user_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<LoginAttemptRecord>, AppError> {
        let records = sqlx::query_as::<_, LoginAttemptRecord>(
            r#"
            SELECT * FROM login_attempts
            WHERE $1::uuid IS NULL OR user_id = $1
            ORDER BY occurred_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(records)
    }
}
