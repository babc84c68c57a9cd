//! Audit repository (审计数据访问)

use super::AuditSink;
use crate::{error::AppError, models::audit::AuditEntry};
use async_trait::async_trait;
use sqlx::PgPool;

pub struct AuditRepository {
    db: PgPool,
}

impl AuditRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditSink for AuditRepository {
    /// 插入审计日志
    async fn record(&self, entry: &AuditEntry) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, actor_id, action, resource_type, resource_id, old_value, new_value, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.actor_id)
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(entry.resource_id)
        .bind(&entry.old_value)
        .bind(&entry.new_value)
        .bind(entry.occurred_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
