//! 审计日志服务

use crate::{error::AppError, models::audit::AuditEntry, repository::AuditSink};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// 审计操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    UserCreate,
    UserUpdate,
    UserStatusChange,
    UserLogout,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UserCreate => "user.create",
            AuditAction::UserUpdate => "user.update",
            AuditAction::UserStatusChange => "user.status_change",
            AuditAction::UserLogout => "user.logout",
        }
    }

    pub fn resource_type(&self) -> &'static str {
        match self {
            AuditAction::UserLogout => "session",
            _ => "user",
        }
    }
}

pub struct AuditService {
    sink: Arc<dyn AuditSink>,
}

impl AuditService {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// 记录审计日志条目（变更前后快照）
    pub async fn log_change<T: Serialize>(
        &self,
        actor_id: Option<Uuid>,
        action: AuditAction,
        resource_id: Option<Uuid>,
        old_value: Option<&T>,
        new_value: Option<&T>,
    ) -> Result<(), AppError> {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            actor_id,
            action: action.as_str().to_string(),
            resource_type: action.resource_type().to_string(),
            resource_id,
            old_value: old_value.map(snapshot).transpose()?,
            new_value: new_value.map(snapshot).transpose()?,
            occurred_at: Utc::now(),
        };

        self.sink.record(&entry).await?;

        tracing::debug!(action = %entry.action, resource_id = ?resource_id, "Audit entry recorded");
        Ok(())
    }
}

fn snapshot<T: Serialize>(value: &T) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::Internal(format!("Failed to serialize audit snapshot: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::MemoryAuditSink;
    use serde_json::json;

    #[test]
    fn test_action_names() {
        assert_eq!(AuditAction::UserCreate.as_str(), "user.create");
        assert_eq!(AuditAction::UserStatusChange.as_str(), "user.status_change");
        assert_eq!(AuditAction::UserLogout.resource_type(), "session");
        assert_eq!(AuditAction::UserUpdate.resource_type(), "user");
    }

    #[tokio::test]
    async fn test_log_change_records_snapshots() {
        let sink = Arc::new(MemoryAuditSink::new());
        let service = AuditService::new(sink.clone());
        let actor = Uuid::new_v4();
        let target = Uuid::new_v4();

        service
            .log_change(
                Some(actor),
                AuditAction::UserUpdate,
                Some(target),
                Some(&json!({"name": "old"})),
                Some(&json!({"name": "new"})),
            )
            .await
            .unwrap();

        let entries = sink.all().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "user.update");
        assert_eq!(entries[0].actor_id, Some(actor));
        assert_eq!(entries[0].old_value, Some(json!({"name": "old"})));
        assert_eq!(entries[0].new_value, Some(json!({"name": "new"})));
    }
}
