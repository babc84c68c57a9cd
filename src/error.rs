//! 统一错误模型
//! 定义所有错误类型和失败响应格式

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid credentials")]
    Authentication,

    #[error("Account is locked")]
    AccountLocked,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Session token collision")]
    SessionConflict,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// 获取 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Authentication | AppError::InvalidToken => {
                StatusCode::BAD_REQUEST
            }
            AppError::AccountLocked | AppError::AccountInactive | AppError::PermissionDenied => {
                StatusCode::FORBIDDEN
            }
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_)
            | AppError::Config(_)
            | AppError::SessionConflict
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 获取用户友好的错误消息（不包含敏感信息）
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::Authentication => "Invalid credentials.".to_string(),
            AppError::AccountLocked => {
                "Account is locked. Try again after 10 minutes.".to_string()
            }
            AppError::AccountInactive => "Account is inactive.".to_string(),
            AppError::InvalidToken => {
                "Failed to refresh token. Invalid refresh token or user not found.".to_string()
            }
            AppError::Unauthorized => "Authentication credentials were not provided.".to_string(),
            AppError::PermissionDenied => {
                "You do not have permission to perform this action.".to_string()
            }
            AppError::NotFound(what) => format!("{} not found", what),
            AppError::Conflict(msg) => msg.clone(),
            AppError::Database(_) => "Database error occurred".to_string(),
            AppError::Config(_) => "Configuration error".to_string(),
            AppError::SessionConflict | AppError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }

    /// 获取错误码
    pub fn code(&self) -> u16 {
        self.status_code().as_u16()
    }
}

/// 失败响应体，与成功响应共用 `{status, data, message}` 外壳
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub data: serde_json::Value,
    pub message: String,
    /// 与 message 相同，供读取 `detail` 的登录客户端使用
    pub detail: String,
}

impl ErrorResponse {
    pub fn new(message: String) -> Self {
        Self {
            status: "failure",
            data: serde_json::json!({}),
            detail: message.clone(),
            message,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Application error");
        } else {
            tracing::debug!(code = self.code(), error = %self, "Request rejected");
        }

        (status, Json(ErrorResponse::new(self.user_message()))).into_response()
    }
}

/// 从 config::ConfigError 转换
impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

/// 请求体校验失败
impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

/// 请求体无法解析
impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(e: axum::extract::rejection::JsonRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}

/// 查询参数无法解析
impl From<axum::extract::rejection::QueryRejection> for AppError {
    fn from(e: axum::extract::rejection::QueryRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}
