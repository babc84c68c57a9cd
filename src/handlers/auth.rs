//! 认证相关的 HTTP 处理器

use crate::{
    auth::middleware::AuthContext,
    error::AppError,
    middleware::AppState,
    models::{
        auth::*,
        login_attempt::{ClientOrigin, LoginAttemptQuery, LoginAttemptRecord},
        response::ApiResponse,
        session::{SessionQuery, SessionResponse},
        user::UserResponse,
    },
    services::AuditAction,
};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

const DEFAULT_ATTEMPT_LIMIT: i64 = 100;

/// 登录
pub async fn login(
    State(state): State<Arc<AppState>>,
    origin: ClientOrigin,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;

    let response = state.login_service.login(req, origin).await?;

    Ok(Json(response))
}

/// 刷新访问令牌
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload.map_err(|_| AppError::Validation("Invalid refresh request.".to_string()))?;

    let access_token = state.token_service.refresh(&req.refresh).await?;

    Ok(ApiResponse::success(
        AccessTokenResponse { access_token },
        "Token refreshed successfully.",
    ))
}

/// 登出（删除调用者的会话）
pub async fn logout(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    payload: Result<Json<LogoutRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;
    let session_token = req
        .session_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Session token is required.".to_string()))?;

    state
        .token_service
        .revoke(auth_context.user_id, &session_token)
        .await?;

    // 审计日志
    state
        .audit_service
        .log_change::<serde_json::Value>(
            Some(auth_context.user_id),
            AuditAction::UserLogout,
            Some(auth_context.user_id),
            None,
            None,
        )
        .await?;

    Ok(ApiResponse::empty("Logged out successfully."))
}

/// 会话列表
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    query: Result<Query<SessionQuery>, axum::extract::rejection::QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query?;

    let sessions: Vec<SessionResponse> = state
        .token_service
        .list_sessions(&auth_context, query.user_id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(ApiResponse::success(
        sessions,
        "User session list fetched successfully.",
    ))
}

/// 当前用户信息
pub async fn get_current_user(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let user = state.user_service.get(auth_context.user_id).await?;

    Ok(ApiResponse::success(
        UserResponse::from(user),
        "User fetched successfully",
    ))
}

/// 登录记录（仅特权用户）
pub async fn list_login_attempts(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    query: Result<Query<LoginAttemptQuery>, axum::extract::rejection::QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query?;

    let records: Vec<LoginAttemptRecord> = state
        .login_service
        .attempt_history(
            &auth_context,
            query.user_id,
            query.limit.unwrap_or(DEFAULT_ATTEMPT_LIMIT),
        )
        .await?;

    Ok(ApiResponse::success(
        records,
        "Login attempts fetched successfully.",
    ))
}
