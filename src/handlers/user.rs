//! 用户管理的 HTTP 处理器

use crate::{
    auth::middleware::AuthContext,
    error::AppError,
    middleware::AppState,
    models::{response::ApiResponse, user::*},
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

fn to_responses(users: Vec<User>) -> Vec<UserResponse> {
    users.into_iter().map(UserResponse::from).collect()
}

/// 创建用户
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;
    let user = state.user_service.create(&auth_context, req).await?;

    Ok(ApiResponse::created(
        UserResponse::from(user),
        "User created successfully",
    ))
}

/// 列出活跃用户
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let users = state.user_service.list_active().await?;

    Ok(ApiResponse::success(
        to_responses(users),
        "All users fetched successfully",
    ))
}

/// 搜索用户
pub async fn search_users(
    State(state): State<Arc<AppState>>,
    _auth_context: AuthContext,
    query: Result<Query<UserSearchQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query?;
    let users = state.user_service.search(&query.query).await?;

    Ok(ApiResponse::success(
        to_responses(users),
        "Users matching search query fetched successfully",
    ))
}

/// 按条件筛选用户
pub async fn filter_users(
    State(state): State<Arc<AppState>>,
    _auth_context: AuthContext,
    query: Result<Query<UserFilter>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(filter) = query?;
    let users = state.user_service.filter(&filter).await?;

    Ok(ApiResponse::success(
        to_responses(users),
        "Filtered users fetched successfully",
    ))
}

/// 获取用户详情
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    _auth_context: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.user_service.get(id).await?;

    Ok(ApiResponse::success(
        UserResponse::from(user),
        "User fetched successfully",
    ))
}

/// 更新用户
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;
    let user = state.user_service.update(&auth_context, id, req).await?;

    Ok(ApiResponse::success(
        UserResponse::from(user),
        "User updated successfully",
    ))
}

/// 启用/停用用户
pub async fn toggle_user_status(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
    payload: Result<Json<ToggleStatusRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;
    let user = state
        .user_service
        .set_active(&auth_context, id, req.is_active)
        .await?;

    let verb = if user.is_active { "activated" } else { "deactivated" };
    Ok(ApiResponse::success(
        UserResponse::from(user),
        format!("User successfully {}", verb),
    ))
}
