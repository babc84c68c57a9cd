//! 路由注册
//! 创建所有 API 路由并应用中间件

use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::{handlers, middleware::AppState};

/// 请求体大小上限
const MAX_BODY_BYTES: usize = 64 * 1024;

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    // 公开端点（健康检查）
    let public_routes = Router::new().route("/health", get(handlers::health::health_check));

    // 认证路由（无需认证）
    let auth_routes = Router::new()
        .route("/api/v1/auth/login", post(handlers::auth::login))
        .route(
            "/api/v1/auth/token/refresh",
            post(handlers::auth::refresh_token),
        );

    // 需要认证的路由
    let authenticated_routes = Router::new()
        .route("/api/v1/auth/me", get(handlers::auth::get_current_user))
        .route("/api/v1/auth/logout", post(handlers::auth::logout))
        .route("/api/v1/auth/sessions", get(handlers::auth::list_sessions))
        .route(
            "/api/v1/auth/login-attempts",
            get(handlers::auth::list_login_attempts),
        )
        // 用户管理
        .route(
            "/api/v1/users",
            get(handlers::user::list_users).post(handlers::user::create_user),
        )
        .route("/api/v1/users/search", get(handlers::user::search_users))
        .route("/api/v1/users/filter", get(handlers::user::filter_users))
        .route(
            "/api/v1/users/{id}",
            get(handlers::user::get_user).put(handlers::user::update_user),
        )
        .route(
            "/api/v1/users/{id}/status",
            patch(handlers::user::toggle_user_status),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.token_service.clone(),
            crate::auth::middleware::jwt_auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(auth_routes)
        .merge(authenticated_routes)
        // 逐层应用（后加的在外层），顺序与原 ServiceBuilder 一致：
        // 请求追踪 -> Trace -> CORS -> 请求体限制 -> 路由
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(
            crate::middleware::request_tracking_middleware,
        ))
        .with_state(state)
}
