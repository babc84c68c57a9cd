//! HTTP 中间件
//! 应用状态、请求追踪与客户端来源解析

use crate::{
    auth::{captcha::ChallengeVerifier, jwt::JwtService, password::PasswordHasher},
    config::AppConfig,
    error::AppError,
    models::login_attempt::ClientOrigin,
    repository::Stores,
    services::{AuditService, LoginPolicy, LoginService, TokenService, UserService},
};
use axum::{
    extract::{ConnectInfo, FromRequestParts, Request},
    http::{request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// 应用状态
///
/// 服务使用 Arc 包装，多个请求共享同一实例。
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    /// 仅用于健康检查；内存存储模式下为 None
    pub db: Option<sqlx::PgPool>,
    pub login_service: Arc<LoginService>,
    pub token_service: Arc<TokenService>,
    pub user_service: Arc<UserService>,
    pub audit_service: Arc<AuditService>,
}

impl AppState {
    /// 根据配置与存储组装全部服务
    pub fn new(
        config: AppConfig,
        db: Option<sqlx::PgPool>,
        stores: Stores,
        challenge: Arc<dyn ChallengeVerifier>,
        hasher: PasswordHasher,
    ) -> Result<Self, AppError> {
        let jwt_service = Arc::new(JwtService::from_config(&config)?);

        let token_service = Arc::new(TokenService::new(
            jwt_service,
            stores.users.clone(),
            stores.sessions,
            config.security.require_session_on_refresh,
        ));

        let audit_service = Arc::new(AuditService::new(stores.audit));

        let login_service = Arc::new(LoginService::new(
            stores.users.clone(),
            stores.attempts,
            token_service.clone(),
            challenge,
            hasher.clone(),
            LoginPolicy::from_config(&config),
        ));

        let user_service = Arc::new(UserService::new(
            stores.users,
            audit_service.clone(),
            hasher,
            config.security.clone(),
        ));

        Ok(Self {
            config,
            db,
            login_service,
            token_service,
            user_service,
            audit_service,
        })
    }
}

/// 请求追踪中间件
/// 为每个请求生成 trace_id 和 request_id，并记录指标
pub async fn request_tracking_middleware(req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(req.headers());
    let request_id = Uuid::new_v4().to_string();

    let method = req.method().to_string();
    let uri = req.uri().path().to_string();

    let span = tracing::info_span!(
        "http_request",
        trace_id = %trace_id,
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    async move {
        let start = Instant::now();

        let mut response = next.run(req).await;

        let elapsed = start.elapsed();
        let status = response.status().as_u16();

        // metrics 标签使用静态字符串
        let method_name = match method.as_str() {
            "GET" => "GET",
            "POST" => "POST",
            "PUT" => "PUT",
            "DELETE" => "DELETE",
            "PATCH" => "PATCH",
            _ => "UNKNOWN",
        };
        let status_code = match status {
            200 => "200",
            201 => "201",
            400 => "400",
            401 => "401",
            403 => "403",
            404 => "404",
            409 => "409",
            500 => "500",
            _ => "other",
        };

        metrics::counter!("http_requests_total", "method" => method_name, "status" => status_code)
            .increment(1);
        metrics::histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());

        tracing::info!(
            method = %method,
            uri = %uri,
            status = status,
            elapsed_ms = elapsed.as_millis(),
            "Request completed"
        );

        // 在响应头中添加 trace_id
        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            response.headers_mut().insert("x-trace-id", value);
        }
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert("x-request-id", value);
        }

        response
    }
    .instrument(span)
    .await
}

/// 从请求头中提取或生成 trace_id
fn extract_or_generate_trace_id(headers: &HeaderMap) -> String {
    headers
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

// 在 handler 中直接提取客户端来源；对端地址来自 ConnectInfo
impl FromRequestParts<Arc<AppState>> for ClientOrigin {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        Ok(client_origin(
            &parts.headers,
            state.config.security.trust_proxy,
            peer,
        ))
    }
}

/// 解析客户端来源（IP 与 User-Agent）
pub fn client_origin(
    headers: &HeaderMap,
    trust_proxy: bool,
    peer: Option<IpAddr>,
) -> ClientOrigin {
    ClientOrigin {
        ip_address: client_ip(headers, trust_proxy, peer).map(|ip| ip.to_string()),
        user_agent: headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
    }
}

/// 获取客户端 IP 地址
/// 仅在信任代理时读取代理头，否则使用连接的对端地址
fn client_ip(
    headers: &HeaderMap,
    trust_proxy: bool,
    peer: Option<IpAddr>,
) -> Option<IpAddr> {
    if trust_proxy {
        // X-Forwarded-For 可能包含多个 IP，取第一个
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|ip| ip.trim().parse::<IpAddr>().ok());
        if let Some(addr) = forwarded {
            return Some(addr);
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|ip| ip.trim().parse::<IpAddr>().ok());
        if let Some(addr) = real_ip {
            return Some(addr);
        }
    }

    peer
}
