//! 测试公共模块
//! 提供内存存储上的测试应用、测试用户与可控的外部依赖
#![allow(dead_code)]

use argon2::Params;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request},
    Router,
};
use chrono::{DateTime, Utc};
use crm_service::{
    auth::{
        captcha::{ChallengeError, ChallengeVerifier},
        password::PasswordHasher,
    },
    config::{
        AppConfig, CaptchaConfig, DatabaseConfig, LoggingConfig, SecurityConfig, ServerConfig,
    },
    error::AppError,
    middleware::AppState,
    models::{
        auth::LoginRequest,
        login_attempt::{ClientOrigin, LoginAttemptRecord},
        user::{User, STATUS_ACTIVE},
    },
    repository::{
        memory::{MemoryAuditSink, MemoryCredentialStore, MemoryLoginAttemptLog, MemorySessionStore},
        LoginAttemptLog, Stores,
    },
};
use http_body_util::BodyExt;
use secrecy::Secret;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "Correct1Horse";
pub const TEST_TOKEN: &str = "test-token";

/// 创建测试配置（调试模式，允许固定人机验证令牌）
pub fn create_test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            addr: "127.0.0.1:0".to_string(),
            graceful_shutdown_timeout_secs: 5,
        },
        database: DatabaseConfig {
            url: Secret::new(String::new()),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_secs: 5,
            idle_timeout_secs: 300,
            max_lifetime_secs: 1800,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        security: SecurityConfig {
            jwt_secret: Secret::new("test-secret-key-for-testing-only-min-32-chars".to_string()),
            access_token_exp_secs: 300,
            refresh_token_exp_secs: 3600,
            password_min_length: 8,
            password_require_uppercase: true,
            password_require_digit: true,
            password_require_special: false,
            max_login_attempts: 5,
            login_lockout_duration_secs: 600,
            trust_proxy: true,
            require_session_on_refresh: false,
            debug_mode: true,
        },
        captcha: CaptchaConfig {
            verify_url: "http://127.0.0.1:9/siteverify".to_string(),
            secret_key: Secret::new("captcha-secret".to_string()),
            test_token: TEST_TOKEN.to_string(),
            timeout_secs: 1,
        },
    }
}

/// 低成本的 Argon2 参数，仅用于测试
pub fn fast_hasher() -> PasswordHasher {
    PasswordHasher::with_params(Params::new(1024, 1, 1, None).unwrap())
}

/// 返回固定结果的人机验证
pub struct StaticVerifier(pub bool);

#[async_trait]
impl ChallengeVerifier for StaticVerifier {
    async fn verify(&self, _token: &str) -> Result<bool, ChallengeError> {
        Ok(self.0)
    }
}

/// 始终不可用的人机验证
pub struct UnavailableVerifier;

#[async_trait]
impl ChallengeVerifier for UnavailableVerifier {
    async fn verify(&self, _token: &str) -> Result<bool, ChallengeError> {
        Err(ChallengeError::HttpStatus(503))
    }
}

/// 写入总是失败的登录记录
pub struct FailingAttemptLog;

#[async_trait]
impl LoginAttemptLog for FailingAttemptLog {
    async fn append(&self, _record: &LoginAttemptRecord) -> Result<(), AppError> {
        Err(AppError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn list(
        &self,
        _user_id: Option<Uuid>,
        _limit: i64,
    ) -> Result<Vec<LoginAttemptRecord>, AppError> {
        Ok(Vec::new())
    }
}

/// 基于内存存储的测试应用
pub struct TestApp {
    pub state: Arc<AppState>,
    pub users: Arc<MemoryCredentialStore>,
    pub sessions: Arc<MemorySessionStore>,
    pub attempts: Arc<MemoryLoginAttemptLog>,
    pub audit: Arc<MemoryAuditSink>,
    hasher: PasswordHasher,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(create_test_config(), Arc::new(StaticVerifier(false)), None)
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self::build(config, Arc::new(StaticVerifier(false)), None)
    }

    pub fn with_verifier(config: AppConfig, challenge: Arc<dyn ChallengeVerifier>) -> Self {
        Self::build(config, challenge, None)
    }

    pub fn with_attempt_log(attempts: Arc<dyn LoginAttemptLog>) -> Self {
        Self::build(
            create_test_config(),
            Arc::new(StaticVerifier(false)),
            Some(attempts),
        )
    }

    fn build(
        config: AppConfig,
        challenge: Arc<dyn ChallengeVerifier>,
        attempt_override: Option<Arc<dyn LoginAttemptLog>>,
    ) -> Self {
        let users = Arc::new(MemoryCredentialStore::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let attempts = Arc::new(MemoryLoginAttemptLog::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let hasher = fast_hasher();

        let stores = Stores {
            users: users.clone(),
            sessions: sessions.clone(),
            attempts: attempt_override
                .unwrap_or_else(|| attempts.clone() as Arc<dyn LoginAttemptLog>),
            audit: audit.clone(),
        };

        let state = AppState::new(config, None, stores, challenge, hasher.clone())
            .expect("Failed to build app state");

        Self {
            state: Arc::new(state),
            users,
            sessions,
            attempts,
            audit,
            hasher,
        }
    }

    pub fn router(&self) -> Router {
        crm_service::routes::create_router(self.state.clone())
    }

    /// 写入一个可登录的测试用户
    pub async fn seed_user(&self, email: &str) -> User {
        self.seed_user_with(email, |_| {}).await
    }

    /// 写入测试用户，并在写入前修改字段
    pub async fn seed_user_with(&self, email: &str, customize: impl FnOnce(&mut User)) -> User {
        let now = Utc::now();
        let mut user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: self.hasher.hash(PASSWORD).unwrap(),
            name: Some("Test User".to_string()),
            phone: None,
            role: Some("Sales".to_string()),
            status: STATUS_ACTIVE.to_string(),
            department_id: None,
            is_active: true,
            is_verified: true,
            is_staff: false,
            login_attempts: 0,
            last_login_at: None,
            last_failed_login_at: None,
            account_locked_at: None,
            created_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        };
        customize(&mut user);
        self.users.put(user.clone()).await;
        user
    }

    pub async fn stored_user(&self, id: Uuid) -> User {
        use crm_service::repository::CredentialStore;
        self.users.find_by_id(id).await.unwrap().expect("user exists")
    }

    pub async fn attempts_for(&self, email: &str) -> Vec<LoginAttemptRecord> {
        self.attempts
            .all()
            .await
            .into_iter()
            .filter(|r| r.email == email)
            .collect()
    }
}

pub fn login_request(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
        recaptcha_token: TEST_TOKEN.to_string(),
    }
}

pub fn origin() -> ClientOrigin {
    ClientOrigin {
        ip_address: Some("203.0.113.10".to_string()),
        user_agent: Some("integration-test".to_string()),
    }
}

pub fn minutes_after(at: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    at + chrono::Duration::minutes(minutes)
}

/// 发送 JSON 请求并解析响应体
pub async fn send_json(
    app: Router,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<serde_json::Value>,
) -> (axum::http::StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, json)
}
