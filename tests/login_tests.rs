//! 登录锁定状态机集成测试

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_service::{
    error::AppError,
    middleware::AppState,
    models::user::{LockoutState, NewUser, User, UserChanges, UserFilter},
    repository::{
        memory::{MemoryAuditSink, MemoryCredentialStore},
        CredentialStore, SessionStore, Stores,
    },
};
use std::sync::Arc;
use uuid::Uuid;

mod common;
use common::{
    create_test_config, fast_hasher, login_request, minutes_after, origin, FailingAttemptLog,
    StaticVerifier, TestApp, UnavailableVerifier, PASSWORD,
};

const EMAIL: &str = "alice@example.com";

#[tokio::test]
async fn test_sixth_attempt_is_locked_even_with_correct_password() {
    let app = TestApp::new();
    let user = app.seed_user(EMAIL).await;
    let login = &app.state.login_service;
    let t0 = Utc::now();

    for i in 0..5 {
        let at = t0 + chrono::Duration::seconds(i);
        let err = login
            .login_at(login_request(EMAIL, "wrong-password"), origin(), at)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authentication), "attempt {}: {:?}", i, err);
    }

    let stored = app.stored_user(user.id).await;
    assert_eq!(stored.login_attempts, 5);
    assert_eq!(stored.account_locked_at, Some(t0 + chrono::Duration::seconds(4)));

    let err = login
        .login_at(
            login_request(EMAIL, PASSWORD),
            origin(),
            t0 + chrono::Duration::seconds(5),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccountLocked));

    // 锁定期间不做凭证校验，计数不变
    let stored = app.stored_user(user.id).await;
    assert_eq!(stored.login_attempts, 5);
    assert!(app.sessions.list(Some(user.id)).await.unwrap().is_empty());

    let records = app.attempts_for(EMAIL).await;
    assert_eq!(records.len(), 6);
    assert_eq!(records[5].reason.as_deref(), Some("locked"));
    assert!(records[..5]
        .iter()
        .all(|r| r.reason.as_deref() == Some("invalid credentials")));
}

#[tokio::test]
async fn test_lockout_scenario_from_four_prior_failures() {
    let app = TestApp::new();
    let user = app
        .seed_user_with(EMAIL, |u| u.login_attempts = 4)
        .await;
    let login = &app.state.login_service;
    let t0 = Utc::now();

    // 第 5 次失败触发锁定
    let err = login
        .login_at(login_request(EMAIL, "wrong-password"), origin(), t0)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authentication));
    let stored = app.stored_user(user.id).await;
    assert_eq!(stored.login_attempts, 5);
    assert_eq!(stored.account_locked_at, Some(t0));
    assert_eq!(stored.last_failed_login_at, Some(t0));

    // 1 分钟后：仍处于锁定
    let err = login
        .login_at(login_request(EMAIL, PASSWORD), origin(), minutes_after(t0, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccountLocked));
    assert_eq!(app.stored_user(user.id).await.login_attempts, 5);

    // 11 分钟后：自动解锁并登录成功
    let later = minutes_after(t0, 11);
    let response = login
        .login_at(login_request(EMAIL, PASSWORD), origin(), later)
        .await
        .unwrap();
    assert!(!response.access_token.is_empty());
    assert!(!response.refresh_token.is_empty());
    assert_eq!(response.user.login_attempts, 0);

    let stored = app.stored_user(user.id).await;
    assert_eq!(stored.login_attempts, 0);
    assert_eq!(stored.account_locked_at, None);
    assert_eq!(stored.last_login_at, Some(later));

    let sessions = app.sessions.list(Some(user.id)).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_token, response.refresh_token);
    assert_eq!(sessions[0].ip_address.as_deref(), Some("203.0.113.10"));

    let records = app.attempts_for(EMAIL).await;
    let last = records.last().unwrap();
    assert!(last.success);
    assert_eq!(last.user_id, Some(user.id));
    assert_eq!(last.reason, None);
}

#[tokio::test]
async fn test_expired_lock_reevaluates_credentials_from_zero() {
    let app = TestApp::new();
    let t0 = Utc::now();
    let user = app
        .seed_user_with(EMAIL, |u| {
            u.login_attempts = 5;
            u.account_locked_at = Some(t0);
        })
        .await;

    let err = app
        .state
        .login_service
        .login_at(
            login_request(EMAIL, "wrong-password"),
            origin(),
            minutes_after(t0, 10),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authentication));

    let stored = app.stored_user(user.id).await;
    assert_eq!(stored.login_attempts, 1);
    assert_eq!(stored.account_locked_at, None);
}

#[tokio::test]
async fn test_every_attempt_produces_exactly_one_record() {
    let app = TestApp::new();
    app.seed_user(EMAIL).await;
    let login = &app.state.login_service;

    let _ = login.login(login_request(EMAIL, "nope"), origin()).await;
    let _ = login.login(login_request(EMAIL, PASSWORD), origin()).await;
    let _ = login.login(login_request(EMAIL, "nope"), origin()).await;
    let _ = login
        .login(login_request("ghost@example.com", PASSWORD), origin())
        .await;

    let records = app.attempts.all().await;
    assert_eq!(records.len(), 4);
    assert_eq!(records.iter().filter(|r| r.success).count(), 1);
    assert!(records
        .iter()
        .all(|r| r.ip_address.as_deref() == Some("203.0.113.10")
            && r.user_agent.as_deref() == Some("integration-test")));
}

#[tokio::test]
async fn test_unknown_email_records_attempt_without_user() {
    let app = TestApp::new();

    let err = app
        .state
        .login_service
        .login(login_request("Ghost@Example.com", PASSWORD), origin())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authentication));

    let records = app.attempts.all().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user_id, None);
    assert_eq!(records[0].email, "ghost@example.com");
    assert_eq!(records[0].reason.as_deref(), Some("invalid credentials"));
    assert!(!records[0].success);
}

#[tokio::test]
async fn test_email_lookup_is_case_insensitive() {
    let app = TestApp::new();
    let user = app.seed_user(EMAIL).await;

    let response = app
        .state
        .login_service
        .login(login_request("  Alice@Example.COM ", PASSWORD), origin())
        .await
        .unwrap();
    assert_eq!(response.user.id, user.id);

    let records = app.attempts_for(EMAIL).await;
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
}

#[tokio::test]
async fn test_inactive_account_rejected_without_touching_counter() {
    let app = TestApp::new();
    let user = app
        .seed_user_with(EMAIL, |u| {
            u.is_active = false;
            u.login_attempts = 2;
        })
        .await;

    let err = app
        .state
        .login_service
        .login(login_request(EMAIL, PASSWORD), origin())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccountInactive));

    assert_eq!(app.stored_user(user.id).await.login_attempts, 2);
    assert!(app.sessions.list(Some(user.id)).await.unwrap().is_empty());

    let records = app.attempts_for(EMAIL).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reason.as_deref(), Some("inactive account"));
}

#[tokio::test]
async fn test_malformed_email_is_a_validation_error() {
    let app = TestApp::new();

    let err = app
        .state
        .login_service
        .login(login_request("not-an-email", PASSWORD), origin())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(app.attempts.all().await.is_empty());
}

#[tokio::test]
async fn test_missing_challenge_token_counts_as_failure() {
    let app = TestApp::new();
    let user = app.seed_user(EMAIL).await;

    let mut req = login_request(EMAIL, PASSWORD);
    req.recaptcha_token = String::new();

    let err = app
        .state
        .login_service
        .login(req, origin())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authentication));
    assert_eq!(app.stored_user(user.id).await.login_attempts, 1);
}

#[tokio::test]
async fn test_unavailable_verifier_fails_closed() {
    let mut config = create_test_config();
    config.security.debug_mode = false;
    let app = TestApp::with_verifier(config, Arc::new(UnavailableVerifier));
    let user = app.seed_user(EMAIL).await;

    let err = app
        .state
        .login_service
        .login(login_request(EMAIL, PASSWORD), origin())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authentication));
    assert_eq!(app.stored_user(user.id).await.login_attempts, 1);
}

#[tokio::test]
async fn test_test_token_only_bypasses_in_debug_mode() {
    let mut config = create_test_config();
    config.security.debug_mode = false;
    let app = TestApp::with_verifier(config, Arc::new(StaticVerifier(false)));
    app.seed_user(EMAIL).await;

    let err = app
        .state
        .login_service
        .login(login_request(EMAIL, PASSWORD), origin())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authentication));

    let mut config = create_test_config();
    config.security.debug_mode = false;
    let app = TestApp::with_verifier(config, Arc::new(StaticVerifier(true)));
    app.seed_user(EMAIL).await;

    assert!(app
        .state
        .login_service
        .login(login_request(EMAIL, PASSWORD), origin())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_attempt_log_failure_fails_the_request() {
    let app = TestApp::with_attempt_log(Arc::new(FailingAttemptLog));
    app.seed_user(EMAIL).await;
    let login = &app.state.login_service;

    let err = login
        .login(login_request(EMAIL, "wrong-password"), origin())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Database(_)));
    assert_eq!(err.code(), 500);

    let err = login
        .login(login_request(EMAIL, PASSWORD), origin())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Database(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_are_all_counted() {
    let app = TestApp::new();
    let user = app.seed_user(EMAIL).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let login = app.state.login_service.clone();
        handles.push(tokio::spawn(async move {
            login
                .login(login_request(EMAIL, "wrong-password"), origin())
                .await
        }));
    }

    let mut rejected = 0;
    let mut locked = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Err(AppError::Authentication) => rejected += 1,
            Err(AppError::AccountLocked) => locked += 1,
            other => panic!("unexpected outcome: {:?}", other.map(|r| r.user.id)),
        }
    }
    assert_eq!(rejected + locked, 10);
    assert!(rejected >= 5);

    let stored = app.stored_user(user.id).await;
    assert_eq!(stored.login_attempts, rejected);
    assert!(stored.account_locked_at.is_some());
    assert_eq!(app.attempts_for(EMAIL).await.len(), 10);
}

/// 按邮箱查询总是返回旧快照的用户存储，其余操作直接写入内层存储
struct StaleReadStore {
    inner: Arc<MemoryCredentialStore>,
    snapshot: User,
}

#[async_trait]
impl CredentialStore for StaleReadStore {
    async fn find_by_email(&self, _email: &str) -> Result<Option<User>, AppError> {
        Ok(Some(self.snapshot.clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        self.inner.find_by_id(id).await
    }

    async fn email_taken(&self, email: &str, exclude: Option<Uuid>) -> Result<bool, AppError> {
        self.inner.email_taken(email, exclude).await
    }

    async fn create(&self, user: NewUser, now: DateTime<Utc>) -> Result<User, AppError> {
        self.inner.create(user, now).await
    }

    async fn update(
        &self,
        id: Uuid,
        changes: UserChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        self.inner.update(id, changes, now).await
    }

    async fn list(&self, filter: &UserFilter) -> Result<Vec<User>, AppError> {
        self.inner.list(filter).await
    }

    async fn search(&self, query: &str) -> Result<Vec<User>, AppError> {
        self.inner.search(query).await
    }

    async fn clear_expired_lock(
        &self,
        id: Uuid,
        locked_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        self.inner.clear_expired_lock(id, locked_at).await
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        threshold: i32,
    ) -> Result<LockoutState, AppError> {
        self.inner.record_failed_login(id, at, threshold).await
    }

    async fn record_successful_login(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        lock_cutoff: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        self.inner.record_successful_login(id, at, lock_cutoff).await
    }
}

#[tokio::test]
async fn test_success_cannot_clear_lock_set_after_the_read() {
    let app = TestApp::new();
    let user = app.seed_user_with(EMAIL, |u| u.login_attempts = 4).await;
    let snapshot = app.stored_user(user.id).await;
    let t0 = Utc::now();

    // 另一个请求完成第 5 次失败并锁定账户
    let err = app
        .state
        .login_service
        .login_at(login_request(EMAIL, "wrong-password"), origin(), t0)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authentication));

    // 读取到锁定前快照的请求随后提交正确密码
    let stale = AppState::new(
        create_test_config(),
        None,
        Stores {
            users: Arc::new(StaleReadStore {
                inner: app.users.clone(),
                snapshot,
            }),
            sessions: app.sessions.clone(),
            attempts: app.attempts.clone(),
            audit: Arc::new(MemoryAuditSink::new()),
        },
        Arc::new(StaticVerifier(false)),
        fast_hasher(),
    )
    .unwrap();

    let err = stale
        .login_service
        .login_at(login_request(EMAIL, PASSWORD), origin(), minutes_after(t0, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccountLocked));

    let stored = app.stored_user(user.id).await;
    assert_eq!(stored.login_attempts, 5);
    assert_eq!(stored.account_locked_at, Some(t0));
    assert!(stored.last_login_at.is_none());
    assert!(app.sessions.list(Some(user.id)).await.unwrap().is_empty());

    let records = app.attempts_for(EMAIL).await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].reason.as_deref(), Some("locked"));
}

#[tokio::test]
async fn test_attempt_history_is_staff_only() {
    let app = TestApp::new();
    let user = app.seed_user(EMAIL).await;
    let _ = app
        .state
        .login_service
        .login(login_request(EMAIL, "wrong-password"), origin())
        .await;

    let mut caller = crm_service::auth::AuthContext {
        user_id: user.id,
        email: user.email.clone(),
        role: user.role.clone(),
        is_staff: false,
    };
    let err = app
        .state
        .login_service
        .attempt_history(&caller, None, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied));

    caller.is_staff = true;
    let records = app
        .state
        .login_service
        .attempt_history(&caller, Some(user.id), 10)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
}
