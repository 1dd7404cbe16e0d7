//! 登录限流集成测试

use multifinance_auth::{
    auth::{
        captcha::InMemoryCaptchaStore,
        rate_limit::{FixedWindowRateLimiter, LoginRateLimiter},
    },
    error::AppError,
    models::auth::LoginRequest,
    services::AuthService,
};
use std::{sync::Arc, time::Duration};

mod common;
use common::{create_test_config, create_test_user, CountingRepository, TEST_PASSWORD};

fn counting_service(limiter: Arc<FixedWindowRateLimiter>) -> (AuthService, CountingRepository) {
    let config = create_test_config();
    let repo = CountingRepository::default();
    let captcha = Arc::new(InMemoryCaptchaStore::from_config(&config.captcha));
    let service = AuthService::new(&config, Arc::new(repo.clone()), captcha)
        .expect("Failed to build auth service")
        .with_rate_limiter(limiter);
    (service, repo)
}

fn login_request(username: &str, password: &str) -> LoginRequest {
    LoginRequest {
        username: username.to_string(),
        password: password.to_string(),
    }
}

#[tokio::test]
async fn test_sixth_attempt_throttled_for_unknown_user() {
    let limiter = Arc::new(FixedWindowRateLimiter::new(5, Duration::from_secs(60)));
    let (service, repo) = counting_service(limiter.clone());

    for _ in 0..5 {
        let result = service.login(login_request("ghost", TEST_PASSWORD)).await;
        assert!(matches!(result, Err(AppError::InvalidCredentials)));
    }
    assert_eq!(repo.lookups(), 5);
    assert_eq!(limiter.current_count("ghost"), 5);

    let result = service.login(login_request("ghost", TEST_PASSWORD)).await;
    match result {
        Err(AppError::RateLimitExceeded { retry_after }) => {
            assert!(retry_after > Duration::ZERO);
            assert!(retry_after <= Duration::from_secs(60));
        }
        other => panic!("expected RateLimitExceeded, got {other:?}"),
    }

    // 被限流的请求不访问存储
    assert_eq!(repo.lookups(), 5);
}

#[tokio::test]
async fn test_sixth_attempt_throttled_for_existing_user() {
    let limiter = Arc::new(FixedWindowRateLimiter::new(5, Duration::from_secs(60)));
    let (service, repo) = counting_service(limiter);
    create_test_user(&service, "alice").await;
    let lookups_before = repo.lookups();

    for _ in 0..5 {
        let result = service.login(login_request("alice", "wrong")).await;
        assert!(matches!(result, Err(AppError::InvalidCredentials)));
    }

    // 即使密码正确，第 6 次也被限流
    let result = service.login(login_request("alice", TEST_PASSWORD)).await;
    assert!(matches!(result, Err(AppError::RateLimitExceeded { .. })));
    assert_eq!(repo.lookups() - lookups_before, 5);
}

#[tokio::test]
async fn test_limits_are_per_username() {
    let limiter = Arc::new(FixedWindowRateLimiter::new(5, Duration::from_secs(60)));
    let (service, _repo) = counting_service(limiter);
    create_test_user(&service, "alice").await;

    for _ in 0..6 {
        let _ = service.login(login_request("mallory", TEST_PASSWORD)).await;
    }

    assert!(service
        .login(login_request("alice", TEST_PASSWORD))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_window_resets_quota() {
    let limiter = Arc::new(FixedWindowRateLimiter::new(2, Duration::from_millis(200)));
    let (service, _repo) = counting_service(limiter);

    for _ in 0..2 {
        let _ = service.login(login_request("ghost", TEST_PASSWORD)).await;
    }
    assert!(matches!(
        service.login(login_request("ghost", TEST_PASSWORD)).await,
        Err(AppError::RateLimitExceeded { .. })
    ));

    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(matches!(
        service.login(login_request("ghost", TEST_PASSWORD)).await,
        Err(AppError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn test_unknown_username_windows_do_not_accumulate() {
    let limiter = Arc::new(FixedWindowRateLimiter::new(5, Duration::from_millis(50)));
    let (service, _repo) = counting_service(limiter.clone());

    for i in 0..2000 {
        let _ = service
            .login(login_request(&format!("ghost-{i}"), TEST_PASSWORD))
            .await;
    }
    assert!(limiter.tracked_identifiers() > 1);

    tokio::time::sleep(Duration::from_millis(200)).await;

    // 过期窗口由后续登录顺带清理，无需外部调用
    let _ = service.login(login_request("ghost-late", TEST_PASSWORD)).await;
    assert_eq!(limiter.tracked_identifiers(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checks_do_not_lose_updates() {
    let limiter = Arc::new(FixedWindowRateLimiter::new(50, Duration::from_secs(60)));

    let mut handles = Vec::new();
    for _ in 0..100 {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move {
            limiter.check("shared").await.unwrap().allowed
        }));
    }

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap() {
            allowed += 1;
        }
    }

    assert_eq!(allowed, 50);
    assert_eq!(limiter.current_count("shared"), 100);
}

#[tokio::test]
async fn test_disabled_limiter_always_allows() {
    let limiter = FixedWindowRateLimiter::disabled();

    for _ in 0..100 {
        assert!(limiter.check("alice").await.unwrap().allowed);
    }
    assert_eq!(limiter.tracked_identifiers(), 0);
}
