//! 测试公共模块
//! 提供测试配置、内存存储与服务构建工具

#![allow(dead_code)]

use async_trait::async_trait;
use multifinance_auth::{
    auth::captcha::InMemoryCaptchaStore,
    config::{
        AppConfig, CaptchaConfig, JwtConfig, LockoutConfig, LoggingConfig, PasswordConfig,
        RateLimitConfig, StoreConfig,
    },
    error::AppError,
    models::user::{RegisterRequest, User, UserResponse},
    repository::{InMemoryUserRepository, UserRepository},
    services::AuthService,
};
use secrecy::Secret;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;
use uuid::Uuid;

pub const TEST_PASSWORD: &str = "Abcdef1!";

/// 创建测试配置
pub fn create_test_config() -> AppConfig {
    AppConfig {
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        jwt: JwtConfig {
            secret: Secret::new("test-secret-key-for-testing-only-min-32-chars".to_string()),
            access_token_exp_secs: 300,
            refresh_token_multiplier: 24,
        },
        rate_limit: RateLimitConfig {
            login_max_attempts: 5,
            login_window_secs: 60,
            disabled: false,
        },
        lockout: LockoutConfig {
            max_failed_attempts: 5,
            lockout_duration_secs: 900,
        },
        // 测试使用低成本哈希参数
        password: PasswordConfig {
            min_length: 8,
            hash_memory_kib: 1024,
            hash_iterations: 1,
            hash_parallelism: 1,
        },
        store: StoreConfig {
            operation_timeout_secs: 1,
        },
        captcha: CaptchaConfig {
            length: 6,
            ttl_secs: 300,
        },
    }
}

/// 认证服务及其内存协作者
pub struct TestContext {
    pub service: AuthService,
    pub users: InMemoryUserRepository,
    pub captcha: Arc<InMemoryCaptchaStore>,
}

/// 构建使用内存存储的认证服务（限流开启）
pub fn build_service() -> TestContext {
    build_service_with(create_test_config())
}

/// 构建关闭限流的认证服务，用于锁定流程等确定性场景
pub fn build_service_without_rate_limit() -> TestContext {
    let mut config = create_test_config();
    config.rate_limit.disabled = true;
    build_service_with(config)
}

pub fn build_service_with(config: AppConfig) -> TestContext {
    let users = InMemoryUserRepository::new();
    let captcha = Arc::new(InMemoryCaptchaStore::from_config(&config.captcha));
    let service = AuthService::new(&config, Arc::new(users.clone()), captcha.clone())
        .expect("Failed to build auth service");

    TestContext {
        service,
        users,
        captcha,
    }
}

pub fn register_request(username: &str, email: &str, password: &str) -> RegisterRequest {
    RegisterRequest {
        username: username.to_string(),
        email: email.to_string(),
        password: password.to_string(),
        ..Default::default()
    }
}

/// 注册测试用户
pub async fn create_test_user(service: &AuthService, username: &str) -> UserResponse {
    service
        .register(register_request(
            username,
            &format!("{username}@example.com"),
            TEST_PASSWORD,
        ))
        .await
        .expect("Failed to register test user")
}

/// 记录用户名查询次数的存储包装
#[derive(Clone, Default)]
pub struct CountingRepository {
    pub inner: InMemoryUserRepository,
    pub username_lookups: Arc<AtomicUsize>,
}

impl CountingRepository {
    pub fn lookups(&self) -> usize {
        self.username_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserRepository for CountingRepository {
    async fn create(&self, user: &User) -> Result<User, AppError> {
        self.inner.create(user).await
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError> {
        self.inner.get_by_id(id).await
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        self.username_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.get_by_username(username).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.inner.get_by_email(email).await
    }

    async fn update(&self, user: &User) -> Result<(), AppError> {
        self.inner.update(user).await
    }

    async fn delete(&self, id: &Uuid) -> Result<(), AppError> {
        self.inner.delete(id).await
    }
}

/// 永不返回的存储，用于验证超时
pub struct StalledRepository;

#[async_trait]
impl UserRepository for StalledRepository {
    async fn create(&self, _user: &User) -> Result<User, AppError> {
        std::future::pending().await
    }

    async fn get_by_id(&self, _id: &Uuid) -> Result<Option<User>, AppError> {
        std::future::pending().await
    }

    async fn get_by_username(&self, _username: &str) -> Result<Option<User>, AppError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(None)
    }

    async fn get_by_email(&self, _email: &str) -> Result<Option<User>, AppError> {
        std::future::pending().await
    }

    async fn update(&self, _user: &User) -> Result<(), AppError> {
        std::future::pending().await
    }

    async fn delete(&self, _id: &Uuid) -> Result<(), AppError> {
        std::future::pending().await
    }
}
