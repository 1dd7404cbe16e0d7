//! 认证服务：注册、登录、资料维护、验证码校验

use crate::{
    auth::{
        captcha::CaptchaVerifier,
        jwt::JwtService,
        lockout::{LockState, LockoutPolicy},
        password::{PasswordHasher, PasswordPolicy},
        rate_limit::{FixedWindowRateLimiter, LoginRateLimiter},
    },
    config::AppConfig,
    error::AppError,
    models::{
        auth::{LoginRequest, LoginResponse},
        user::{RegisterRequest, UpdateProfileRequest, User, UserResponse, UserStatus},
    },
    repository::UserRepository,
};
use chrono::Utc;
use std::{future::Future, sync::Arc, time::Duration};
use uuid::Uuid;
use validator::{Validate, ValidateEmail};

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    jwt_service: Arc<JwtService>,
    rate_limiter: Arc<dyn LoginRateLimiter>,
    captcha: Arc<dyn CaptchaVerifier>,
    hasher: Arc<PasswordHasher>,
    password_policy: PasswordPolicy,
    lockout: LockoutPolicy,
    store_timeout: Duration,
}

impl AuthService {
    pub fn new(
        config: &AppConfig,
        users: Arc<dyn UserRepository>,
        captcha: Arc<dyn CaptchaVerifier>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            users,
            jwt_service: Arc::new(JwtService::from_config(&config.jwt)?),
            rate_limiter: Arc::new(FixedWindowRateLimiter::from_config(&config.rate_limit)),
            captcha,
            hasher: Arc::new(PasswordHasher::from_config(&config.password)?),
            password_policy: PasswordPolicy::from_config(&config.password),
            lockout: LockoutPolicy::from_config(&config.lockout),
            store_timeout: config.store.operation_timeout(),
        })
    }

    /// Replace the in-process limiter, e.g. with one backed by a shared store
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn LoginRateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Token service shared with the caller-side interceptor
    pub fn jwt_service(&self) -> Arc<JwtService> {
        self.jwt_service.clone()
    }

    /// 用户注册
    pub async fn register(&self, req: RegisterRequest) -> Result<UserResponse, AppError> {
        if req.username.trim().is_empty() || req.password.is_empty() || req.email.trim().is_empty()
        {
            return Err(AppError::validation(
                "username, password and email are required",
            ));
        }

        validate_email(&req.email)?;
        self.password_policy.validate(&req.password)?;
        req.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        // 检查用户名与邮箱唯一性
        if self
            .store("get_by_username", self.users.get_by_username(&req.username))
            .await?
            .is_some()
        {
            return Err(AppError::conflict("username already exists"));
        }

        if self
            .store("get_by_email", self.users.get_by_email(&req.email))
            .await?
            .is_some()
        {
            return Err(AppError::conflict("email already registered"));
        }

        let password_hash = self.hash_password(req.password).await?;
        let now = Utc::now();

        let user = User {
            id: Uuid::new_v4(),
            username: req.username,
            email: req.email,
            password_hash,
            full_name: req.full_name,
            phone_number: req.phone_number,
            address: req.address,
            ktp_number: req.ktp_number,
            monthly_income: req.monthly_income.unwrap_or(0.0),
            status: UserStatus::Active,
            failed_login_attempts: 0,
            last_failed_login: None,
            locked_until: None,
            created_at: now,
            updated_at: now,
        };

        let created = self.store("create", self.users.create(&user)).await?;

        metrics::counter!("auth_registrations_total").increment(1);
        tracing::info!(user_id = %created.id, username = %created.username, "User registered");

        Ok(created.into())
    }

    /// 用户登录
    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, AppError> {
        // 检查速率限制（未知用户名同样计数）
        let decision = self.rate_limiter.check(&req.username).await?;
        if !decision.allowed {
            tracing::warn!(
                username = %req.username,
                retry_after_secs = decision.retry_after.as_secs(),
                "Login rate limit exceeded"
            );
            record_login_outcome("rate_limited");
            return Err(AppError::RateLimitExceeded {
                retry_after: decision.retry_after,
            });
        }

        // 获取用户
        let Some(mut user) = self
            .store("get_by_username", self.users.get_by_username(&req.username))
            .await?
        else {
            tracing::info!(username = %req.username, "Login failed: unknown username");
            record_login_outcome("invalid_credentials");
            return Err(AppError::InvalidCredentials);
        };

        let now = Utc::now();

        // 检查账户是否被锁定（不校验密码）
        if let LockState::Locked { retry_after } = self.lockout.state(&user, now) {
            tracing::warn!(
                user_id = %user.id,
                retry_after_secs = retry_after.as_secs(),
                "Login rejected: account locked"
            );
            record_login_outcome("locked");
            return Err(AppError::AccountLocked { retry_after });
        }

        let unlocked = self.lockout.lazy_unlock(&mut user, now);
        if unlocked {
            tracing::info!(user_id = %user.id, "Account lock expired");
        }

        // 验证密码
        if !self
            .verify_password(req.password, user.password_hash.clone())
            .await?
        {
            let attempt = self.lockout.record_failure(&mut user, now);
            user.updated_at = now;
            self.store("update", self.users.update(&user)).await?;

            if attempt.just_locked {
                metrics::counter!("auth_account_lockouts_total").increment(1);
                tracing::warn!(
                    user_id = %user.id,
                    failed_attempts = attempt.failed_attempts,
                    "Account locked after repeated failures"
                );
            } else {
                tracing::info!(
                    user_id = %user.id,
                    failed_attempts = attempt.failed_attempts,
                    "Login failed: wrong password"
                );
            }
            record_login_outcome("invalid_credentials");
            return Err(AppError::InvalidCredentials);
        }

        // 重置失败次数
        if self.lockout.record_success(&mut user) || unlocked {
            user.updated_at = now;
            self.store("update", self.users.update(&user)).await?;
        }

        // 生成令牌
        let token_pair = self.jwt_service.issue(&user)?;

        record_login_outcome("success");
        tracing::info!(user_id = %user.id, username = %user.username, "User logged in");

        Ok(LoginResponse {
            access_token: token_pair.access_token,
            refresh_token: token_pair.refresh_token,
            expires_in: token_pair.expires_in,
            user: user.into(),
        })
    }

    /// 获取用户资料
    pub async fn get_profile(&self, id: &str) -> Result<UserResponse, AppError> {
        let id = parse_user_id(id)?;

        self.store("get_by_id", self.users.get_by_id(&id))
            .await?
            .map(UserResponse::from)
            .ok_or_else(|| AppError::not_found("user"))
    }

    /// 更新用户资料
    pub async fn update_profile(&self, req: UpdateProfileRequest) -> Result<UserResponse, AppError> {
        let id = parse_user_id(&req.id)?;
        req.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let mut user = self
            .store("get_by_id", self.users.get_by_id(&id))
            .await?
            .ok_or_else(|| AppError::not_found("user"))?;

        if let Some(email) = req.email.filter(|e| !e.is_empty() && *e != user.email) {
            validate_email(&email)?;

            if let Some(other) = self
                .store("get_by_email", self.users.get_by_email(&email))
                .await?
            {
                if other.id != user.id {
                    return Err(AppError::conflict("email already registered"));
                }
            }
            user.email = email;
        }

        // 未提供新密码时保留原哈希
        if let Some(password) = req.password.filter(|p| !p.is_empty()) {
            self.password_policy.validate(&password)?;
            user.password_hash = self.hash_password(password).await?;
            tracing::info!(user_id = %user.id, "Password changed");
        }

        if let Some(full_name) = req.full_name {
            user.full_name = Some(full_name);
        }
        if let Some(phone_number) = req.phone_number {
            user.phone_number = Some(phone_number);
        }
        if let Some(address) = req.address {
            user.address = Some(address);
        }
        if let Some(ktp_number) = req.ktp_number {
            user.ktp_number = Some(ktp_number);
        }
        if let Some(monthly_income) = req.monthly_income {
            user.monthly_income = monthly_income;
        }

        user.updated_at = Utc::now();
        self.store("update", self.users.update(&user)).await?;

        tracing::info!(user_id = %user.id, "Profile updated");
        Ok(user.into())
    }

    /// 校验验证码
    pub fn validate_captcha(&self, captcha_id: &str, solution: &str) -> bool {
        self.captcha.verify(captcha_id, solution)
    }

    /// Argon2 计算放到阻塞线程池，避免占用异步工作线程
    async fn hash_password(&self, password: String) -> Result<String, AppError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::internal_error(format!("password hashing task failed: {e}")))?
    }

    async fn verify_password(&self, password: String, hash: String) -> Result<bool, AppError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AppError::internal_error(format!("password verify task failed: {e}")))?
    }

    /// 在超时约束下执行存储调用
    async fn store<T, F>(&self, operation: &'static str, call: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                if e.status_code().is_server_error() {
                    tracing::error!(operation, error = %e, "Credential store call failed");
                }
                Err(e)
            }
            Err(elapsed) => {
                tracing::warn!(
                    operation,
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Credential store call timed out"
                );
                Err(elapsed.into())
            }
        }
    }
}

fn record_login_outcome(outcome: &'static str) {
    metrics::counter!("auth_login_attempts_total", "outcome" => outcome).increment(1);
}

fn parse_user_id(id: &str) -> Result<Uuid, AppError> {
    if id.trim().is_empty() {
        return Err(AppError::validation("user id is required"));
    }
    Uuid::parse_str(id.trim()).map_err(|_| AppError::validation("invalid user id"))
}

/// 邮箱需包含 '@'，域名部分需包含 '.'，并满足 RFC 语法
fn validate_email(email: &str) -> Result<(), AppError> {
    let domain_has_dot = email
        .rsplit_once('@')
        .is_some_and(|(_, domain)| domain.contains('.'));

    if !domain_has_dot || !email.validate_email() {
        return Err(AppError::validation("invalid email format"));
    }
    Ok(())
}
