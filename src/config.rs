//! 配置系统
//! 从环境变量加载认证核心的全部配置，使用 Secret 包装敏感信息

use config::{Config, ConfigError, Environment};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// JWT 签名密钥（使用 Secret 包装，防止日志泄露）
    pub secret: Secret<String>,
    /// 访问令牌过期时间（秒）
    pub access_token_exp_secs: u64,
    /// 刷新令牌有效期 = 访问令牌有效期 × 该倍数
    pub refresh_token_multiplier: u32,
}

impl JwtConfig {
    /// 刷新令牌过期时间（秒）
    pub fn refresh_token_exp_secs(&self) -> u64 {
        self.access_token_exp_secs
            .saturating_mul(u64::from(self.refresh_token_multiplier))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// 每个窗口内允许的登录尝试次数
    pub login_max_attempts: u32,
    /// 固定窗口长度（秒）
    pub login_window_secs: u64,
    /// 关闭限流（仅用于确定性测试）
    pub disabled: bool,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.login_window_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockoutConfig {
    /// 触发锁定的连续失败次数
    pub max_failed_attempts: u32,
    /// 锁定持续时间（秒）
    pub lockout_duration_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    /// 密码最小长度
    pub min_length: usize,
    /// Argon2 内存开销（KiB）
    pub hash_memory_kib: u32,
    /// Argon2 迭代次数
    pub hash_iterations: u32,
    /// Argon2 并行度
    pub hash_parallelism: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// 单次存储调用的超时时间（秒）
    pub operation_timeout_secs: u64,
}

impl StoreConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    /// 验证码长度
    pub length: usize,
    /// 验证码有效期（秒）
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    pub lockout: LockoutConfig,
    pub password: PasswordConfig,
    pub store: StoreConfig,
    pub captcha: CaptchaConfig,
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("jwt.secret", "change-this-secret-in-production-min-32-chars!")?
            .set_default("jwt.access_token_exp_secs", 3600)?
            .set_default("jwt.refresh_token_multiplier", 24)?
            .set_default("rate_limit.login_max_attempts", 5)?
            .set_default("rate_limit.login_window_secs", 60)?
            .set_default("rate_limit.disabled", false)?
            .set_default("lockout.max_failed_attempts", 5)?
            .set_default("lockout.lockout_duration_secs", 900)?
            .set_default("password.min_length", 8)?
            .set_default("password.hash_memory_kib", 65536)?
            .set_default("password.hash_iterations", 3)?
            .set_default("password.hash_parallelism", 4)?
            .set_default("store.operation_timeout_secs", 10)?
            .set_default("captcha.length", 6)?
            .set_default("captcha.ttl_secs", 300)?;

        // 从环境变量加载配置（前缀为 MF_）
        settings = settings.add_source(
            Environment::with_prefix("MF")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = settings.build()?.try_deserialize()?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 验证配置合法性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 验证日志级别
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        // 验证日志格式
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty",
                    self.logging.format
                )))
            }
        }

        // 验证 JWT 密钥长度（至少 32 字符）
        if self.jwt.secret.expose_secret().len() < 32 {
            return Err(ConfigError::Message(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        // 验证令牌过期时间
        if self.jwt.access_token_exp_secs < 60 || self.jwt.access_token_exp_secs > 86400 {
            return Err(ConfigError::Message(
                "access_token_exp_secs must be between 60 and 86400 (1 minute to 24 hours)"
                    .to_string(),
            ));
        }

        if self.jwt.refresh_token_multiplier == 0 {
            return Err(ConfigError::Message(
                "refresh_token_multiplier must be at least 1".to_string(),
            ));
        }

        // 验证限流配置
        if self.rate_limit.login_max_attempts == 0 || self.rate_limit.login_window_secs == 0 {
            return Err(ConfigError::Message(
                "login_max_attempts and login_window_secs must be greater than 0".to_string(),
            ));
        }

        // 验证登录失败锁定配置
        if self.lockout.max_failed_attempts < 1 || self.lockout.max_failed_attempts > 20 {
            return Err(ConfigError::Message(
                "max_failed_attempts must be between 1 and 20".to_string(),
            ));
        }

        if self.lockout.lockout_duration_secs == 0 {
            return Err(ConfigError::Message(
                "lockout_duration_secs must be greater than 0".to_string(),
            ));
        }

        // 验证密码策略
        if self.password.min_length < 6 || self.password.min_length > 128 {
            return Err(ConfigError::Message(
                "password min_length must be between 6 and 128".to_string(),
            ));
        }

        if self.store.operation_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "store operation_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.captcha.length == 0 {
            return Err(ConfigError::Message(
                "captcha length must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
