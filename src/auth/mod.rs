//! Authentication building blocks

pub mod captcha;
pub mod context;
pub mod jwt;
pub mod lockout;
pub mod password;
pub mod rate_limit;

pub use captcha::{CaptchaChallenge, CaptchaVerifier, InMemoryCaptchaStore};
pub use context::{extract_token, AuthContext};
pub use jwt::{Claims, JwtService, TokenPair};
pub use lockout::{FailedAttempt, LockState, LockoutPolicy};
pub use password::{PasswordHasher, PasswordPolicy, PolicyViolation};
pub use rate_limit::{FixedWindowRateLimiter, LoginRateLimiter, RateLimitDecision};
