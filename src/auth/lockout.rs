//! Account lockout state machine.
//!
//! Two states per user record:
//!
//! - `Active`: `locked_until` is unset or already in the past.
//! - `Locked`: `locked_until` is in the future.
//!
//! There is no background timer. An elapsed lock is cleared lazily by the
//! next login attempt (`lazy_unlock`), and the cleared state is written back
//! together with whatever that attempt produces.

use crate::{
    config::LockoutConfig,
    models::user::{User, UserStatus},
};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Default maximum failed attempts before lockout.
const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 5;

/// Default lockout duration (15 minutes).
const DEFAULT_LOCKOUT_DURATION: Duration = Duration::from_secs(15 * 60);

/// Lockout policy configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Failed attempts that trigger a lock.
    pub max_failed_attempts: u32,
    /// How long the account stays locked.
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            lockout_duration: DEFAULT_LOCKOUT_DURATION,
        }
    }
}

/// Lock state of one account at a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    Active,
    Locked { retry_after: Duration },
}

/// Result of recording a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FailedAttempt {
    /// Counter value after this failure.
    pub failed_attempts: u32,
    /// Whether this failure moved the account to `Locked`.
    pub just_locked: bool,
}

impl LockoutPolicy {
    pub fn new(max_failed_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            max_failed_attempts,
            lockout_duration,
        }
    }

    pub fn from_config(config: &LockoutConfig) -> Self {
        Self::new(
            config.max_failed_attempts,
            Duration::from_secs(config.lockout_duration_secs),
        )
    }

    pub fn state(&self, user: &User, now: DateTime<Utc>) -> LockState {
        match user.locked_until {
            Some(until) if until > now => LockState::Locked {
                retry_after: (until - now).to_std().unwrap_or(Duration::ZERO),
            },
            _ => LockState::Active,
        }
    }

    /// Clear an elapsed lock in memory. Returns `true` when the record changed.
    pub fn lazy_unlock(&self, user: &mut User, now: DateTime<Utc>) -> bool {
        match user.locked_until {
            Some(until) if until <= now => {
                user.locked_until = None;
                user.failed_login_attempts = 0;
                user.last_failed_login = None;
                if user.status == UserStatus::Suspended {
                    user.status = UserStatus::Active;
                }
                true
            }
            _ => false,
        }
    }

    /// Apply a password mismatch to the record.
    pub fn record_failure(&self, user: &mut User, now: DateTime<Utc>) -> FailedAttempt {
        user.failed_login_attempts = user.failed_login_attempts.saturating_add(1);
        user.last_failed_login = Some(now);

        let just_locked = user.failed_login_attempts >= self.max_failed_attempts;
        if just_locked {
            user.status = UserStatus::Suspended;
            user.locked_until = Some(now + self.lockout_chrono());
        }

        FailedAttempt {
            failed_attempts: user.failed_login_attempts,
            just_locked,
        }
    }

    /// Reset counters after a successful login. Returns `true` when the record changed.
    ///
    /// Only a suspension produced by a lockout is lifted; one set without a
    /// lock timer or a full failure counter is left for an operator.
    pub fn record_success(&self, user: &mut User) -> bool {
        let lift_suspension = user.status == UserStatus::Suspended
            && (user.locked_until.is_some()
                || user.failed_login_attempts >= self.max_failed_attempts);

        let dirty = user.failed_login_attempts != 0
            || user.last_failed_login.is_some()
            || user.locked_until.is_some()
            || lift_suspension;

        user.failed_login_attempts = 0;
        user.last_failed_login = None;
        user.locked_until = None;
        if lift_suspension {
            user.status = UserStatus::Active;
        }

        dirty
    }

    fn lockout_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.lockout_duration)
            .unwrap_or_else(|_| chrono::Duration::minutes(15))
    }
}
