//! Login throttling
//!
//! `FixedWindowRateLimiter` counts attempts per identifier in discrete
//! windows. The counter table is a `DashMap`; every check takes the entry's
//! shard lock for the whole read-modify-write, so concurrent callers on one
//! identifier never lose increments. Elapsed windows are swept from inside
//! `check` at most once per window length, so the table stays bounded by the
//! identifiers seen in roughly the last two windows. Deployments spanning
//! several processes should implement `LoginRateLimiter` over a shared
//! atomic-increment store.

use crate::{config::RateLimitConfig, error::AppError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

/// Outcome of one counted attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Time until the identifier's window resets.
    pub retry_after: Duration,
}

impl RateLimitDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            retry_after: Duration::ZERO,
        }
    }
}

/// Keyed attempt counter consulted before every login.
#[async_trait]
pub trait LoginRateLimiter: Send + Sync {
    /// Count one attempt for `identifier` and report whether it is within quota.
    async fn check(&self, identifier: &str) -> Result<RateLimitDecision, AppError>;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// In-process fixed-window limiter
#[derive(Debug, Clone)]
pub struct FixedWindowRateLimiter {
    windows: Arc<DashMap<String, Window>>,
    max_attempts: u32,
    window: Duration,
    disabled: bool,
    epoch: Instant,
    /// Millis since `epoch` at which the next sweep is due.
    next_sweep_ms: Arc<AtomicU64>,
}

impl FixedWindowRateLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            max_attempts,
            window,
            disabled: false,
            epoch: Instant::now(),
            next_sweep_ms: Arc::new(AtomicU64::new(duration_ms(window))),
        }
    }

    /// Limiter that allows everything and counts nothing.
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::new(u32::MAX, Duration::ZERO)
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        if config.disabled {
            return Self::disabled();
        }
        Self::new(config.login_max_attempts, config.window())
    }

    fn hit(&self, identifier: &str, now: Instant) -> RateLimitDecision {
        if self.disabled {
            return RateLimitDecision::allow();
        }

        // 必须在持有 entry 之前清理，retain 会锁住全部分片
        self.maybe_sweep(now);

        let mut entry = self
            .windows
            .entry(identifier.to_string())
            .or_insert_with(|| Window {
                count: 0,
                reset_at: now + self.window,
            });

        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + self.window;
        }

        entry.count = entry.count.saturating_add(1);

        RateLimitDecision {
            allowed: entry.count <= self.max_attempts,
            retry_after: entry.reset_at.saturating_duration_since(now),
        }
    }

    /// Attempts counted in the identifier's current window.
    pub fn current_count(&self, identifier: &str) -> u32 {
        let now = Instant::now();
        self.windows
            .get(identifier)
            .filter(|w| now < w.reset_at)
            .map(|w| w.count)
            .unwrap_or(0)
    }

    /// Drop windows that have already elapsed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, w| now < w.reset_at);
        let purged = before.saturating_sub(self.windows.len());
        if purged > 0 {
            tracing::debug!(purged, "Purged expired rate limit windows");
        }
        purged
    }

    pub fn tracked_identifiers(&self) -> usize {
        self.windows.len()
    }

    /// Sweep elapsed windows once the sweep deadline has passed. Only the
    /// caller that wins the deadline swap does the work.
    fn maybe_sweep(&self, now: Instant) {
        let elapsed_ms = duration_ms(now.saturating_duration_since(self.epoch));
        let due = self.next_sweep_ms.load(Ordering::Acquire);
        if elapsed_ms < due {
            return;
        }

        let next = elapsed_ms.saturating_add(duration_ms(self.window).max(1));
        if self
            .next_sweep_ms
            .compare_exchange(due, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.purge_expired_at(now);
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl LoginRateLimiter for FixedWindowRateLimiter {
    async fn check(&self, identifier: &str) -> Result<RateLimitDecision, AppError> {
        Ok(self.hit(identifier, Instant::now()))
    }
}
