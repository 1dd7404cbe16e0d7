//! CAPTCHA verification
//!
//! Rendering challenges is left to the presentation layer; the core only
//! needs a yes/no answer for a (challenge id, solution) pair.

use crate::config::CaptchaConfig;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};
use uuid::Uuid;

const CAPTCHA_ALPHABET: &[u8] = b"0123456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Boolean CAPTCHA collaborator.
pub trait CaptchaVerifier: Send + Sync {
    fn verify(&self, captcha_id: &str, solution: &str) -> bool;
}

/// Freshly issued challenge, handed to whatever renders it.
#[derive(Debug, Clone)]
pub struct CaptchaChallenge {
    pub id: String,
    pub code: String,
}

#[derive(Debug, Clone)]
struct StoredChallenge {
    code: String,
    expires_at: DateTime<Utc>,
}

/// In-memory challenge store. Each challenge can be verified once.
///
/// Unanswered challenges are swept by `issue` at most once per TTL.
#[derive(Clone)]
pub struct InMemoryCaptchaStore {
    challenges: Arc<DashMap<String, StoredChallenge>>,
    length: usize,
    ttl: chrono::Duration,
    /// Unix millis at which the next sweep is due.
    next_sweep_ms: Arc<AtomicI64>,
}

impl InMemoryCaptchaStore {
    pub fn new(length: usize, ttl: chrono::Duration) -> Self {
        Self {
            challenges: Arc::new(DashMap::new()),
            length,
            ttl,
            next_sweep_ms: Arc::new(AtomicI64::new(
                (Utc::now() + ttl.max(chrono::Duration::zero())).timestamp_millis(),
            )),
        }
    }

    pub fn from_config(config: &CaptchaConfig) -> Self {
        Self::new(
            config.length,
            chrono::Duration::seconds(config.ttl_secs as i64),
        )
    }

    /// Create and remember a new challenge
    pub fn issue(&self) -> CaptchaChallenge {
        self.issue_at(Utc::now())
    }

    fn issue_at(&self, now: DateTime<Utc>) -> CaptchaChallenge {
        self.maybe_sweep(now);

        let mut rng = rand::thread_rng();
        let code: String = (0..self.length)
            .map(|_| CAPTCHA_ALPHABET[rng.gen_range(0..CAPTCHA_ALPHABET.len())] as char)
            .collect();
        let id = Uuid::new_v4().to_string();

        self.challenges.insert(
            id.clone(),
            StoredChallenge {
                code: code.clone(),
                expires_at: now + self.ttl,
            },
        );

        tracing::debug!(captcha_id = %id, "Issued captcha challenge");
        CaptchaChallenge { id, code }
    }

    /// Drop challenges past their expiry
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.challenges.len();
        self.challenges.retain(|_, c| c.expires_at > now);
        let purged = before.saturating_sub(self.challenges.len());
        if purged > 0 {
            tracing::debug!(purged, "Purged expired captcha challenges");
        }
        purged
    }

    fn maybe_sweep(&self, now: DateTime<Utc>) {
        let now_ms = now.timestamp_millis();
        let due = self.next_sweep_ms.load(Ordering::Acquire);
        if now_ms < due {
            return;
        }

        let interval = self.ttl.num_milliseconds().max(1);
        if self
            .next_sweep_ms
            .compare_exchange(
                due,
                now_ms.saturating_add(interval),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.purge_expired_at(now);
        }
    }

    pub fn pending(&self) -> usize {
        self.challenges.len()
    }
}

impl CaptchaVerifier for InMemoryCaptchaStore {
    fn verify(&self, captcha_id: &str, solution: &str) -> bool {
        let Some((_, challenge)) = self.challenges.remove(captcha_id) else {
            tracing::debug!(captcha_id = %captcha_id, "Unknown captcha id");
            return false;
        };

        if challenge.expires_at <= Utc::now() {
            tracing::debug!(captcha_id = %captcha_id, "Captcha expired");
            return false;
        }

        challenge.code.eq_ignore_ascii_case(solution.trim())
    }
}
