//! Bounded retry policy for manual connection attempts.
//!
//! A pure counter with a hard ceiling - no backoff schedule. Provider
//! rejections here are user-driven (pop-up dismissed), not transient network
//! faults, so delaying retries buys nothing; the cap is what protects the
//! user from a nagging loop. Delay, where wanted, belongs to the caller.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

/// Attempt bookkeeping for one wallet id. Session-only, never persisted.
#[derive(Debug, Clone)]
pub struct RetryRecord {
    pub wallet_id: String,
    pub attempts: u32,
    pub last_attempt_at: DateTime<Utc>,
}

/// Per-identity bounded attempt counter.
pub struct RetryPolicy {
    max_attempts: u32,
    records: Mutex<HashMap<String, RetryRecord>>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts, records: Mutex::new(HashMap::new()) }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt for this id may proceed.
    pub fn can_attempt(&self, wallet_id: &str) -> bool {
        self.attempts(wallet_id) < self.max_attempts
    }

    /// Record a failed attempt and return the new count. At the cap this is
    /// an idempotent no-op that returns the cap.
    pub fn record_failure(&self, wallet_id: &str) -> u32 {
        let mut records = self.lock();
        let record = records.entry(wallet_id.to_string()).or_insert_with(|| RetryRecord {
            wallet_id: wallet_id.to_string(),
            attempts: 0,
            last_attempt_at: Utc::now(),
        });
        if record.attempts < self.max_attempts {
            record.attempts += 1;
        }
        record.last_attempt_at = Utc::now();
        record.attempts
    }

    /// Any success wipes the slate for this id.
    pub fn record_success(&self, wallet_id: &str) {
        self.lock().remove(wallet_id);
    }

    /// Attempts left before the terminal result.
    pub fn remaining(&self, wallet_id: &str) -> u32 {
        self.max_attempts.saturating_sub(self.attempts(wallet_id))
    }

    pub fn attempts(&self, wallet_id: &str) -> u32 {
        self.lock().get(wallet_id).map(|r| r.attempts).unwrap_or(0)
    }

    /// Explicit external reset, the only other way out of the terminal state.
    pub fn reset(&self, wallet_id: &str) {
        self.lock().remove(wallet_id);
    }

    pub fn record(&self, wallet_id: &str) -> Option<RetryRecord> {
        self.lock().get(wallet_id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, RetryRecord>> {
        self.records.lock().unwrap_or_else(|p| p.into_inner())
    }
}
