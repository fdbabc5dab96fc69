//! Guard configuration - caps, intervals, and the timeout ladder.
//!
//! Timeouts are layered: `probe_timeout < check_timeout < safety_timeout`.
//! An inner deadline always fires before the one wrapping it; the outer
//! layers only exist as guarantees against a hung provider. `validate()`
//! rejects configurations that break the ladder.

use std::time::Duration;

use crate::error::{Error, Result};

/// Tunables for the controller and health monitor. Higher layers construct
/// this once and hand it in.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Manual connect attempts allowed per wallet id before the terminal
    /// retries-exhausted result.
    pub max_connect_attempts: u32,
    /// Health-driven reconnect attempts allowed per outage.
    pub max_reconnect_attempts: u32,
    /// Deadline for one provider connect call.
    pub connect_timeout: Duration,
    /// Persisted sessions older than this are not resumed on load.
    pub max_connection_age: Duration,
    /// Interval between periodic health checks.
    pub check_interval: Duration,
    /// Deadline for each individual probe.
    pub probe_timeout: Duration,
    /// Deadline for the whole three-probe batch.
    pub check_timeout: Duration,
    /// Ticker-side deadline after which a stuck in-flight flag is force-cleared.
    pub safety_timeout: Duration,
    /// Pause before a health-driven reconnect attempt.
    pub reconnect_delay: Duration,
    /// Round-trip above this raises a high-latency issue.
    pub max_latency_ms: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_connect_attempts: 3,
            max_reconnect_attempts: 3,
            connect_timeout: Duration::from_secs(20),
            max_connection_age: Duration::from_secs(24 * 60 * 60),
            check_interval: Duration::from_secs(45),
            probe_timeout: Duration::from_secs(3),
            check_timeout: Duration::from_secs(10),
            safety_timeout: Duration::from_secs(20),
            reconnect_delay: Duration::from_secs(5),
            max_latency_ms: 2000,
        }
    }
}

impl GuardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Short timers for tests, ladder intact.
    pub fn fast_test() -> Self {
        Self {
            max_connect_attempts: 3,
            max_reconnect_attempts: 3,
            connect_timeout: Duration::from_millis(200),
            max_connection_age: Duration::from_secs(60),
            check_interval: Duration::from_millis(100),
            probe_timeout: Duration::from_millis(40),
            check_timeout: Duration::from_millis(120),
            safety_timeout: Duration::from_millis(300),
            reconnect_delay: Duration::from_millis(50),
            max_latency_ms: 2000,
        }
    }

    pub fn with_max_connect_attempts(mut self, n: u32) -> Self {
        self.max_connect_attempts = n;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, n: u32) -> Self {
        self.max_reconnect_attempts = n;
        self
    }

    pub fn with_connect_timeout(mut self, d: Duration) -> Self {
        self.connect_timeout = d;
        self
    }

    pub fn with_max_connection_age(mut self, d: Duration) -> Self {
        self.max_connection_age = d;
        self
    }

    pub fn with_check_interval(mut self, d: Duration) -> Self {
        self.check_interval = d;
        self
    }

    pub fn with_probe_timeout(mut self, d: Duration) -> Self {
        self.probe_timeout = d;
        self
    }

    pub fn with_check_timeout(mut self, d: Duration) -> Self {
        self.check_timeout = d;
        self
    }

    pub fn with_safety_timeout(mut self, d: Duration) -> Self {
        self.safety_timeout = d;
        self
    }

    pub fn with_reconnect_delay(mut self, d: Duration) -> Self {
        self.reconnect_delay = d;
        self
    }

    pub fn with_max_latency_ms(mut self, ms: u64) -> Self {
        self.max_latency_ms = ms;
        self
    }

    /// Enforce the timeout ladder and non-zero caps.
    pub fn validate(&self) -> Result<()> {
        if self.max_connect_attempts == 0 {
            return Err(Error::validation("max_connect_attempts must be at least 1"));
        }
        if self.probe_timeout >= self.check_timeout {
            return Err(Error::validation(
                "probe_timeout must be strictly smaller than check_timeout",
            ));
        }
        if self.check_timeout >= self.safety_timeout {
            return Err(Error::validation(
                "check_timeout must be strictly smaller than safety_timeout",
            ));
        }
        if self.check_interval.is_zero() {
            return Err(Error::validation("check_interval must be non-zero"));
        }
        Ok(())
    }
}
