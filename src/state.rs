//! Connection and health data model.
//!
//! `ConnectionState` is the single source of truth for the connection and is
//! mutated only by the controller. `HealthSnapshot` is recomputed whole on
//! every monitor tick. Consumers always receive clones, never shared handles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

/// Canonical connection state. Created once at startup, reset on disconnect,
/// never destroyed.
///
/// `address` and `chain_id` are `Some` iff `status == Connected`
/// (`Reconnecting` keeps the last-known values visible while recovery runs).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub wallet_id: Option<String>,
    pub address: Option<String>,
    pub chain_id: Option<u64>,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ConnectionState {
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Milliseconds since the connection was established, 0 when not connected.
    pub fn connection_age_ms(&self, now: DateTime<Utc>) -> u64 {
        self.connected_at
            .map(|at| (now - at).num_milliseconds().max(0) as u64)
            .unwrap_or(0)
    }

    /// Reset to the initial disconnected shape, keeping nothing.
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Point-in-time health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    #[default]
    Disconnected,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Disconnected => "disconnected",
        }
    }

    /// Classification over the issue count of a completed check:
    /// none is healthy, exactly one is degraded, two or more is unhealthy.
    pub fn classify(issue_count: usize) -> Self {
        match issue_count {
            0 => HealthStatus::Healthy,
            1 => HealthStatus::Degraded,
            _ => HealthStatus::Unhealthy,
        }
    }
}

/// Health check result, recomputed whole per tick while connected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub latency_ms: u64,
    pub connection_age_ms: u64,
    pub error_count: u32,
    /// Human-readable issue strings, in probe order.
    pub issues: Vec<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl HealthSnapshot {
    /// The snapshot reported whenever the connection is not `Connected`.
    pub fn disconnected() -> Self {
        Self::default()
    }
}

/// Condensed view for UI panels.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub latency_ms: u64,
    pub uptime_ms: u64,
    pub can_reconnect: bool,
}
