//! Health monitor - periodic probes over the live connection.
//!
//! # Loop shape
//!
//! ```text
//! start()
//!   │  immediate check, then fixed interval
//!   ▼
//! check ──► latency probe   (probe_timeout each)
//!       ──► wallet probe     issues collected in order
//!       ──► network probe
//!   │  whole batch wrapped in check_timeout
//!   ▼
//! classify: 0 issues healthy / 1 degraded / 2+ unhealthy
//!   │  unhealthy → delayed auto-reconnect chain (own counter, max 3)
//!   ▼
//! snapshot (recomputed whole, copied out)
//! ```
//!
//! A single in-flight flag serializes checks; a request while one runs is a
//! no-op. The flag is released by a drop guard on every exit path, and the
//! ticker force-clears it if it is ever found stuck past `safety_timeout`.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::broadcast;

use crate::config::GuardConfig;
use crate::notify::NotificationSink;
use crate::provider::{rpc, WalletProvider};
use crate::runtime::Shutdown;
use crate::state::{ConnectionState, HealthSnapshot, HealthStatus, HealthSummary};

/// Callbacks into the owning controller. The monitor holds a weak handle:
/// if the controller is gone, reconnect chains simply stop.
#[async_trait]
pub trait ControllerLink: Send + Sync {
    /// One reconnect attempt. Returns true on success.
    async fn reconnect(&self) -> bool;

    /// Reconnect attempts exhausted; the connection is lost for good.
    async fn connection_lost(&self);

    /// A fully healthy check counts as wallet activity.
    async fn mark_activity(&self);
}

#[derive(Clone)]
pub struct HealthMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    provider: Arc<dyn WalletProvider>,
    notify: Arc<dyn NotificationSink>,
    config: GuardConfig,
    /// Controller-owned state; the monitor only reads it.
    state: Arc<tokio::sync::RwLock<ConnectionState>>,
    snapshot: RwLock<HealthSnapshot>,
    in_flight: AtomicBool,
    /// Epoch millis when the in-flight check started, 0 when idle.
    check_started_ms: AtomicI64,
    error_count: AtomicU32,
    reconnect_attempts: AtomicU32,
    reconnect_pending: AtomicBool,
    link: Mutex<Option<Weak<dyn ControllerLink>>>,
    shutdown: Mutex<Option<Shutdown>>,
}

/// Releases the in-flight flag on every exit path, including cancellation.
struct InFlightGuard(Arc<MonitorInner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
        self.0.check_started_ms.store(0, Ordering::Release);
    }
}

impl HealthMonitor {
    pub fn new(
        provider: Arc<dyn WalletProvider>,
        notify: Arc<dyn NotificationSink>,
        config: GuardConfig,
        state: Arc<tokio::sync::RwLock<ConnectionState>>,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                provider,
                notify,
                config,
                state,
                snapshot: RwLock::new(HealthSnapshot::disconnected()),
                in_flight: AtomicBool::new(false),
                check_started_ms: AtomicI64::new(0),
                error_count: AtomicU32::new(0),
                reconnect_attempts: AtomicU32::new(0),
                reconnect_pending: AtomicBool::new(false),
                link: Mutex::new(None),
                shutdown: Mutex::new(None),
            }),
        }
    }

    /// Wire the owning controller in. Without a link the monitor still
    /// classifies health but never attempts reconnection.
    pub fn set_link(&self, link: Weak<dyn ControllerLink>) {
        *self.inner.link.lock().unwrap_or_else(|p| p.into_inner()) = Some(link);
    }

    /// Begin monitoring: one immediate check, then a fixed interval.
    /// Idempotent - an existing loop is torn down and re-armed.
    pub async fn start(&self) {
        let previous = self.inner.take_shutdown();
        if let Some(previous) = previous {
            previous.trigger().await;
        }

        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        self.inner.store_shutdown(shutdown);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tracing::debug!(interval_ms = (inner.config.check_interval.as_millis() as u64), "health monitor started");
            tokio::select! {
                _ = rx.recv() => return,
                _ = MonitorInner::check(&inner) => {}
            }
            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = tokio::time::sleep(inner.config.check_interval) => {}
                }
                inner.sweep_stuck_flag();
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = MonitorInner::check(&inner) => {}
                }
            }
            tracing::debug!("health monitor stopped");
        });
    }

    /// Cancel the interval and abort any in-flight check, then report
    /// Disconnected until the next `start()`.
    pub async fn stop(&self) {
        if let Some(shutdown) = self.inner.take_shutdown() {
            shutdown.trigger().await;
        }
        self.inner.reset_disconnected();
    }

    /// Run one check now. A no-op returning the last snapshot if a check is
    /// already in flight.
    pub async fn check_now(&self) -> HealthSnapshot {
        MonitorInner::check(&self.inner).await
    }

    /// Last computed snapshot, copied out.
    pub fn snapshot(&self) -> HealthSnapshot {
        self.inner.read_snapshot()
    }

    pub async fn summary(&self) -> HealthSummary {
        let snapshot = self.inner.read_snapshot();
        let state = self.inner.state.read().await.clone();
        HealthSummary {
            status: snapshot.status,
            issues: snapshot.issues.clone(),
            latency_ms: snapshot.latency_ms,
            uptime_ms: state.connection_age_ms(Utc::now()),
            can_reconnect: self.inner.reconnect_attempts.load(Ordering::Acquire)
                < self.inner.config.max_reconnect_attempts,
        }
    }

    pub fn error_count(&self) -> u32 {
        self.inner.error_count.load(Ordering::Acquire)
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.reconnect_attempts.load(Ordering::Acquire)
    }
}

impl MonitorInner {
    async fn check(inner: &Arc<Self>) -> HealthSnapshot {
        if inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("health check already in flight, skipping");
            return inner.read_snapshot();
        }
        let _guard = InFlightGuard(inner.clone());
        inner.check_started_ms.store(Utc::now().timestamp_millis(), Ordering::Release);

        let state = inner.state.read().await.clone();
        if !state.status.is_connected() {
            let snapshot = HealthSnapshot::disconnected();
            inner.store_snapshot(snapshot.clone());
            return snapshot;
        }

        let outcome = tokio::time::timeout(inner.config.check_timeout, inner.run_probes(&state)).await;
        let now = Utc::now();
        let (latency_ms, issues) = match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_ms = (inner.config.check_timeout.as_millis() as u64), "health check timed out");
                inner.error_count.fetch_add(1, Ordering::AcqRel);
                (inner.config.check_timeout.as_millis() as u64, vec!["Health check failed".to_string()])
            }
        };

        // The connection may have been torn down while we probed; a stale
        // classification must never resurrect a disconnected snapshot.
        if !inner.state.read().await.status.is_connected() {
            let snapshot = HealthSnapshot::disconnected();
            inner.store_snapshot(snapshot.clone());
            return snapshot;
        }

        let status = HealthStatus::classify(issues.len());
        match status {
            HealthStatus::Healthy => {
                inner.error_count.store(0, Ordering::Release);
                inner.reconnect_attempts.store(0, Ordering::Release);
                if let Some(link) = inner.link() {
                    link.mark_activity().await;
                }
            }
            HealthStatus::Degraded => {
                inner.notify.warning(&format!("Wallet connection degraded: {}", issues.join("; ")));
            }
            HealthStatus::Unhealthy => {
                inner.error_count.fetch_add(1, Ordering::AcqRel);
                inner.notify.error(&format!("Wallet connection unhealthy: {}", issues.join("; ")));
                Self::schedule_reconnect(inner);
            }
            HealthStatus::Disconnected => unreachable!("classify never yields Disconnected"),
        }

        let snapshot = HealthSnapshot {
            status,
            latency_ms,
            connection_age_ms: state.connection_age_ms(now),
            error_count: inner.error_count.load(Ordering::Acquire),
            issues,
            last_checked_at: Some(now),
        };
        inner.store_snapshot(snapshot.clone());
        snapshot
    }

    /// Three independent probes, each under its own timeout, issues in
    /// probe order.
    async fn run_probes(&self, state: &ConnectionState) -> (u64, Vec<String>) {
        let address = state.address.clone().unwrap_or_default();
        let (latency, wallet_issue, network_issue) = tokio::join!(
            self.probe_latency(),
            self.probe_wallet(&address),
            self.probe_network(),
        );

        let (latency_ms, latency_issue) = latency;
        let mut issues = Vec::new();
        if let Some(issue) = latency_issue {
            issues.push(issue);
        }
        if let Some(issue) = wallet_issue {
            issues.push(issue);
        }
        if let Some(issue) = network_issue {
            issues.push(issue);
        }
        (latency_ms, issues)
    }

    /// Round-trip measurement against a lightweight provider call.
    async fn probe_latency(&self) -> (u64, Option<String>) {
        let timeout_ms = self.config.probe_timeout.as_millis() as u64;
        let started = tokio::time::Instant::now();
        let outcome = tokio::time::timeout(
            self.config.probe_timeout,
            self.provider.request(rpc::ETH_CHAIN_ID, json!([])),
        )
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Err(_) => (elapsed_ms, Some(format!("Latency probe timed out after {timeout_ms}ms"))),
            Ok(Err(err)) => (elapsed_ms, Some(format!("Latency probe failed: {}", err.message))),
            Ok(Ok(_)) if elapsed_ms > self.config.max_latency_ms => {
                (elapsed_ms, Some(format!("High network latency: {elapsed_ms}ms")))
            }
            Ok(Ok(_)) => (elapsed_ms, None),
        }
    }

    /// The wallet must answer an accounts query with the connected address.
    async fn probe_wallet(&self, address: &str) -> Option<String> {
        let timeout_ms = self.config.probe_timeout.as_millis() as u64;
        let outcome = tokio::time::timeout(
            self.config.probe_timeout,
            self.provider.request(rpc::ETH_ACCOUNTS, json!([])),
        )
        .await;
        match outcome {
            Err(_) => Some(format!("Wallet check timed out after {timeout_ms}ms")),
            Ok(Err(err)) => Some(format!("Wallet unresponsive: {}", err.message)),
            Ok(Ok(value)) => {
                let first = value.as_array().and_then(|a| a.first()).and_then(|v| v.as_str());
                match first {
                    Some(account) if account.eq_ignore_ascii_case(address) => None,
                    Some(_) => Some("Wallet account mismatch".to_string()),
                    None => Some("Wallet reports no accounts".to_string()),
                }
            }
        }
    }

    async fn probe_network(&self) -> Option<String> {
        let timeout_ms = self.config.probe_timeout.as_millis() as u64;
        let outcome = tokio::time::timeout(
            self.config.probe_timeout,
            self.provider.request(rpc::ETH_BLOCK_NUMBER, json!([])),
        )
        .await;
        match outcome {
            Err(_) => Some(format!("Network check timed out after {timeout_ms}ms")),
            Ok(Err(err)) => Some(format!("Network unresponsive: {}", err.message)),
            Ok(Ok(_)) => None,
        }
    }

    /// Kick off one delayed reconnect chain. Subsequent unhealthy checks
    /// while a chain is pending are no-ops; the chain itself walks the
    /// attempt counter until success or exhaustion.
    fn schedule_reconnect(inner: &Arc<Self>) {
        if inner.link().is_none() {
            tracing::debug!("no controller link, skipping auto-reconnect");
            return;
        }
        if inner.reconnect_attempts.load(Ordering::Acquire) >= inner.config.max_reconnect_attempts {
            tracing::debug!("auto-reconnect attempts exhausted, not scheduling");
            return;
        }
        if inner.reconnect_pending.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut rx = inner.subscribe_shutdown();
        let inner = inner.clone();
        tokio::spawn(async move {
            loop {
                if inner.wait_or_shutdown(&mut rx).await {
                    break;
                }
                let Some(link) = inner.link() else { break };
                if !inner.take_reconnect_slot() {
                    tracing::warn!("auto-reconnect attempts exhausted, giving up");
                    link.connection_lost().await;
                    break;
                }
                let attempt = inner.reconnect_attempts.load(Ordering::Acquire);
                tracing::info!(attempt, "attempting auto-reconnect");
                if link.reconnect().await {
                    inner.reconnect_attempts.store(0, Ordering::Release);
                    break;
                }
            }
            inner.reconnect_pending.store(false, Ordering::Release);
        });
    }

    /// Sleep for the reconnect delay, returning true if shut down first.
    async fn wait_or_shutdown(&self, rx: &mut Option<broadcast::Receiver<()>>) -> bool {
        match rx {
            Some(rx) => tokio::select! {
                _ = rx.recv() => true,
                _ = tokio::time::sleep(self.config.reconnect_delay) => false,
            },
            None => {
                tokio::time::sleep(self.config.reconnect_delay).await;
                false
            }
        }
    }

    fn take_reconnect_slot(&self) -> bool {
        self.reconnect_attempts
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.config.max_reconnect_attempts).then_some(n + 1)
            })
            .is_ok()
    }

    /// Last-resort guard: clear an in-flight flag stuck past the safety
    /// deadline so a misbehaving provider can never disable monitoring.
    fn sweep_stuck_flag(&self) {
        if !self.in_flight.load(Ordering::Acquire) {
            return;
        }
        let started = self.check_started_ms.load(Ordering::Acquire);
        if started == 0 {
            return;
        }
        let elapsed = Utc::now().timestamp_millis().saturating_sub(started);
        if elapsed > self.config.safety_timeout.as_millis() as i64 {
            tracing::warn!(elapsed_ms = elapsed, "in-flight flag stuck, force-clearing");
            self.in_flight.store(false, Ordering::Release);
            self.check_started_ms.store(0, Ordering::Release);
        }
    }

    fn reset_disconnected(&self) {
        self.store_snapshot(HealthSnapshot::disconnected());
        self.error_count.store(0, Ordering::Release);
        self.reconnect_attempts.store(0, Ordering::Release);
    }

    fn link(&self) -> Option<Arc<dyn ControllerLink>> {
        let guard = self.link.lock().unwrap_or_else(|p| p.into_inner());
        guard.as_ref().and_then(Weak::upgrade)
    }

    fn read_snapshot(&self) -> HealthSnapshot {
        self.snapshot.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn store_snapshot(&self, snapshot: HealthSnapshot) {
        *self.snapshot.write().unwrap_or_else(|p| p.into_inner()) = snapshot;
    }

    fn take_shutdown(&self) -> Option<Shutdown> {
        self.shutdown.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    fn store_shutdown(&self, shutdown: Shutdown) {
        *self.shutdown.lock().unwrap_or_else(|p| p.into_inner()) = Some(shutdown);
    }

    fn subscribe_shutdown(&self) -> Option<broadcast::Receiver<()>> {
        self.shutdown
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(Shutdown::subscribe)
    }
}
