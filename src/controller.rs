//! Connection controller - the top-level orchestrator.
//!
//! Owns the canonical `ConnectionState` and composes the retry policy,
//! negotiator, persistence gateway, and health monitor lifecycle. All
//! mutation of the state goes through here; every other component reads
//! copies.
//!
//! # State machine
//!
//! ```text
//! Disconnected --connect(id)--> Connecting --success--> Connected
//!      ▲                            │failure                │
//!      └────────────────────────────┘                       │disconnect()
//!      ▲                                                    ▼
//!      │            Connected --unhealthy+auto--> Reconnecting
//!      │                 ▲                            │
//!      │                 └──────────success───────────┘
//!      └──────────exhausted (connection lost)─────────┘
//! ```
//!
//! Ordering guarantees: at most one connect attempt in flight system-wide,
//! and a disconnect always wins - it bumps the session epoch, so an
//! in-flight attempt finds its result stale and discards it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::GuardConfig;
use crate::error::{Error, Result};
use crate::monitor::{ControllerLink, HealthMonitor};
use crate::negotiator::{NetworkNegotiator, NetworkStatus};
use crate::notify::NotificationSink;
use crate::persist::{keys, PersistenceGateway};
use crate::provider::{AccountInfo, ConnectorInfo, WalletProvider};
use crate::registry::{NetworkRegistry, WalletDescriptor, WalletRegistry};
use crate::retry::RetryPolicy;
use crate::state::{ConnectionState, ConnectionStatus, HealthSnapshot, HealthSummary};

/// Top-level facade handed to the UI layer. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    provider: Arc<dyn WalletProvider>,
    persist: Arc<dyn PersistenceGateway>,
    notify: Arc<dyn NotificationSink>,
    wallets: Arc<WalletRegistry>,
    networks: Arc<NetworkRegistry>,
    config: GuardConfig,
    state: Arc<tokio::sync::RwLock<ConnectionState>>,
    retry: RetryPolicy,
    negotiator: NetworkNegotiator,
    monitor: HealthMonitor,
    connect_in_flight: AtomicBool,
    /// Session epoch, bumped on every disconnect. In-flight operations
    /// capture it at start and discard their result when it moved.
    epoch: AtomicU64,
}

/// Clears the single-flight flag on every exit path.
struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ConnectionController {
    /// Build a controller over the given collaborators. The provider's
    /// capability surface is validated here, once, so a non-conforming
    /// adapter fails construction instead of a hot path.
    pub fn new(
        provider: Arc<dyn WalletProvider>,
        persist: Arc<dyn PersistenceGateway>,
        notify: Arc<dyn NotificationSink>,
        wallets: WalletRegistry,
        networks: NetworkRegistry,
        config: GuardConfig,
    ) -> Result<Self> {
        config.validate()?;
        if provider.connectors().is_empty() {
            return Err(Error::validation("provider advertises no connectors"));
        }

        let networks = Arc::new(networks);
        let state = Arc::new(tokio::sync::RwLock::new(ConnectionState::disconnected()));
        let monitor =
            HealthMonitor::new(provider.clone(), notify.clone(), config.clone(), state.clone());
        let negotiator = NetworkNegotiator::new(provider.clone(), networks.clone());

        let inner = Arc::new(ControllerInner {
            retry: RetryPolicy::new(config.max_connect_attempts),
            provider,
            persist,
            notify,
            wallets: Arc::new(wallets),
            networks,
            config,
            state,
            negotiator,
            monitor,
            connect_in_flight: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        });

        let link: Arc<dyn ControllerLink> = inner.clone();
        inner.monitor.set_link(Arc::downgrade(&link));

        Ok(Self { inner })
    }

    /// Default registries, tracing-backed notifications, default config.
    pub fn with_defaults(
        provider: Arc<dyn WalletProvider>,
        persist: Arc<dyn PersistenceGateway>,
    ) -> Result<Self> {
        Self::new(
            provider,
            persist,
            Arc::new(crate::notify::TracingSink),
            WalletRegistry::with_defaults(),
            NetworkRegistry::with_defaults(),
            GuardConfig::default(),
        )
    }

    /// Connect to the wallet identified by `wallet_id`.
    ///
    /// Idempotent when already connected to the same wallet; rejects while
    /// another attempt is in flight; terminal once the retry cap is hit.
    pub async fn connect(&self, wallet_id: &str) -> Result<ConnectionState> {
        self.inner.connect(wallet_id).await
    }

    /// Tear down the connection. Always succeeds locally: state and
    /// persisted keys are cleared even when the provider call fails.
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.disconnect().await
    }

    /// Re-invoke `connect` with the last known wallet id. `Ok(None)` when
    /// there is nothing to retry.
    pub async fn retry_connection(&self) -> Result<Option<ConnectionState>> {
        let last = { self.inner.state.read().await.wallet_id.clone() };
        let last = match last {
            Some(id) => Some(id),
            None => self.inner.persist.get(keys::LAST_WALLET_ID).await.unwrap_or(None),
        };
        match last {
            None => Ok(None),
            Some(id) => self.inner.connect(&id).await.map(Some),
        }
    }

    /// One immediate reconnect attempt over the current wallet.
    pub async fn reconnect(&self) -> Result<ConnectionState> {
        self.inner.attempt_reconnect().await
    }

    /// Resume a persisted session if it is younger than
    /// `max_connection_age`. One attempt only - this path must never loop
    /// pop-ups at the user; a failure clears the stale timestamp.
    pub async fn restore_session(&self) -> Result<Option<ConnectionState>> {
        let inner = &self.inner;
        let Some(wallet_id) = inner.persist.get(keys::LAST_WALLET_ID).await? else {
            return Ok(None);
        };
        let Some(started_raw) = inner.persist.get(keys::CONNECTION_START).await? else {
            return Ok(None);
        };

        let started = DateTime::parse_from_rfc3339(&started_raw)
            .map(|t| t.with_timezone(&Utc))
            .ok();
        let fresh = started
            .map(|t| {
                let age_ms = (Utc::now() - t).num_milliseconds();
                age_ms >= 0 && (age_ms as u128) < inner.config.max_connection_age.as_millis()
            })
            .unwrap_or(false);
        if !fresh {
            tracing::info!(wallet_id = %wallet_id, "persisted session too old, not resuming");
            let _ = inner.persist.remove(keys::CONNECTION_START).await;
            return Ok(None);
        }

        match inner.connect(&wallet_id).await {
            Ok(state) if state.status.is_connected() => Ok(Some(state)),
            Ok(_) => Ok(None),
            Err(err) => {
                tracing::info!(wallet_id = %wallet_id, error = %err, "session resume failed, clearing stale timestamp");
                let _ = inner.persist.remove(keys::CONNECTION_START).await;
                Ok(None)
            }
        }
    }

    /// Switch the active chain, registering it with the provider first if
    /// unknown. Requires an active connection.
    pub async fn switch_network(&self, chain_id: u64) -> Result<()> {
        let inner = &self.inner;
        let current = {
            let state = inner.state.read().await;
            if !state.status.is_connected() {
                return Err(Error::NotConnected);
            }
            state.chain_id
        };

        if let Err(err) = inner.negotiator.switch_network(chain_id, current).await {
            inner.notify.error(&err.to_string());
            return Err(err);
        }

        {
            let mut state = inner.state.write().await;
            state.chain_id = Some(chain_id);
            state.last_activity_at = Some(Utc::now());
        }
        let name = inner
            .networks
            .get(chain_id)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| chain_id.to_string());
        inner.notify.success(&format!("Switched to {name}"));
        Ok(())
    }

    /// Membership check against the network catalog; the provider is not
    /// touched.
    pub fn validate_network(&self, chain_id: u64) -> bool {
        self.inner.negotiator.validate_network(chain_id)
    }

    pub async fn network_status(&self, chain_id: u64) -> NetworkStatus {
        let current = self.inner.state.read().await.chain_id;
        self.inner.negotiator.status(chain_id, current)
    }

    /// Run a health check now (no-op if one is already in flight).
    pub async fn check_health(&self) -> HealthSnapshot {
        self.inner.monitor.check_now().await
    }

    pub fn health(&self) -> HealthSnapshot {
        self.inner.monitor.snapshot()
    }

    pub async fn health_summary(&self) -> HealthSummary {
        self.inner.monitor.summary().await
    }

    /// Copy of the canonical connection state.
    pub async fn connection(&self) -> ConnectionState {
        self.inner.state.read().await.clone()
    }

    /// Connectors the provider can drive, for wallet pickers.
    pub fn connectors(&self) -> Vec<ConnectorInfo> {
        self.inner.provider.connectors()
    }

    /// Explicit external reset of the attempt counter for one wallet.
    pub fn reset_retries(&self, wallet_id: &str) {
        self.inner.retry.reset(wallet_id);
    }

    pub fn retries_remaining(&self, wallet_id: &str) -> u32 {
        self.inner.retry.remaining(wallet_id)
    }

    /// Opaque user-preference blob, persisted alongside the session keys.
    pub async fn preferences(&self) -> Result<Option<Value>> {
        match self.inner.persist.get(keys::PREFERENCES).await? {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(Error::storage),
        }
    }

    pub async fn set_preferences(&self, preferences: &Value) -> Result<()> {
        let raw = serde_json::to_string(preferences).map_err(Error::storage)?;
        self.inner.persist.set(keys::PREFERENCES, &raw).await
    }
}

impl ControllerInner {
    async fn connect(&self, wallet_id: &str) -> Result<ConnectionState> {
        let descriptor = self
            .wallets
            .get(wallet_id)
            .cloned()
            .ok_or_else(|| Error::validation(format!("unknown wallet id {wallet_id}")))?;

        {
            let state = self.state.read().await;
            if state.status.is_connected() && state.wallet_id.as_deref() == Some(wallet_id) {
                tracing::debug!(wallet_id, "already connected, short-circuiting");
                return Ok(state.clone());
            }
            if state.status == ConnectionStatus::Connecting {
                return Err(Error::AttemptInFlight);
            }
        }

        if !self.retry.can_attempt(wallet_id) {
            return Err(Error::RetriesExhausted {
                wallet_id: wallet_id.to_string(),
                attempts: self.retry.attempts(wallet_id),
            });
        }

        // One attempt in flight system-wide, not just per wallet.
        if self
            .connect_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AttemptInFlight);
        }
        let _guard = FlagGuard(&self.connect_in_flight);
        let epoch = self.epoch.load(Ordering::Acquire);

        {
            let mut state = self.state.write().await;
            state.status = ConnectionStatus::Connecting;
            state.wallet_id = Some(wallet_id.to_string());
            state.error = None;
        }
        tracing::info!(wallet_id, "connecting");

        let attempt = tokio::time::timeout(
            self.config.connect_timeout,
            self.provider.connect(wallet_id),
        )
        .await;

        let result: Result<AccountInfo> = match attempt {
            Err(_) => Err(Error::Timeout {
                what: "connect attempt",
                ms: self.config.connect_timeout.as_millis() as u64,
            }),
            Ok(Ok(account)) => Ok(account),
            Ok(Err(err)) if err.is_already_connected() => {
                // Adapter/provider drift: a session already exists. Resync
                // instead of failing, or retries would loop forever.
                tracing::info!(wallet_id, "provider reports existing session, resyncing");
                match self.provider.get_account().await {
                    Ok(Some(account)) => Ok(account),
                    _ => Err(err.into()),
                }
            }
            Ok(Err(err)) if err.is_pending_request() => {
                // Low severity: the wallet is already showing an approval
                // pop-up. Log, tell the user, and do not count an attempt.
                tracing::info!(wallet_id, "connect request already pending in wallet");
                self.notify.info(&descriptor.error_message_for(&err));
                let mut state = self.state.write().await;
                state.status = ConnectionStatus::Disconnected;
                return Ok(state.clone());
            }
            Ok(Err(err)) => Err(err.into()),
        };

        if self.epoch.load(Ordering::Acquire) != epoch {
            tracing::info!(wallet_id, "connect result discarded after disconnect");
            return Err(Error::NotConnected);
        }

        match result {
            Ok(account) => self.finish_connect(&descriptor, account, false).await,
            Err(err) => {
                let attempts = self.retry.record_failure(wallet_id);
                let message = match &err {
                    Error::Provider(provider_err) => descriptor.error_message_for(provider_err),
                    other => other.to_string(),
                };
                tracing::warn!(wallet_id, attempts, error = %err, "connect attempt failed");
                {
                    let mut state = self.state.write().await;
                    state.status = ConnectionStatus::Disconnected;
                    state.address = None;
                    state.chain_id = None;
                    state.connected_at = None;
                    state.error = Some(message.clone());
                }
                self.notify.error(&message);
                Err(err)
            }
        }
    }

    async fn finish_connect(
        &self,
        descriptor: &WalletDescriptor,
        account: AccountInfo,
        restored: bool,
    ) -> Result<ConnectionState> {
        let now = Utc::now();
        let snapshot = {
            let mut state = self.state.write().await;
            state.status = ConnectionStatus::Connected;
            state.wallet_id = Some(descriptor.id.clone());
            state.address = Some(account.address);
            state.chain_id = Some(account.chain_id);
            state.connected_at = Some(now);
            state.last_activity_at = Some(now);
            state.error = None;
            state.clone()
        };

        self.retry.record_success(&descriptor.id);
        self.persist_session(&snapshot).await;
        self.monitor.start().await;

        if restored {
            self.notify.success("Wallet connection restored");
        } else {
            self.notify.success(&format!("Connected to {}", descriptor.name));
        }
        tracing::info!(
            wallet_id = %descriptor.id,
            address = snapshot.address.as_deref().unwrap_or(""),
            chain_id = snapshot.chain_id.unwrap_or(0),
            "wallet connected"
        );
        Ok(snapshot)
    }

    async fn disconnect(&self) -> Result<()> {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.monitor.stop().await;
        {
            self.state.write().await.reset();
        }
        self.clear_persisted(&[keys::LAST_WALLET_ID, keys::CONNECTION_START, keys::CONNECTION_STATE])
            .await;

        // Local cleanup is already done; a provider failure here must not
        // leave us stuck "connected".
        if let Err(err) = self.provider.disconnect().await {
            tracing::warn!(error = %err, "provider disconnect failed, local state already cleared");
        }

        self.notify.info("Wallet disconnected");
        tracing::info!("wallet disconnected");
        Ok(())
    }

    /// One reconnect attempt over the current wallet. Leaves the state in
    /// `Reconnecting` on failure so a pending auto-reconnect chain can try
    /// again; the chain transitions to lost/disconnected when it gives up.
    async fn attempt_reconnect(&self) -> Result<ConnectionState> {
        let wallet_id = {
            let state = self.state.read().await;
            if state.status == ConnectionStatus::Disconnected {
                return Err(Error::NotConnected);
            }
            state.wallet_id.clone().ok_or(Error::NotConnected)?
        };
        let descriptor = self
            .wallets
            .get(&wallet_id)
            .cloned()
            .ok_or_else(|| Error::validation(format!("unknown wallet id {wallet_id}")))?;

        if self
            .connect_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AttemptInFlight);
        }
        let _guard = FlagGuard(&self.connect_in_flight);
        let epoch = self.epoch.load(Ordering::Acquire);

        {
            let mut state = self.state.write().await;
            state.status = ConnectionStatus::Reconnecting;
            state.error = None;
        }
        tracing::info!(wallet_id = %wallet_id, "reconnecting");

        let attempt = tokio::time::timeout(
            self.config.connect_timeout,
            self.provider.connect(&wallet_id),
        )
        .await;

        if self.epoch.load(Ordering::Acquire) != epoch {
            tracing::info!(wallet_id = %wallet_id, "reconnect result discarded after disconnect");
            return Err(Error::NotConnected);
        }

        match attempt {
            Ok(Ok(account)) => self.finish_connect(&descriptor, account, true).await,
            Ok(Err(err)) => {
                tracing::warn!(wallet_id = %wallet_id, error = %err, "reconnect attempt failed");
                Err(err.into())
            }
            Err(_) => Err(Error::Timeout {
                what: "reconnect attempt",
                ms: self.config.connect_timeout.as_millis() as u64,
            }),
        }
    }

    async fn persist_session(&self, state: &ConnectionState) {
        // Storage failures are logged, never allowed to fail a connect that
        // already succeeded.
        if let Some(wallet_id) = &state.wallet_id {
            if let Err(err) = self.persist.set(keys::LAST_WALLET_ID, wallet_id).await {
                tracing::warn!(error = %err, "failed to persist wallet id");
            }
        }
        if let Some(connected_at) = state.connected_at {
            if let Err(err) =
                self.persist.set(keys::CONNECTION_START, &connected_at.to_rfc3339()).await
            {
                tracing::warn!(error = %err, "failed to persist connection start");
            }
        }
        match serde_json::to_string(state) {
            Ok(blob) => {
                if let Err(err) = self.persist.set(keys::CONNECTION_STATE, &blob).await {
                    tracing::warn!(error = %err, "failed to persist connection state");
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to serialize connection state"),
        }
    }

    async fn clear_persisted(&self, cleared: &[&str]) {
        for key in cleared.iter().copied() {
            if let Err(err) = self.persist.remove(key).await {
                tracing::warn!(key, error = %err, "failed to clear persisted key");
            }
        }
    }
}

#[async_trait]
impl ControllerLink for ControllerInner {
    async fn reconnect(&self) -> bool {
        match self.attempt_reconnect().await {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(error = %err, "auto-reconnect attempt failed");
                false
            }
        }
    }

    async fn connection_lost(&self) {
        tracing::warn!("connection lost after exhausting auto-reconnect attempts");
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.monitor.stop().await;
        {
            self.state.write().await.reset();
        }
        // Keep the last wallet id so the user can reconnect by hand.
        self.clear_persisted(&[keys::CONNECTION_START, keys::CONNECTION_STATE]).await;
        self.notify.error("Wallet connection lost");
    }

    async fn mark_activity(&self) {
        let mut state = self.state.write().await;
        if state.status.is_connected() {
            state.last_activity_at = Some(Utc::now());
        }
    }
}
