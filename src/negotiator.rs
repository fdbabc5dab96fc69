//! Network negotiation - switch the active chain, registering it first when
//! the provider does not know it.
//!
//! The register fallback runs only for the distinct unrecognized-chain
//! rejection, and the switch is retried exactly once afterwards. Any other
//! switch failure surfaces as-is: registering on every error would mask real
//! failures.

use std::sync::Arc;

use serde_json::json;

use crate::error::{Error, Result};
use crate::provider::{rpc, WalletProvider};
use crate::registry::{NetworkDescriptor, NetworkRegistry};

/// Support/activity status of one chain, for UI display.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NetworkStatus {
    pub is_supported: bool,
    pub name: Option<String>,
    /// "active", "available", or "unsupported".
    pub status: &'static str,
}

pub struct NetworkNegotiator {
    provider: Arc<dyn WalletProvider>,
    networks: Arc<NetworkRegistry>,
}

impl NetworkNegotiator {
    pub fn new(provider: Arc<dyn WalletProvider>, networks: Arc<NetworkRegistry>) -> Self {
        Self { provider, networks }
    }

    /// Move the provider to `chain_id`. `current` is the chain the owning
    /// controller believes is active; switching to it is a no-op success.
    pub async fn switch_network(&self, chain_id: u64, current: Option<u64>) -> Result<()> {
        let descriptor = self
            .networks
            .get(chain_id)
            .ok_or_else(|| Error::validation(format!("unsupported chain id {chain_id}")))?;

        if current == Some(chain_id) {
            tracing::debug!(chain_id, "already on requested chain");
            return Ok(());
        }

        match self.request_switch(descriptor).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_unrecognized_chain() => {
                tracing::info!(chain_id, network = %descriptor.name, "chain unknown to provider, registering");
                self.register_chain(descriptor).await?;
                // Exactly one retry after a successful registration.
                self.request_switch(descriptor).await.map_err(|err| Error::Network {
                    chain_id,
                    reason: format!("switch failed after registering chain: {}", err.message),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Pure membership check against the registry; the provider is not touched.
    pub fn validate_network(&self, chain_id: u64) -> bool {
        self.networks.contains(chain_id)
    }

    pub fn status(&self, chain_id: u64, current: Option<u64>) -> NetworkStatus {
        match self.networks.get(chain_id) {
            Some(descriptor) => NetworkStatus {
                is_supported: true,
                name: Some(descriptor.name.clone()),
                status: if current == Some(chain_id) { "active" } else { "available" },
            },
            None => NetworkStatus { is_supported: false, name: None, status: "unsupported" },
        }
    }

    async fn request_switch(&self, descriptor: &NetworkDescriptor) -> std::result::Result<(), crate::error::ProviderError> {
        self.provider
            .request(rpc::WALLET_SWITCH_CHAIN, json!([{ "chainId": descriptor.chain_id_hex() }]))
            .await
            .map(|_| ())
    }

    async fn register_chain(&self, descriptor: &NetworkDescriptor) -> Result<()> {
        self.provider
            .request(rpc::WALLET_ADD_CHAIN, json!([descriptor.register_params()]))
            .await
            .map(|_| ())
            .map_err(|err| Error::Network {
                chain_id: descriptor.chain_id,
                reason: format!("register chain failed: {}", err.message),
            })
    }
}
