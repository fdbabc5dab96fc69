//! Wallet provider capability interface.
//!
//! The wire protocol stays a black box: beyond the connect/disconnect
//! lifecycle, everything goes through `request(method, params)` with
//! JSON-RPC-shaped values. Implementations adapt a concrete provider
//! (extension bridge, remote signer relay) to this trait.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::ProviderError;

/// Provider methods the core relies on.
pub mod rpc {
    pub const ETH_ACCOUNTS: &str = "eth_accounts";
    pub const ETH_BLOCK_NUMBER: &str = "eth_blockNumber";
    pub const ETH_CHAIN_ID: &str = "eth_chainId";
    pub const WALLET_SWITCH_CHAIN: &str = "wallet_switchEthereumChain";
    pub const WALLET_ADD_CHAIN: &str = "wallet_addEthereumChain";
}

/// Active account as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub address: String,
    pub chain_id: u64,
}

/// One connector advertised by the provider.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectorInfo {
    pub id: String,
    pub name: String,
    /// Whether the integration is usable right now (extension present,
    /// relay reachable).
    pub ready: bool,
}

/// Capability interface every provider adapter must satisfy.
///
/// Validated once at controller construction; a non-conforming provider is
/// rejected there instead of failing later inside a hot path.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Establish a session through the given connector.
    async fn connect(&self, connector_id: &str) -> Result<AccountInfo, ProviderError>;

    /// Tear down the provider-side session.
    async fn disconnect(&self) -> Result<(), ProviderError>;

    /// Current account, if a session exists.
    async fn get_account(&self) -> Result<Option<AccountInfo>, ProviderError>;

    /// Whether the provider believes a session is active.
    async fn is_connected(&self) -> bool;

    /// Connectors this provider can drive.
    fn connectors(&self) -> Vec<ConnectorInfo>;

    /// Raw method call. Used for account, block-number, and chain-id queries
    /// plus switch-chain and register-chain.
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;
}

/// Parse a 0x-prefixed or decimal chain id value returned by a provider.
pub fn parse_chain_id(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => {
            if let Some(hex) = s.strip_prefix("0x") {
                u64::from_str_radix(hex, 16).ok()
            } else {
                s.parse().ok()
            }
        }
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}
