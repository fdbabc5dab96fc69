//! Wallet and network catalogs.
//!
//! Registries are explicit objects constructed once and passed by `Arc` into
//! the controller and negotiator - no module-level globals. Descriptors are
//! immutable and registry-owned; lookups hand out references.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{codes, ProviderError};
use crate::provider::ConnectorInfo;

/// Native currency of a chain, as registered with the provider.
#[derive(Debug, Clone, Serialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl NativeCurrency {
    pub fn new(name: &str, symbol: &str, decimals: u8) -> Self {
        Self { name: name.into(), symbol: symbol.into(), decimals }
    }
}

/// One supported blockchain network.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkDescriptor {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub native_currency: NativeCurrency,
    pub block_explorer_url: String,
    pub is_testnet: bool,
}

impl NetworkDescriptor {
    /// Chain id in the 0x-prefixed hex form providers expect.
    pub fn chain_id_hex(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }

    /// Parameter object for the provider's register-chain call, built from
    /// this descriptor.
    pub fn register_params(&self) -> Value {
        json!({
            "chainId": self.chain_id_hex(),
            "chainName": self.name,
            "rpcUrls": [self.rpc_url],
            "nativeCurrency": {
                "name": self.native_currency.name,
                "symbol": self.native_currency.symbol,
                "decimals": self.native_currency.decimals,
            },
            "blockExplorerUrls": [self.block_explorer_url],
        })
    }
}

/// Read-only catalog of supported networks.
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    networks: Vec<NetworkDescriptor>,
}

impl NetworkRegistry {
    pub fn new(networks: Vec<NetworkDescriptor>) -> Self {
        Self { networks }
    }

    /// Mainnets plus the Sepolia testnet.
    pub fn with_defaults() -> Self {
        Self::new(vec![
            NetworkDescriptor {
                chain_id: 1,
                name: "Ethereum".into(),
                rpc_url: "https://eth.llamarpc.com".into(),
                native_currency: NativeCurrency::new("Ether", "ETH", 18),
                block_explorer_url: "https://etherscan.io".into(),
                is_testnet: false,
            },
            NetworkDescriptor {
                chain_id: 56,
                name: "BSC".into(),
                rpc_url: "https://bsc-dataseed.binance.org".into(),
                native_currency: NativeCurrency::new("BNB", "BNB", 18),
                block_explorer_url: "https://bscscan.com".into(),
                is_testnet: false,
            },
            NetworkDescriptor {
                chain_id: 137,
                name: "Polygon".into(),
                rpc_url: "https://polygon-rpc.com".into(),
                native_currency: NativeCurrency::new("POL", "POL", 18),
                block_explorer_url: "https://polygonscan.com".into(),
                is_testnet: false,
            },
            NetworkDescriptor {
                chain_id: 42161,
                name: "Arbitrum One".into(),
                rpc_url: "https://arb1.arbitrum.io/rpc".into(),
                native_currency: NativeCurrency::new("Ether", "ETH", 18),
                block_explorer_url: "https://arbiscan.io".into(),
                is_testnet: false,
            },
            NetworkDescriptor {
                chain_id: 11155111,
                name: "Sepolia".into(),
                rpc_url: "https://rpc.sepolia.org".into(),
                native_currency: NativeCurrency::new("Sepolia Ether", "ETH", 18),
                block_explorer_url: "https://sepolia.etherscan.io".into(),
                is_testnet: true,
            },
        ])
    }

    pub fn get(&self, chain_id: u64) -> Option<&NetworkDescriptor> {
        self.networks.iter().find(|n| n.chain_id == chain_id)
    }

    pub fn contains(&self, chain_id: u64) -> bool {
        self.get(chain_id).is_some()
    }

    pub fn all(&self) -> &[NetworkDescriptor] {
        &self.networks
    }

    pub fn mainnets(&self) -> impl Iterator<Item = &NetworkDescriptor> {
        self.networks.iter().filter(|n| !n.is_testnet)
    }
}

/// One supported wallet integration.
#[derive(Debug, Clone)]
pub struct WalletDescriptor {
    pub id: String,
    pub name: String,
    pub installation_url: String,
    /// Per-wallet overrides for provider rejection codes.
    messages: HashMap<i64, String>,
}

impl WalletDescriptor {
    pub fn new(id: &str, name: &str, installation_url: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            installation_url: installation_url.into(),
            messages: HashMap::new(),
        }
    }

    pub fn with_message(mut self, code: i64, message: &str) -> Self {
        self.messages.insert(code, message.into());
        self
    }

    /// User-facing message for a provider rejection: the wallet-specific
    /// mapping when one exists, otherwise a generic fallback per code.
    pub fn error_message_for(&self, err: &ProviderError) -> String {
        if let Some(message) = self.messages.get(&err.code) {
            return message.clone();
        }
        match err.code {
            codes::USER_REJECTED => format!("Connection to {} was declined", self.name),
            codes::REQUEST_PENDING => {
                format!("A {} request is already pending - check your wallet", self.name)
            }
            codes::UNAUTHORIZED => format!("{} has not authorized this site", self.name),
            codes::UNSUPPORTED_METHOD => format!("{} does not support this operation", self.name),
            codes::DISCONNECTED | codes::CHAIN_DISCONNECTED => {
                format!("{} is not connected to the network", self.name)
            }
            codes::METHOD_NOT_FOUND => format!("{} rejected an unknown method", self.name),
            _ => format!("{} error: {}", self.name, err.message),
        }
    }

    /// Installed means the provider advertises a ready connector for this id.
    pub fn is_installed(&self, connectors: &[ConnectorInfo]) -> bool {
        connectors.iter().any(|c| c.id == self.id && c.ready)
    }
}

/// Read-only catalog of supported wallets.
#[derive(Debug, Clone, Default)]
pub struct WalletRegistry {
    wallets: Vec<WalletDescriptor>,
}

impl WalletRegistry {
    pub fn new(wallets: Vec<WalletDescriptor>) -> Self {
        Self { wallets }
    }

    pub fn with_defaults() -> Self {
        Self::new(vec![
            WalletDescriptor::new("metaMask", "MetaMask", "https://metamask.io/download/")
                .with_message(
                    codes::USER_REJECTED,
                    "MetaMask connection was declined - approve the request to connect",
                ),
            WalletDescriptor::new("walletConnect", "WalletConnect", "https://walletconnect.network/"),
            WalletDescriptor::new(
                "coinbaseWallet",
                "Coinbase Wallet",
                "https://www.coinbase.com/wallet/downloads",
            ),
        ])
    }

    pub fn get(&self, id: &str) -> Option<&WalletDescriptor> {
        self.wallets.iter().find(|w| w.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn all(&self) -> &[WalletDescriptor] {
        &self.wallets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_networks_cover_known_chains() {
        let registry = NetworkRegistry::with_defaults();
        assert!(registry.contains(1));
        assert!(registry.contains(56));
        assert!(!registry.contains(999_999));
        assert_eq!(registry.get(56).unwrap().name, "BSC");
        assert!(registry.get(11155111).unwrap().is_testnet);
    }

    #[test]
    fn chain_id_hex_form() {
        let registry = NetworkRegistry::with_defaults();
        assert_eq!(registry.get(56).unwrap().chain_id_hex(), "0x38");
        assert_eq!(registry.get(1).unwrap().chain_id_hex(), "0x1");
    }

    #[test]
    fn register_params_carry_descriptor_fields() {
        let registry = NetworkRegistry::with_defaults();
        let params = registry.get(56).unwrap().register_params();
        assert_eq!(params["chainId"], "0x38");
        assert_eq!(params["chainName"], "BSC");
        assert_eq!(params["nativeCurrency"]["symbol"], "BNB");
        assert_eq!(params["rpcUrls"][0], "https://bsc-dataseed.binance.org");
    }

    #[test]
    fn wallet_message_override_and_fallback() {
        let registry = WalletRegistry::with_defaults();
        let metamask = registry.get("metaMask").unwrap();

        let rejected = ProviderError::new(codes::USER_REJECTED, "user rejected");
        assert!(metamask.error_message_for(&rejected).contains("approve the request"));

        let pending = ProviderError::new(codes::REQUEST_PENDING, "pending");
        assert!(metamask.error_message_for(&pending).contains("already pending"));

        let odd = ProviderError::new(-1, "socket closed");
        assert!(metamask.error_message_for(&odd).contains("socket closed"));
    }

    #[test]
    fn installed_requires_ready_connector() {
        let registry = WalletRegistry::with_defaults();
        let metamask = registry.get("metaMask").unwrap();
        let connectors = vec![
            ConnectorInfo { id: "metaMask".into(), name: "MetaMask".into(), ready: false },
        ];
        assert!(!metamask.is_installed(&connectors));
        let connectors = vec![
            ConnectorInfo { id: "metaMask".into(), name: "MetaMask".into(), ready: true },
        ];
        assert!(metamask.is_installed(&connectors));
    }
}
