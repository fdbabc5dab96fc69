//! Walletguard: wallet connection lifecycle with bounded retries, periodic
//! health monitoring, and chain negotiation.
//!
//! # Architecture
//!
//! ```text
//! ConnectionController (entry point, owns ConnectionState)
//!   │
//!   ├── RetryPolicy        (per-wallet bounded attempt counter)
//!   ├── NetworkNegotiator  (switch chain, register-then-retry fallback)
//!   ├── HealthMonitor      (interval probes, gated auto-reconnect)
//!   │     └── Shutdown token owns loop teardown
//!   │
//!   ├── WalletProvider     (trait: extension bridge, remote signer, ...)
//!   ├── PersistenceGateway (trait: key/value session storage)
//!   └── NotificationSink   (trait: user-facing messages)
//! ```
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `connect(wallet_id)` | Establish a session, gated by the retry cap |
//! | `disconnect()` | Tear down; local cleanup always wins |
//! | `retry_connection()` | Re-connect with the last known wallet |
//! | `reconnect()` | One immediate reconnect attempt |
//! | `restore_session()` | Resume a persisted session younger than 24h |
//! | `switch_network(chain_id)` | Move chains, registering unknown ones |
//! | `check_health()` | Run the three-probe health check now |
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use walletguard::{ConnectionController, JsonFileGateway};
//!
//! let provider = Arc::new(MyProviderAdapter::new());
//! let persist = Arc::new(JsonFileGateway::open("myapp")?);
//! let controller = ConnectionController::with_defaults(provider, persist)?;
//!
//! let state = controller.connect("metaMask").await?;
//! controller.switch_network(56).await?;
//! let health = controller.check_health().await;
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod negotiator;
pub mod notify;
pub mod persist;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod runtime;
pub mod state;

pub use config::GuardConfig;
pub use controller::ConnectionController;
pub use error::{codes, Error, ProviderError, Result};
pub use monitor::{ControllerLink, HealthMonitor};
pub use negotiator::{NetworkNegotiator, NetworkStatus};
pub use notify::{NotificationSink, TracingSink};
pub use persist::{keys, JsonFileGateway, MemoryGateway, PersistenceGateway};
pub use provider::{rpc, AccountInfo, ConnectorInfo, WalletProvider};
pub use registry::{
    NativeCurrency, NetworkDescriptor, NetworkRegistry, WalletDescriptor, WalletRegistry,
};
pub use retry::{RetryPolicy, RetryRecord};
pub use runtime::Shutdown;
pub use state::{
    ConnectionState, ConnectionStatus, HealthSnapshot, HealthStatus, HealthSummary,
};
