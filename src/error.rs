//! Error taxonomy for connection, negotiation, and monitoring failures.
//!
//! Every command on the public surface returns `Result<T, Error>`. The split
//! matters to callers: `RetriesExhausted` is terminal for a wallet id until a
//! success or explicit reset, while a plain `Provider` failure is retryable.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Classified failure returned by controller, negotiator, and gateway calls.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Wallet-specific rejection surfaced by the provider.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Chain switch/register failure or unsupported chain.
    #[error("network error on chain {chain_id}: {reason}")]
    Network { chain_id: u64, reason: String },

    /// A probe, check, or connect attempt exceeded its deadline.
    #[error("{what} timed out after {ms}ms")]
    Timeout { what: &'static str, ms: u64 },

    /// Persistence read/write failure (quota, unavailable storage).
    #[error("storage error: {0}")]
    Storage(String),

    /// Malformed input or a contract violation by the caller.
    #[error("validation error: {0}")]
    Validation(String),

    /// The per-wallet attempt cap was hit. Terminal until a success or an
    /// explicit reset; reported distinctly so the UI can disable the button.
    #[error("connection attempts exhausted for {wallet_id} ({attempts} attempts)")]
    RetriesExhausted { wallet_id: String, attempts: u32 },

    /// Another connect attempt is already in flight (system-wide).
    #[error("a connection attempt is already in flight")]
    AttemptInFlight,

    /// The command requires an active connection.
    #[error("no wallet connected")]
    NotConnected,
}

impl Error {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Terminal errors must not trigger another attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. } | Self::Validation(_))
    }
}

/// Well-known provider rejection codes (EIP-1193 / JSON-RPC).
pub mod codes {
    /// User dismissed the wallet pop-up.
    pub const USER_REJECTED: i64 = 4001;
    /// Provider has not authorized the requested method.
    pub const UNAUTHORIZED: i64 = 4100;
    /// Provider does not support the requested method.
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    /// Provider is disconnected from all chains.
    pub const DISCONNECTED: i64 = 4900;
    /// Provider is connected but not to the requested chain.
    pub const CHAIN_DISCONNECTED: i64 = 4901;
    /// Chain id is unknown to the provider; register-then-retry applies.
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    /// A matching request is already pending user approval.
    pub const REQUEST_PENDING: i64 = -32002;
    /// Method not found on the provider.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Generic internal provider error.
    pub const INTERNAL: i64 = -32603;
}

/// A rejection from the wallet provider: numeric code plus message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("provider error {code}: {message}")]
pub struct ProviderError {
    pub code: i64,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// User dismissed the approval pop-up.
    pub fn is_user_rejection(&self) -> bool {
        self.code == codes::USER_REJECTED
    }

    /// An identical request is already awaiting approval. Low severity:
    /// logged, never counted against the retry cap.
    pub fn is_pending_request(&self) -> bool {
        self.code == codes::REQUEST_PENDING
    }

    /// The provider does not know the chain; only this condition justifies
    /// a register-chain fallback.
    pub fn is_unrecognized_chain(&self) -> bool {
        self.code == codes::UNRECOGNIZED_CHAIN
    }

    /// Provider claims a session already exists. Treated as state resync,
    /// not failure, so adapter/provider drift cannot cause retry loops.
    pub fn is_already_connected(&self) -> bool {
        self.message.to_ascii_lowercase().contains("already connected")
    }
}
