//! Persistence gateway - string key/value storage behind a trait.
//!
//! The controller is the only writer; the keys below are its property.
//! Two gateways ship in-crate: an in-memory map for tests and hosts that
//! bring their own storage, and a flat JSON file under the platform data
//! dir for native embedding.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Keys owned by the controller.
pub mod keys {
    pub const LAST_WALLET_ID: &str = "walletguard.last_wallet_id";
    pub const CONNECTION_START: &str = "walletguard.connection_start";
    pub const CONNECTION_STATE: &str = "walletguard.connection_state";
    pub const PREFERENCES: &str = "walletguard.preferences";
}

/// String key/value contract. No business logic lives behind it.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Volatile gateway. Useful in tests and in hosts that persist elsewhere.
#[derive(Default)]
pub struct MemoryGateway {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let map = self.map.lock().unwrap_or_else(|p| p.into_inner());
        Ok(map.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.map.lock().unwrap_or_else(|p| p.into_inner());
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut map = self.map.lock().unwrap_or_else(|p| p.into_inner());
        map.remove(key);
        Ok(())
    }
}

/// Flat-file gateway: one JSON object, rewritten whole on every mutation.
pub struct JsonFileGateway {
    path: PathBuf,
    map: Mutex<HashMap<String, String>>,
}

impl JsonFileGateway {
    /// Open under the platform data dir, e.g. `~/.local/share/<app>/walletguard.json`.
    pub fn open(app: &str) -> Result<Self> {
        let root = std::env::var("WALLETGUARD_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."))
            });
        Self::at_path(root.join(app).join("walletguard.json"))
    }

    /// Open at an explicit path.
    pub fn at_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::storage)?;
        }
        let map = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::storage)?;
            serde_json::from_str(&raw).map_err(Error::storage)?
        } else {
            HashMap::new()
        };
        Ok(Self { path, map: Mutex::new(map) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, map: &HashMap<String, String>) -> Result<()> {
        let raw = serde_json::to_string_pretty(map).map_err(Error::storage)?;
        std::fs::write(&self.path, raw).map_err(Error::storage)
    }
}

#[async_trait]
impl PersistenceGateway for JsonFileGateway {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let map = self.map.lock().unwrap_or_else(|p| p.into_inner());
        Ok(map.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.map.lock().unwrap_or_else(|p| p.into_inner());
        map.insert(key.to_string(), value.to_string());
        self.flush(&map)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut map = self.map.lock().unwrap_or_else(|p| p.into_inner());
        map.remove(key);
        self.flush(&map)
    }
}
