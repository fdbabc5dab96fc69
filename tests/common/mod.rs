//! Shared test doubles: a scriptable provider and a recording sink.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use walletguard::{
    codes, rpc, AccountInfo, ConnectionController, ConnectorInfo, GuardConfig, MemoryGateway,
    NetworkRegistry, ProviderError, WalletProvider, WalletRegistry,
};

pub const TEST_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

/// Provider double. Scripted responses are consumed first; unscripted calls
/// fall back to sensible defaults over an in-memory session.
pub struct MockProvider {
    connectors: Vec<ConnectorInfo>,
    account: Mutex<Option<AccountInfo>>,
    chain_id: Mutex<u64>,
    connect_script: Mutex<VecDeque<Result<AccountInfo, ProviderError>>>,
    connect_delay: Mutex<Option<Duration>>,
    connect_calls: AtomicU32,
    disconnect_calls: AtomicU32,
    fail_disconnect: AtomicBool,
    request_script: Mutex<HashMap<String, VecDeque<Result<Value, ProviderError>>>>,
    request_delay: Mutex<HashMap<String, Duration>>,
    request_log: Mutex<Vec<(String, Value)>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::with_connectors(vec![
            ConnectorInfo { id: "metaMask".into(), name: "MetaMask".into(), ready: true },
            ConnectorInfo { id: "walletConnect".into(), name: "WalletConnect".into(), ready: true },
        ])
    }

    pub fn with_connectors(connectors: Vec<ConnectorInfo>) -> Self {
        Self {
            connectors,
            account: Mutex::new(None),
            chain_id: Mutex::new(1),
            connect_script: Mutex::new(VecDeque::new()),
            connect_delay: Mutex::new(None),
            connect_calls: AtomicU32::new(0),
            disconnect_calls: AtomicU32::new(0),
            fail_disconnect: AtomicBool::new(false),
            request_script: Mutex::new(HashMap::new()),
            request_delay: Mutex::new(HashMap::new()),
            request_log: Mutex::new(Vec::new()),
        }
    }

    pub fn script_connect(&self, result: Result<AccountInfo, ProviderError>) {
        self.connect_script.lock().unwrap().push_back(result);
    }

    pub fn fail_connect_times(&self, times: u32, code: i64, message: &str) {
        for _ in 0..times {
            self.script_connect(Err(ProviderError::new(code, message)));
        }
    }

    pub fn script_request(&self, method: &str, result: Result<Value, ProviderError>) {
        self.request_script
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_request_delay(&self, method: &str, delay: Duration) {
        self.request_delay.lock().unwrap().insert(method.to_string(), delay);
    }

    pub fn clear_request_delays(&self) {
        self.request_delay.lock().unwrap().clear();
    }

    pub fn set_account(&self, account: Option<AccountInfo>) {
        *self.account.lock().unwrap() = account;
    }

    pub fn set_fail_disconnect(&self, fail: bool) {
        self.fail_disconnect.store(fail, Ordering::Release);
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::Acquire)
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.disconnect_calls.load(Ordering::Acquire)
    }

    pub fn calls_of(&self, method: &str) -> usize {
        self.request_log.lock().unwrap().iter().filter(|(m, _)| m == method).count()
    }

    pub fn last_params_of(&self, method: &str) -> Option<Value> {
        self.request_log
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
    }

    fn default_account(&self) -> AccountInfo {
        AccountInfo { address: TEST_ADDRESS.to_string(), chain_id: *self.chain_id.lock().unwrap() }
    }

    fn default_response(&self, method: &str, params: &Value) -> Result<Value, ProviderError> {
        match method {
            rpc::ETH_CHAIN_ID => Ok(json!(format!("0x{:x}", *self.chain_id.lock().unwrap()))),
            rpc::ETH_BLOCK_NUMBER => Ok(json!("0x10")),
            rpc::ETH_ACCOUNTS => {
                let account = self.account.lock().unwrap();
                match account.as_ref() {
                    Some(a) => Ok(json!([a.address])),
                    None => Ok(json!([])),
                }
            }
            rpc::WALLET_SWITCH_CHAIN => {
                let requested = params
                    .get(0)
                    .and_then(|p| p.get("chainId"))
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.strip_prefix("0x"))
                    .and_then(|hex| u64::from_str_radix(hex, 16).ok());
                if let Some(chain) = requested {
                    *self.chain_id.lock().unwrap() = chain;
                    if let Some(account) = self.account.lock().unwrap().as_mut() {
                        account.chain_id = chain;
                    }
                }
                Ok(Value::Null)
            }
            rpc::WALLET_ADD_CHAIN => Ok(Value::Null),
            _ => Err(ProviderError::new(codes::METHOD_NOT_FOUND, "method not found")),
        }
    }
}

#[async_trait]
impl WalletProvider for MockProvider {
    async fn connect(&self, _connector_id: &str) -> Result<AccountInfo, ProviderError> {
        self.connect_calls.fetch_add(1, Ordering::AcqRel);
        let delay = *self.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.connect_script.lock().unwrap().pop_front();
        let result = scripted.unwrap_or_else(|| Ok(self.default_account()));
        if let Ok(account) = &result {
            *self.account.lock().unwrap() = Some(account.clone());
        }
        result
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        self.disconnect_calls.fetch_add(1, Ordering::AcqRel);
        if self.fail_disconnect.load(Ordering::Acquire) {
            return Err(ProviderError::new(codes::INTERNAL, "provider unavailable"));
        }
        *self.account.lock().unwrap() = None;
        Ok(())
    }

    async fn get_account(&self) -> Result<Option<AccountInfo>, ProviderError> {
        Ok(self.account.lock().unwrap().clone())
    }

    async fn is_connected(&self) -> bool {
        self.account.lock().unwrap().is_some()
    }

    fn connectors(&self) -> Vec<ConnectorInfo> {
        self.connectors.clone()
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.request_log.lock().unwrap().push((method.to_string(), params.clone()));
        let delay = self.request_delay.lock().unwrap().get(method).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self
            .request_script
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(result) => result,
            None => self.default_response(method, &params),
        }
    }
}

/// Captures notifications as `(kind, message)` pairs.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(&'static str, String)>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<(&'static str, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn contains(&self, kind: &str, needle: &str) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|(k, m)| *k == kind && m.contains(needle))
    }

    fn push(&self, kind: &'static str, message: &str) {
        self.messages.lock().unwrap().push((kind, message.to_string()));
    }
}

impl walletguard::NotificationSink for RecordingSink {
    fn success(&self, message: &str) {
        self.push("success", message);
    }

    fn error(&self, message: &str) {
        self.push("error", message);
    }

    fn warning(&self, message: &str) {
        self.push("warning", message);
    }

    fn info(&self, message: &str) {
        self.push("info", message);
    }
}

/// Controller over a mock provider, memory gateway, and recording sink.
pub fn build_controller(
    provider: Arc<MockProvider>,
    config: GuardConfig,
) -> (ConnectionController, Arc<MemoryGateway>, Arc<RecordingSink>) {
    let persist = Arc::new(MemoryGateway::new());
    let sink = Arc::new(RecordingSink::default());
    let controller = ConnectionController::new(
        provider,
        persist.clone(),
        sink.clone(),
        WalletRegistry::with_defaults(),
        NetworkRegistry::with_defaults(),
        config,
    )
    .expect("controller");
    (controller, persist, sink)
}
