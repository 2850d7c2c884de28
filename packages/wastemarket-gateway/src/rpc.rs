//! JSON-RPC client with primary → fallback failover and circuit breaker.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};
use wastemarket_types::abi::{from_hex, to_hex};
use wastemarket_types::Address;

use crate::contract::ContractCaller;
use crate::metrics::METRICS;
use crate::now_ms;

const CIRCUIT_BREAKER_THRESHOLD: u64 = 5;
const CIRCUIT_BREAKER_WINDOW_MS: u64 = 30_000;

/// Why a single JSON-RPC request failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcFailure {
    /// Endpoint unreachable, non-2xx, or malformed envelope.
    Transport(String),
    /// The node answered with a JSON-RPC error object.
    Node { code: i64, message: String },
}

impl RpcFailure {
    pub fn code(&self) -> Option<i64> {
        match self {
            RpcFailure::Node { code, .. } => Some(*code),
            RpcFailure::Transport(_) => None,
        }
    }
}

impl fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcFailure::Transport(msg) => f.write_str(msg),
            RpcFailure::Node { code, message } => write!(f, "{message} (code {code})"),
        }
    }
}

/// One JSON-RPC endpoint.
#[async_trait]
pub trait JsonRpcTransport: Send + Sync {
    fn url(&self) -> &str;
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcFailure>;
}

/// JSON-RPC 2.0 over HTTP POST.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, crate::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl JsonRpcTransport for HttpTransport {
    fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcFailure> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcFailure::Transport(format!("{method}: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RpcFailure::Transport(format!("{method}: HTTP {status}")));
        }
        let envelope: Value = resp
            .json()
            .await
            .map_err(|e| RpcFailure::Transport(format!("{method}: invalid response: {e}")))?;
        parse_envelope(envelope)
    }
}

fn parse_envelope(mut envelope: Value) -> Result<Value, RpcFailure> {
    if let Some(err) = envelope.get("error").filter(|e| !e.is_null()) {
        return Err(RpcFailure::Node {
            code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    match envelope.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(RpcFailure::Transport("response has no result".into())),
    }
}

/// `eth_call` parameters against the latest block.
pub(crate) fn call_params(from: Option<Address>, to: Address, data: &[u8]) -> Value {
    let mut tx = json!({
        "to": to.to_string(),
        "data": to_hex(data),
    });
    if let Some(from) = from {
        tx["from"] = Value::String(from.to_string());
    }
    json!([tx, "latest"])
}

pub(crate) fn hex_result(value: &Value, what: &str) -> Result<Vec<u8>, crate::Error> {
    let s = value
        .as_str()
        .ok_or_else(|| crate::Error::Rpc(format!("{what}: expected hex string, got {value}")))?;
    Ok(from_hex(s)?)
}

struct CircuitState {
    failures: u64,
    last_failure_ms: u64,
    open: bool,
}

/// Read-only chain client with primary → fallback failover.
///
/// Only transport failures count against the primary. A node error such as a
/// revert is returned as-is, since the fallback would answer the same.
pub struct RpcClient {
    primary: Box<dyn JsonRpcTransport>,
    fallback: Box<dyn JsonRpcTransport>,
    circuit: Mutex<CircuitState>,
    total_failovers: AtomicU64,
}

impl RpcClient {
    pub fn new(
        primary_url: &str,
        fallback_url: &str,
        timeout: Duration,
    ) -> Result<Self, crate::Error> {
        info!(
            primary = primary_url,
            fallback = fallback_url,
            "RPC client initialized with failover"
        );
        Ok(Self::with_transports(
            Box::new(HttpTransport::new(primary_url, timeout)?),
            Box::new(HttpTransport::new(fallback_url, timeout)?),
        ))
    }

    pub fn with_transports(
        primary: Box<dyn JsonRpcTransport>,
        fallback: Box<dyn JsonRpcTransport>,
    ) -> Self {
        Self {
            primary,
            fallback,
            circuit: Mutex::new(CircuitState {
                failures: 0,
                last_failure_ms: 0,
                open: false,
            }),
            total_failovers: AtomicU64::new(0),
        }
    }

    pub fn primary_url(&self) -> &str {
        self.primary.url()
    }

    pub fn fallback_url(&self) -> &str {
        self.fallback.url()
    }

    /// Send a request to the active endpoint, retrying once on the fallback.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, crate::Error> {
        let on_fallback = self.is_circuit_open();
        let first = if on_fallback {
            &self.fallback
        } else {
            &self.primary
        };

        match first.request(method, params.clone()).await {
            Ok(v) => {
                if !on_fallback {
                    self.record_success();
                }
                Ok(v)
            }
            Err(e @ RpcFailure::Node { .. }) => Err(crate::Error::Rpc(e.to_string())),
            Err(e) if on_fallback => {
                METRICS.rpc_errors.fetch_add(1, Ordering::Relaxed);
                Err(crate::Error::Rpc(format!("{method} failed on fallback: {e}")))
            }
            Err(e) => {
                self.record_failure();
                warn!(error = %e, method, "Primary RPC failed, trying fallback");
                self.fallback.request(method, params).await.map_err(|e2| {
                    crate::Error::Rpc(format!(
                        "{method} failed on both RPCs: primary={e}, fallback={e2}"
                    ))
                })
            }
        }
    }

    /// Quick connectivity check. Returns "ok", "degraded", or error.
    pub async fn health_check(&self) -> Result<&'static str, crate::Error> {
        match self.primary.request("eth_blockNumber", json!([])).await {
            Ok(_) => Ok("ok"),
            Err(_) => match self.fallback.request("eth_blockNumber", json!([])).await {
                Ok(_) => Ok("degraded"),
                Err(e) => Err(crate::Error::Rpc(format!("Both RPCs unreachable: {e}"))),
            },
        }
    }

    // --- Failover / circuit breaker ---

    fn record_success(&self) {
        let mut circuit = self.circuit.lock().unwrap_or_else(|e| e.into_inner());
        if circuit.failures > 0 {
            info!(primary = %self.primary.url(), "Primary RPC recovered");
            circuit.failures = 0;
            circuit.open = false;
        }
    }

    fn record_failure(&self) {
        METRICS.rpc_errors.fetch_add(1, Ordering::Relaxed);
        let mut circuit = self.circuit.lock().unwrap_or_else(|e| e.into_inner());
        circuit.failures += 1;
        circuit.last_failure_ms = now_ms();
        if circuit.failures >= CIRCUIT_BREAKER_THRESHOLD && !circuit.open {
            circuit.open = true;
            self.total_failovers.fetch_add(1, Ordering::Relaxed);
            METRICS.rpc_failovers.fetch_add(1, Ordering::Relaxed);
            warn!(
                failures = circuit.failures,
                fallback = %self.fallback.url(),
                "Circuit breaker opened, routing to fallback"
            );
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        let mut circuit = self.circuit.lock().unwrap_or_else(|e| e.into_inner());
        if !circuit.open {
            return false;
        }
        if now_ms().saturating_sub(circuit.last_failure_ms) > CIRCUIT_BREAKER_WINDOW_MS {
            circuit.open = false;
            circuit.failures = 0;
            info!(primary = %self.primary.url(), "Circuit breaker half-open, retrying primary");
            return false;
        }
        true
    }

    pub fn failover_count(&self) -> u64 {
        self.total_failovers.load(Ordering::Relaxed)
    }

    /// Currently active RPC URL.
    pub fn active_url(&self) -> &str {
        if self.is_circuit_open() {
            self.fallback.url()
        } else {
            self.primary.url()
        }
    }
}

#[async_trait]
impl ContractCaller for RpcClient {
    async fn call(
        &self,
        from: Option<Address>,
        to: Address,
        data: &[u8],
    ) -> Result<Vec<u8>, crate::Error> {
        debug!(to = %to, from = ?from, "eth_call via RPC");
        let result = self.request("eth_call", call_params(from, to, data)).await?;
        hex_result(&result, "eth_call")
    }

    async fn code_at(&self, address: Address) -> Result<Vec<u8>, crate::Error> {
        let result = self
            .request("eth_getCode", json!([address.to_string(), "latest"]))
            .await?;
        hex_result(&result, "eth_getCode")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Scripted transport: pops one response per request and records methods.
    pub(crate) struct ScriptedTransport {
        url: String,
        responses: Mutex<VecDeque<Result<Value, RpcFailure>>>,
        pub(crate) calls: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(url: &str, responses: Vec<Result<Value, RpcFailure>>) -> Self {
            Self {
                url: url.to_string(),
                responses: Mutex::new(responses.into()),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl JsonRpcTransport for ScriptedTransport {
        fn url(&self) -> &str {
            &self.url
        }

        async fn request(&self, method: &str, _params: Value) -> Result<Value, RpcFailure> {
            self.calls.lock().unwrap().push(method.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RpcFailure::Transport("script exhausted".into())))
        }
    }

    fn down() -> Result<Value, RpcFailure> {
        Err(RpcFailure::Transport("connection refused".into()))
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let fallback = ScriptedTransport::new("fb", vec![]);
        let fallback_calls = fallback.calls.clone();
        let client = RpcClient::with_transports(
            Box::new(ScriptedTransport::new("pri", vec![Ok(json!("0x1"))])),
            Box::new(fallback),
        );
        assert_eq!(
            client.request("eth_blockNumber", json!([])).await.unwrap(),
            json!("0x1")
        );
        assert!(fallback_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_fails_over() {
        let client = RpcClient::with_transports(
            Box::new(ScriptedTransport::new("pri", vec![down()])),
            Box::new(ScriptedTransport::new("fb", vec![Ok(json!("0x2"))])),
        );
        assert_eq!(
            client.request("eth_blockNumber", json!([])).await.unwrap(),
            json!("0x2")
        );
        assert!(!client.is_circuit_open());
    }

    #[tokio::test]
    async fn test_node_error_does_not_fail_over() {
        let fallback = ScriptedTransport::new("fb", vec![Ok(json!("0x"))]);
        let fallback_calls = fallback.calls.clone();
        let client = RpcClient::with_transports(
            Box::new(ScriptedTransport::new(
                "pri",
                vec![Err(RpcFailure::Node {
                    code: 3,
                    message: "execution reverted".into(),
                })],
            )),
            Box::new(fallback),
        );
        let err = client.request("eth_call", json!([])).await.unwrap_err();
        assert!(err.to_string().contains("execution reverted"));
        assert!(fallback_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_circuit_opens_after_threshold() {
        let primary = ScriptedTransport::new("pri", (0..5).map(|_| down()).collect());
        let primary_calls = primary.calls.clone();
        let client = RpcClient::with_transports(
            Box::new(primary),
            Box::new(ScriptedTransport::new(
                "fb",
                (0..6).map(|_| Ok(json!("0x1"))).collect(),
            )),
        );
        for _ in 0..5 {
            client.request("eth_blockNumber", json!([])).await.unwrap();
        }
        assert!(client.is_circuit_open());
        assert_eq!(client.failover_count(), 1);
        assert_eq!(client.active_url(), "fb");

        // Routed straight to the fallback while open.
        client.request("eth_blockNumber", json!([])).await.unwrap();
        assert_eq!(primary_calls.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_eth_call_decodes_hex() {
        let client = RpcClient::with_transports(
            Box::new(ScriptedTransport::new("pri", vec![Ok(json!("0xdeadbeef"))])),
            Box::new(ScriptedTransport::new("fb", vec![])),
        );
        let out = client.call(None, Address::ZERO, &[1, 2]).await.unwrap();
        assert_eq!(out, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_envelope_error_object() {
        let err = parse_envelope(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": 4902, "message": "Unrecognized chain ID"}
        }))
        .unwrap_err();
        assert_eq!(err.code(), Some(4902));
        assert_eq!(
            parse_envelope(json!({"jsonrpc": "2.0", "id": 1, "result": null})).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_call_params_include_sender_when_known() {
        let owner: Address = "0x00000000000000000000000000000000000000aa".parse().unwrap();
        let params = call_params(Some(owner), Address::ZERO, &[0x0f]);
        assert_eq!(params[0]["from"], owner.to_string());
        assert_eq!(params[0]["data"], "0x0f");
        assert_eq!(params[1], "latest");
        assert!(call_params(None, Address::ZERO, &[])[0].get("from").is_none());
    }
}
