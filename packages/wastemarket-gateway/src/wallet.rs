//! Wallet provider: account access, network switching, and transaction
//! submission through an EIP-1193 style JSON-RPC endpoint.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use wastemarket_types::abi::{from_quantity, to_hex, to_quantity};
use wastemarket_types::{Address, U256};

use crate::contract::ContractCaller;
use crate::rpc::{call_params, hex_result, HttpTransport, JsonRpcTransport, RpcFailure};

/// Wallet error code for "chain not added".
const UNRECOGNIZED_CHAIN: i64 = 4902;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    Switched,
    UnknownChain,
}

/// `wallet_addEthereumChain` parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainParams {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl ChainParams {
    pub fn hedera(chain_id: u64, rpc_url: &str, explorer_url: &str) -> Self {
        let chain_name = match chain_id {
            295 => "Hedera Mainnet",
            297 => "Hedera Previewnet",
            _ => "Hedera Testnet",
        };
        Self {
            chain_id: format!("0x{chain_id:x}"),
            chain_name: chain_name.to_string(),
            native_currency: NativeCurrency {
                name: "HBAR".into(),
                symbol: "HBAR".into(),
                decimals: 18,
            },
            rpc_urls: vec![rpc_url.to_string()],
            block_explorer_urls: vec![explorer_url.to_string()],
        }
    }
}

/// Unsigned transaction handed to the wallet for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub data: Vec<u8>,
    pub value: U256,
    pub gas: u64,
    pub gas_price: U256,
}

impl TransactionRequest {
    fn to_json(&self) -> Value {
        json!({
            "from": self.from.to_string(),
            "to": self.to.to_string(),
            "data": to_hex(&self.data),
            "value": to_quantity(self.value),
            "gas": to_quantity(U256::from(self.gas)),
            "gasPrice": to_quantity(self.gas_price),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub block_number: Option<u64>,
    pub status: bool,
    #[serde(serialize_with = "u256_dec_opt")]
    pub gas_used: Option<U256>,
}

fn u256_dec_opt<S: serde::Serializer>(v: &Option<U256>, s: S) -> Result<S::Ok, S::Error> {
    match v {
        Some(v) => s.serialize_str(&v.to_string()),
        None => s.serialize_none(),
    }
}

impl TransactionReceipt {
    fn from_json(value: &Value) -> Result<Self, crate::Error> {
        let field = |name: &str| value.get(name).and_then(Value::as_str);
        let quantity = |name: &str| -> Result<Option<U256>, crate::Error> {
            field(name).map(from_quantity).transpose().map_err(Into::into)
        };
        let transaction_hash = field("transactionHash")
            .ok_or_else(|| crate::Error::Wallet("receipt without transactionHash".into()))?
            .to_string();
        Ok(Self {
            transaction_hash,
            block_number: quantity("blockNumber")?.map(|n| n.low_u64()),
            status: quantity("status")?.map(|s| !s.is_zero()).unwrap_or(true),
            gas_used: quantity("gasUsed")?,
        })
    }
}

/// The user's wallet. Reads go through the same endpoint.
#[async_trait]
pub trait WalletProvider: ContractCaller {
    /// Prompt for account access; first entry is the active account.
    async fn request_accounts(&self) -> Result<Vec<Address>, crate::Error>;
    async fn chain_id(&self) -> Result<u64, crate::Error>;
    async fn switch_chain(&self, chain_id: u64) -> Result<SwitchOutcome, crate::Error>;
    async fn add_chain(&self, params: &ChainParams) -> Result<(), crate::Error>;
    /// Sign and broadcast; returns the transaction hash.
    async fn send_transaction(&self, tx: &TransactionRequest) -> Result<String, crate::Error>;
    async fn transaction_receipt(
        &self,
        hash: &str,
    ) -> Result<Option<TransactionReceipt>, crate::Error>;
}

/// Active account of a connected wallet.
pub async fn connect<W: WalletProvider + ?Sized>(wallet: &W) -> Result<Address, crate::Error> {
    let accounts = wallet.request_accounts().await?;
    let account = accounts
        .first()
        .copied()
        .ok_or_else(|| crate::Error::Wallet("wallet returned no accounts".into()))?;
    info!(account = %account, "Wallet connected");
    Ok(account)
}

/// Make sure the wallet is on `params`' chain, adding it if the wallet does
/// not know it.
pub async fn ensure_network<W: WalletProvider + ?Sized>(
    wallet: &W,
    params: &ChainParams,
) -> Result<(), crate::Error> {
    let wanted = u64::from_str_radix(params.chain_id.trim_start_matches("0x"), 16)
        .map_err(|_| crate::Error::Config(format!("bad chain id {}", params.chain_id)))?;
    let current = wallet.chain_id().await?;
    if current == wanted {
        return Ok(());
    }
    info!(current, wanted, "Switching wallet network");
    match wallet.switch_chain(wanted).await? {
        SwitchOutcome::Switched => Ok(()),
        SwitchOutcome::UnknownChain => {
            info!(chain = %params.chain_name, "Network unknown to wallet, adding it");
            wallet.add_chain(params).await
        }
    }
}

/// Poll for a receipt until it appears or `max_polls` is reached.
pub async fn wait_for_receipt<W: WalletProvider + ?Sized>(
    wallet: &W,
    hash: &str,
    interval: Duration,
    max_polls: u32,
) -> Result<TransactionReceipt, crate::Error> {
    for attempt in 1..=max_polls {
        if let Some(receipt) = wallet.transaction_receipt(hash).await? {
            debug!(hash, attempt, "Receipt received");
            return Ok(receipt);
        }
        if attempt < max_polls {
            tokio::time::sleep(interval).await;
        }
    }
    warn!(hash, max_polls, "Gave up waiting for receipt");
    Err(crate::Error::Wallet(format!(
        "transaction {hash} not confirmed after {max_polls} polls"
    )))
}

/// Wallet bridge reached over JSON-RPC.
pub struct RpcWallet {
    transport: Box<dyn JsonRpcTransport>,
}

impl RpcWallet {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, crate::Error> {
        Ok(Self::with_transport(Box::new(HttpTransport::new(url, timeout)?)))
    }

    pub fn with_transport(transport: Box<dyn JsonRpcTransport>) -> Self {
        Self { transport }
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcFailure> {
        self.transport.request(method, params).await
    }

    async fn request_ok(&self, method: &str, params: Value) -> Result<Value, crate::Error> {
        self.request(method, params)
            .await
            .map_err(|e| crate::Error::Wallet(format!("{method}: {e}")))
    }
}

#[async_trait]
impl ContractCaller for RpcWallet {
    async fn call(
        &self,
        from: Option<Address>,
        to: Address,
        data: &[u8],
    ) -> Result<Vec<u8>, crate::Error> {
        let result = self.request_ok("eth_call", call_params(from, to, data)).await?;
        hex_result(&result, "eth_call")
    }

    async fn code_at(&self, address: Address) -> Result<Vec<u8>, crate::Error> {
        let result = self
            .request_ok("eth_getCode", json!([address.to_string(), "latest"]))
            .await?;
        hex_result(&result, "eth_getCode")
    }
}

#[async_trait]
impl WalletProvider for RpcWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, crate::Error> {
        let result = self.request_ok("eth_requestAccounts", json!([])).await?;
        let list = result
            .as_array()
            .ok_or_else(|| crate::Error::Wallet("eth_requestAccounts: expected array".into()))?;
        list.iter()
            .map(|v| {
                v.as_str()
                    .ok_or_else(|| crate::Error::Wallet(format!("bad account entry {v}")))?
                    .parse::<Address>()
                    .map_err(Into::into)
            })
            .collect()
    }

    async fn chain_id(&self) -> Result<u64, crate::Error> {
        let result = self.request_ok("eth_chainId", json!([])).await?;
        let s = result
            .as_str()
            .ok_or_else(|| crate::Error::Wallet("eth_chainId: expected string".into()))?;
        Ok(from_quantity(s)?.low_u64())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<SwitchOutcome, crate::Error> {
        let params = json!([{ "chainId": format!("0x{chain_id:x}") }]);
        match self.request("wallet_switchEthereumChain", params).await {
            Ok(_) => Ok(SwitchOutcome::Switched),
            Err(e) if e.code() == Some(UNRECOGNIZED_CHAIN) => Ok(SwitchOutcome::UnknownChain),
            Err(e) => Err(crate::Error::Wallet(format!("wallet_switchEthereumChain: {e}"))),
        }
    }

    async fn add_chain(&self, params: &ChainParams) -> Result<(), crate::Error> {
        let value = serde_json::to_value(params)
            .map_err(|e| crate::Error::Config(format!("chain params: {e}")))?;
        self.request_ok("wallet_addEthereumChain", json!([value]))
            .await
            .map(|_| ())
    }

    async fn send_transaction(&self, tx: &TransactionRequest) -> Result<String, crate::Error> {
        let result = self
            .request_ok("eth_sendTransaction", json!([tx.to_json()]))
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| crate::Error::Wallet("eth_sendTransaction: expected hash".into()))
    }

    async fn transaction_receipt(
        &self,
        hash: &str,
    ) -> Result<Option<TransactionReceipt>, crate::Error> {
        let result = self
            .request_ok("eth_getTransactionReceipt", json!([hash]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        TransactionReceipt::from_json(&result).map(Some)
    }
}
