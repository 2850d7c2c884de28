//! Hedera mirror node REST client, used for diagnostics when contract reads
//! fail and for contract verification.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, info, warn};
use wastemarket_types::abi::{self, from_quantity};
use wastemarket_types::U256;

use crate::metrics::METRICS;

/// `GET /contracts/{id}` (fields we use).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContractInfo {
    pub contract_id: String,
    pub evm_address: Option<String>,
    pub deleted: bool,
    pub created_timestamp: Option<String>,
}

/// One entry of `GET /contracts/{id}/results`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContractResult {
    pub call_result: Option<String>,
    pub error_message: Option<String>,
    pub function_parameters: Option<String>,
    pub hash: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(Deserialize)]
struct ResultsPage {
    #[serde(default)]
    results: Vec<ContractResult>,
}

#[async_trait]
pub trait MirrorApi: Send + Sync {
    async fn contract_info(&self, contract: &str) -> Result<ContractInfo, crate::Error>;
    /// Most recent first.
    async fn contract_results(
        &self,
        contract: &str,
        limit: u32,
    ) -> Result<Vec<ContractResult>, crate::Error>;
}

pub struct MirrorClient {
    client: reqwest::Client,
    base_url: String,
    contract_id: String,
}

impl MirrorClient {
    /// `contract_id` is substituted for any EVM address the caller passes.
    pub fn new(
        base_url: &str,
        contract_id: &str,
        timeout: Duration,
    ) -> Result<Self, crate::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            contract_id: contract_id.to_string(),
        })
    }

    fn contract_path(&self, contract: &str) -> String {
        let id = if contract.starts_with("0x") {
            self.contract_id.as_str()
        } else {
            contract
        };
        format!("{}/contracts/{id}", self.base_url)
    }

    async fn get_json<T>(&self, url: &str) -> Result<T, crate::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let resp = self.client.get(url).send().await.map_err(|e| {
            METRICS.mirror_errors.fetch_add(1, Ordering::Relaxed);
            crate::Error::Mirror(format!("GET {url}: {e}"))
        })?;
        let status = resp.status();
        if !status.is_success() {
            METRICS.mirror_errors.fetch_add(1, Ordering::Relaxed);
            return Err(crate::Error::Mirror(format!("GET {url}: HTTP {status}")));
        }
        resp.json()
            .await
            .map_err(|e| crate::Error::Mirror(format!("GET {url}: invalid body: {e}")))
    }
}

#[async_trait]
impl MirrorApi for MirrorClient {
    async fn contract_info(&self, contract: &str) -> Result<ContractInfo, crate::Error> {
        self.get_json(&self.contract_path(contract)).await
    }

    async fn contract_results(
        &self,
        contract: &str,
        limit: u32,
    ) -> Result<Vec<ContractResult>, crate::Error> {
        let url = format!(
            "{}/results?limit={limit}&order=desc",
            self.contract_path(contract)
        );
        let page: ResultsPage = self.get_json(&url).await?;
        Ok(page.results)
    }
}

/// `true` unless the mirror says the contract is deleted. An unreachable
/// mirror counts as active.
pub async fn is_contract_active<M: MirrorApi + ?Sized>(mirror: &M, contract: &str) -> bool {
    match mirror.contract_info(contract).await {
        Ok(info) => !info.deleted,
        Err(e) => {
            warn!(contract, error = %e, "Cannot check contract status, assuming active");
            true
        }
    }
}

/// Token ids minted by successful `createToken` calls, newest first.
pub async fn contract_token_ids<M: MirrorApi + ?Sized>(mirror: &M, contract: &str) -> Vec<U256> {
    let results = match mirror.contract_results(contract, 20).await {
        Ok(results) => results,
        Err(e) => {
            warn!(contract, error = %e, "Cannot list contract results");
            return Vec::new();
        }
    };
    let create_token = hex::encode(abi::selector(abi::CREATE_TOKEN));
    let ids: Vec<U256> = results
        .iter()
        .filter(|r| r.error_message.is_none())
        .filter(|r| {
            r.function_parameters
                .as_deref()
                .is_some_and(|p| p.contains(&create_token))
        })
        .filter_map(|r| r.call_result.as_deref())
        .filter(|out| out.len() >= 66)
        .filter_map(|out| from_quantity(out.get(out.len() - 64..)?).ok())
        .collect();
    debug!(contract, count = ids.len(), "Token ids from mirror results");
    ids
}

/// Log what the mirror node knows about the contract. Diagnostic only.
pub async fn log_diagnostics<M: MirrorApi + ?Sized>(mirror: &M, contract: &str) {
    let active = is_contract_active(mirror, contract).await;
    let minted = contract_token_ids(mirror, contract).await;
    info!(
        contract,
        active,
        minted = minted.len(),
        "Mirror node diagnostics"
    );
}
