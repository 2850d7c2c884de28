//! Marketplace facade: listing reads, content resolution, contract
//! verification, and the mint and purchase write paths.

use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use wastemarket_types::units::parse_hbar;
use wastemarket_types::{Address, ContentReference, U256};

use crate::config::Config;
use crate::contract::{create_market_sale_data, create_token_data, ContractCaller, Marketplace};
use crate::kv_store::KeyValueStore;
use crate::metadata::MetadataFetcher;
use crate::metrics::METRICS;
use crate::mirror::MirrorApi;
use crate::query::{ListingLoader, ListingMapper, Listings, QueryChain, RpcStrategy, WalletStrategy};
use crate::resolver::ContentResolver;
use crate::upload::{
    GistBackend, JsonBinBackend, LocalBlobBackend, UploadBackend, UploadChain, UploadFile,
    WasteForm,
};
use crate::wallet::{self, ChainParams, TransactionReceipt, TransactionRequest, WalletProvider};

/// Everything the facade talks to. Swappable for tests.
pub struct MarketParts {
    pub reader: Arc<dyn ContractCaller>,
    pub wallet: Arc<dyn WalletProvider>,
    pub mirror: Arc<dyn MirrorApi>,
    pub fetcher: Arc<dyn MetadataFetcher>,
    pub store: Arc<dyn KeyValueStore>,
    pub upload_backends: Vec<Box<dyn UploadBackend>>,
}

/// Pinning, paste, then local blob, as configured.
pub fn default_upload_backends(
    config: &Config,
    store: Arc<dyn KeyValueStore>,
) -> Result<Vec<Box<dyn UploadBackend>>, crate::Error> {
    let timeout = Duration::from_secs(config.http_timeout_secs);
    Ok(vec![
        Box::new(JsonBinBackend::new(
            &config.pinning_upload_url,
            config.paste_size_limit,
            timeout,
        )?),
        Box::new(GistBackend::new(
            &config.paste_upload_url,
            config.paste_size_limit,
            timeout,
        )?),
        Box::new(LocalBlobBackend::new(config.blob_dir(), store)),
    ])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedContent {
    pub url: String,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendedApproach {
    Rpc,
    WalletWithMirrorFallback,
    RetryLater,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractVerification {
    pub rpc_working: bool,
    pub mirror_node_confirmed: bool,
    pub contract_exists: bool,
    pub can_call_functions: bool,
    pub recommended_approach: RecommendedApproach,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintReceipt {
    pub content_reference: ContentReference,
    pub token_uri: String,
    pub image_url: String,
    pub metadata_url: String,
    pub transaction_hash: String,
    pub receipt: TransactionReceipt,
    pub explorer_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    pub token_id: u64,
    pub transaction_hash: String,
    pub receipt: TransactionReceipt,
    pub explorer_url: String,
}

pub struct WasteMarket {
    contract: Address,
    contract_id: String,
    chain: ChainParams,
    gas_limit: u64,
    gas_price: U256,
    explorer_url: String,
    receipt_poll: Duration,
    receipt_max_polls: u32,
    reader: Arc<dyn ContractCaller>,
    wallet: Arc<dyn WalletProvider>,
    mirror: Arc<dyn MirrorApi>,
    resolver: Arc<ContentResolver>,
    uploads: UploadChain,
    loader: ListingLoader,
}

impl WasteMarket {
    pub fn new(config: &Config, parts: MarketParts) -> Result<Self, crate::Error> {
        let contract: Address = config.contract_address.parse().map_err(|e| {
            crate::Error::Config(format!("contract_address {}: {e}", config.contract_address))
        })?;
        let resolver = Arc::new(ContentResolver::new(config, parts.store));
        let mapper = ListingMapper::new(resolver.clone(), parts.fetcher);
        let chain = QueryChain::new(
            vec![
                Box::new(RpcStrategy::new(parts.reader.clone(), contract)),
                Box::new(WalletStrategy::new(parts.wallet.clone(), contract)),
            ],
            mapper,
        );
        let loader = ListingLoader::new(chain, parts.mirror.clone(), &config.contract_id);
        let uploads = UploadChain::new(parts.upload_backends, resolver.clone(), &config.site_url);

        Ok(Self {
            contract,
            contract_id: config.contract_id.clone(),
            chain: ChainParams::hedera(config.chain_id, &config.rpc_url, &config.explorer_url),
            gas_limit: config.gas_limit,
            gas_price: U256::from(config.gas_price_gwei) * U256::exp10(9),
            explorer_url: config.explorer_url.trim_end_matches('/').to_string(),
            receipt_poll: Duration::from_millis(config.receipt_poll_ms),
            receipt_max_polls: config.receipt_max_polls,
            reader: parts.reader,
            wallet: parts.wallet,
            mirror: parts.mirror,
            resolver,
            uploads,
            loader,
        })
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub async fn load_listings(&self) -> Listings {
        self.loader.load_listings().await
    }

    pub async fn load_owned_items(&self, owner: Option<Address>) -> Listings {
        self.loader.load_owned_items(owner).await
    }

    pub fn resolve(&self, raw: &str) -> ResolvedContent {
        ResolvedContent {
            url: self.resolver.resolve_str(raw),
            urls: self.resolver.resolve_all(raw),
        }
    }

    /// Combine bytecode, a `name()` call, and the mirror node into a
    /// recommendation for how the UI should read the contract.
    pub async fn verify_contract(&self) -> ContractVerification {
        let mut contract_exists = match self.reader.code_at(self.contract).await {
            Ok(code) => !code.is_empty(),
            Err(e) => {
                warn!(error = %e, "Cannot read contract bytecode");
                false
            }
        };

        let market = Marketplace::new(&*self.reader, self.contract);
        let can_call_functions = match market.name().await {
            Ok(name) => {
                info!(name = %name, "Contract callable via RPC");
                true
            }
            Err(e) => {
                warn!(error = %e, "Contract calls fail via RPC");
                false
            }
        };

        let mirror_node_confirmed = match self.mirror.contract_info(&self.contract_id).await {
            Ok(info) => !info.deleted,
            Err(e) => {
                warn!(error = %e, "Mirror node verification failed");
                false
            }
        };
        contract_exists |= mirror_node_confirmed;

        let recommended_approach = if can_call_functions {
            RecommendedApproach::Rpc
        } else if mirror_node_confirmed {
            RecommendedApproach::WalletWithMirrorFallback
        } else {
            RecommendedApproach::RetryLater
        };

        ContractVerification {
            rpc_working: can_call_functions,
            mirror_node_confirmed,
            contract_exists,
            can_call_functions,
            recommended_approach,
        }
    }

    /// Upload the image and metadata, then `createToken` through the wallet.
    pub async fn mint(
        &self,
        form: &WasteForm,
        image: &UploadFile,
    ) -> Result<MintReceipt, crate::Error> {
        METRICS.mints_total.fetch_add(1, Ordering::Relaxed);
        let result = self.mint_inner(form, image).await;
        if let Err(e) = &result {
            METRICS.mint_errors.fetch_add(1, Ordering::Relaxed);
            error!(error = %e, name = %form.name, "Mint failed");
        }
        result
    }

    async fn mint_inner(
        &self,
        form: &WasteForm,
        image: &UploadFile,
    ) -> Result<MintReceipt, crate::Error> {
        let price = validate_mint(form, image)?;
        let account = wallet::connect(&*self.wallet).await?;
        wallet::ensure_network(&*self.wallet, &self.chain).await?;

        let content = self.uploads.upload_nft_content(form, image).await?;
        let token_uri = content.metadata_reference.to_string();

        let tx = TransactionRequest {
            from: account,
            to: self.contract,
            data: create_token_data(&token_uri, price),
            value: U256::zero(),
            gas: self.gas_limit,
            gas_price: self.gas_price,
        };
        let (transaction_hash, receipt) = self.submit(&tx).await?;
        info!(
            tx = %transaction_hash,
            token_uri = %token_uri,
            price = %form.price,
            "Token minted"
        );

        Ok(MintReceipt {
            content_reference: content.metadata_reference,
            token_uri,
            image_url: content.image_url,
            metadata_url: content.metadata.gateway,
            explorer_url: self.transaction_url(&transaction_hash),
            transaction_hash,
            receipt,
        })
    }

    /// `createMarketSale(tokenId)` with the listed price attached.
    pub async fn purchase(
        &self,
        token_id: u64,
        price: &str,
    ) -> Result<PurchaseReceipt, crate::Error> {
        METRICS.purchases_total.fetch_add(1, Ordering::Relaxed);
        let result = self.purchase_inner(token_id, price).await;
        if let Err(e) = &result {
            METRICS.purchase_errors.fetch_add(1, Ordering::Relaxed);
            error!(error = %e, token_id, "Purchase failed");
        }
        result
    }

    async fn purchase_inner(
        &self,
        token_id: u64,
        price: &str,
    ) -> Result<PurchaseReceipt, crate::Error> {
        let value = parse_hbar(price)
            .map_err(|e| crate::Error::InvalidInput(format!("price: {e}")))?;
        let account = wallet::connect(&*self.wallet).await?;
        wallet::ensure_network(&*self.wallet, &self.chain).await?;

        let tx = TransactionRequest {
            from: account,
            to: self.contract,
            data: create_market_sale_data(U256::from(token_id)),
            value,
            gas: self.gas_limit,
            gas_price: self.gas_price,
        };
        let (transaction_hash, receipt) = self.submit(&tx).await?;
        info!(tx = %transaction_hash, token_id, price, "Item purchased");

        Ok(PurchaseReceipt {
            token_id,
            explorer_url: self.transaction_url(&transaction_hash),
            transaction_hash,
            receipt,
        })
    }

    async fn submit(
        &self,
        tx: &TransactionRequest,
    ) -> Result<(String, TransactionReceipt), crate::Error> {
        let hash = self.wallet.send_transaction(tx).await?;
        let receipt = wallet::wait_for_receipt(
            &*self.wallet,
            &hash,
            self.receipt_poll,
            self.receipt_max_polls,
        )
        .await?;
        if !receipt.status {
            return Err(crate::Error::Contract(format!(
                "transaction {hash} reverted"
            )));
        }
        Ok((hash, receipt))
    }

    fn transaction_url(&self, hash: &str) -> String {
        format!("{}/transaction/{hash}", self.explorer_url)
    }
}

/// All fields present and a strictly positive price. Returns the price in
/// base units.
fn validate_mint(form: &WasteForm, image: &UploadFile) -> Result<U256, crate::Error> {
    let fields = [
        ("name", &form.name),
        ("description", &form.description),
        ("country", &form.country),
        ("collectionPoint", &form.collection_point),
        ("weight", &form.weight),
        ("price", &form.price),
    ];
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(crate::Error::InvalidInput(format!(
            "missing fields: {}",
            missing.join(", ")
        )));
    }
    if image.bytes.is_empty() {
        return Err(crate::Error::InvalidInput("missing file".into()));
    }
    let price = parse_hbar(&form.price).map_err(|_| {
        crate::Error::InvalidInput(format!("price {:?} is not a number", form.price))
    })?;
    if price.is_zero() {
        return Err(crate::Error::InvalidInput("price must be positive".into()));
    }
    Ok(price)
}
