//! Listing reads as an ordered chain of sources. The first source that
//! produces listings wins; when none does, a terminal policy decides what the
//! caller sees.

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use wastemarket_types::{
    classify, describe, placeholder_listings, Address, ClassifiedError, ContentReference,
    ErrorCategory, MarketItem, MarketListing,
};

use crate::contract::{ContractCaller, Marketplace};
use crate::metadata::MetadataFetcher;
use crate::metrics::METRICS;
use crate::mirror::{self, MirrorApi};
use crate::resolver::ContentResolver;
use crate::wallet::{self, WalletProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMethod {
    Rpc,
    Wallet,
    Mirror,
    Sample,
}

/// One attempt of the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutcome {
    pub method: QueryMethod,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryOutcome {
    fn success(method: QueryMethod, count: usize) -> Self {
        Self {
            method,
            succeeded: true,
            count: Some(count),
            error_category: None,
            error: None,
        }
    }

    fn failure(method: QueryMethod, error: &crate::Error) -> Self {
        let message = error.to_string();
        Self {
            method,
            succeeded: false,
            count: None,
            error_category: Some(classify(&message)),
            error: Some(message),
        }
    }
}

/// How a load was answered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    /// Source of the returned items; `None` when the result is empty.
    pub source: Option<QueryMethod>,
    pub outcomes: Vec<QueryOutcome>,
    /// Classification of the last failure, when every real source failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listings {
    pub items: Vec<MarketListing>,
    pub report: LoadReport,
}

/// Which contract view to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingScope {
    /// Unsold marketplace items.
    Browse,
    /// Items owned by an account. Direct RPC needs the address; the wallet
    /// uses its connected account.
    Owned(Option<Address>),
}

/// Turns on-chain records into listings: token URI, resolve, fetch metadata.
pub struct ListingMapper {
    resolver: Arc<ContentResolver>,
    fetcher: Arc<dyn MetadataFetcher>,
}

impl ListingMapper {
    pub fn new(resolver: Arc<ContentResolver>, fetcher: Arc<dyn MetadataFetcher>) -> Self {
        Self { resolver, fetcher }
    }

    /// Map all records concurrently. A record whose metadata cannot be loaded
    /// is dropped; the rest keep their order.
    pub async fn map<C: ContractCaller + ?Sized>(
        &self,
        market: &Marketplace<'_, C>,
        items: Vec<MarketItem>,
    ) -> Vec<MarketListing> {
        let total = items.len();
        let results = join_all(items.iter().map(|item| self.map_one(market, item))).await;

        let listings: Vec<MarketListing> = results
            .into_iter()
            .zip(&items)
            .filter_map(|(result, item)| match result {
                Ok(listing) => Some(listing),
                Err(e) => {
                    METRICS.items_dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(token_id = %item.token_id, error = %e, "Dropping item");
                    None
                }
            })
            .collect();
        debug!(total, mapped = listings.len(), "Mapped market items");
        listings
    }

    async fn map_one<C: ContractCaller + ?Sized>(
        &self,
        market: &Marketplace<'_, C>,
        item: &MarketItem,
    ) -> Result<MarketListing, crate::Error> {
        let uri = market.token_uri(item.token_id).await?;
        let reference = ContentReference::parse(&uri);
        let url = self.resolver.resolve(reference.as_ref());
        let metadata = self.fetcher.fetch(&url).await?;
        let image = if metadata.image.is_empty() {
            metadata.image_url.clone()
        } else {
            self.resolver.resolve_str(&metadata.image)
        };
        MarketListing::from_parts(item, reference, metadata, image).ok_or_else(|| {
            crate::Error::Contract(format!("token id {} out of range", item.token_id))
        })
    }
}

/// One source in the chain.
#[async_trait]
pub trait QueryStrategy: Send + Sync {
    fn method(&self) -> QueryMethod;

    async fn attempt(
        &self,
        scope: ListingScope,
        mapper: &ListingMapper,
    ) -> Result<Vec<MarketListing>, crate::Error>;
}

/// Direct contract read through the RPC client.
pub struct RpcStrategy {
    caller: Arc<dyn ContractCaller>,
    contract: Address,
}

impl RpcStrategy {
    pub fn new(caller: Arc<dyn ContractCaller>, contract: Address) -> Self {
        Self { caller, contract }
    }
}

#[async_trait]
impl QueryStrategy for RpcStrategy {
    fn method(&self) -> QueryMethod {
        QueryMethod::Rpc
    }

    async fn attempt(
        &self,
        scope: ListingScope,
        mapper: &ListingMapper,
    ) -> Result<Vec<MarketListing>, crate::Error> {
        let market = Marketplace::new(&*self.caller, self.contract);
        let items = match scope {
            ListingScope::Browse => market.fetch_market_items().await?,
            ListingScope::Owned(Some(owner)) => market.fetch_my_nfts(owner).await?,
            ListingScope::Owned(None) => {
                return Err(crate::Error::InvalidInput(
                    "owner address required for a direct read".into(),
                ))
            }
        };
        Ok(mapper.map(&market, items).await)
    }
}

/// Contract read through the user's wallet.
pub struct WalletStrategy {
    wallet: Arc<dyn WalletProvider>,
    contract: Address,
}

impl WalletStrategy {
    pub fn new(wallet: Arc<dyn WalletProvider>, contract: Address) -> Self {
        Self { wallet, contract }
    }
}

#[async_trait]
impl QueryStrategy for WalletStrategy {
    fn method(&self) -> QueryMethod {
        QueryMethod::Wallet
    }

    async fn attempt(
        &self,
        scope: ListingScope,
        mapper: &ListingMapper,
    ) -> Result<Vec<MarketListing>, crate::Error> {
        let account = wallet::connect(&*self.wallet).await?;
        let market = Marketplace::new(&*self.wallet, self.contract);
        let items = match scope {
            ListingScope::Browse => market.fetch_market_items().await?,
            ListingScope::Owned(_) => market.fetch_my_nfts(account).await?,
        };
        Ok(mapper.map(&market, items).await)
    }
}

/// Result of running the strategies, before any terminal policy.
pub struct ChainRun {
    pub found: Option<(QueryMethod, Vec<MarketListing>)>,
    pub outcomes: Vec<QueryOutcome>,
    pub last_error: Option<crate::Error>,
}

/// Ordered strategies over a shared mapper.
pub struct QueryChain {
    strategies: Vec<Box<dyn QueryStrategy>>,
    mapper: ListingMapper,
}

impl QueryChain {
    pub fn new(strategies: Vec<Box<dyn QueryStrategy>>, mapper: ListingMapper) -> Self {
        Self { strategies, mapper }
    }

    /// Try each strategy in turn; stop at the first non-empty result.
    pub async fn run(&self, scope: ListingScope) -> ChainRun {
        let mut outcomes = Vec::with_capacity(self.strategies.len());
        let mut last_error = None;

        for strategy in &self.strategies {
            let method = strategy.method();
            match strategy.attempt(scope, &self.mapper).await {
                Ok(listings) if !listings.is_empty() => {
                    outcomes.push(QueryOutcome::success(method, listings.len()));
                    return ChainRun {
                        found: Some((method, listings)),
                        outcomes,
                        last_error,
                    };
                }
                Ok(_) => {
                    debug!(?method, "Source returned no listings");
                    outcomes.push(QueryOutcome::success(method, 0));
                }
                Err(e) => {
                    warn!(?method, error = %e, "Listing source failed, trying next");
                    outcomes.push(QueryOutcome::failure(method, &e));
                    last_error = Some(e);
                }
            }
        }
        ChainRun {
            found: None,
            outcomes,
            last_error,
        }
    }
}

/// Chain plus the terminal policies for each view.
pub struct ListingLoader {
    chain: QueryChain,
    mirror: Arc<dyn MirrorApi>,
    contract_ref: String,
}

impl ListingLoader {
    pub fn new(chain: QueryChain, mirror: Arc<dyn MirrorApi>, contract_ref: &str) -> Self {
        Self {
            chain,
            mirror,
            contract_ref: contract_ref.to_string(),
        }
    }

    /// Marketplace view. Never fails: falls back to the sample listings.
    pub async fn load_listings(&self) -> Listings {
        let start = Instant::now();
        METRICS.loads_total.fetch_add(1, Ordering::Relaxed);
        let run = self.chain.run(ListingScope::Browse).await;
        let error = run.last_error.as_ref().map(|e| describe(&e.to_string()));
        let mut outcomes = run.outcomes;

        let result = match run.found {
            Some((method, items)) => {
                record_source(method);
                Listings {
                    items,
                    report: LoadReport {
                        source: Some(method),
                        outcomes,
                        error: None,
                    },
                }
            }
            None => {
                info!("No listings from any source, showing samples");
                let items = placeholder_listings();
                METRICS.loads_sample.fetch_add(1, Ordering::Relaxed);
                outcomes.push(QueryOutcome::success(QueryMethod::Sample, items.len()));
                Listings {
                    items,
                    report: LoadReport {
                        source: Some(QueryMethod::Sample),
                        outcomes,
                        error,
                    },
                }
            }
        };
        METRICS.record_load_duration(start);
        result
    }

    /// Owned-items view. Never fails and never shows samples: when every
    /// source fails the error is classified, the mirror node is consulted for
    /// diagnostics, and the result is empty.
    pub async fn load_owned_items(&self, owner: Option<Address>) -> Listings {
        let start = Instant::now();
        METRICS.loads_total.fetch_add(1, Ordering::Relaxed);
        let run = self.chain.run(ListingScope::Owned(owner)).await;

        let result = match run.found {
            Some((method, items)) => {
                record_source(method);
                Listings {
                    items,
                    report: LoadReport {
                        source: Some(method),
                        outcomes: run.outcomes,
                        error: None,
                    },
                }
            }
            None => {
                METRICS.loads_empty.fetch_add(1, Ordering::Relaxed);
                let error = run.last_error.as_ref().map(|e| {
                    let classified = describe(&e.to_string());
                    warn!(
                        category = ?classified.category,
                        suggestion = classified.suggestion,
                        "Owned items unavailable"
                    );
                    classified
                });
                if error.is_some() {
                    mirror::log_diagnostics(&*self.mirror, &self.contract_ref).await;
                }
                Listings {
                    items: Vec::new(),
                    report: LoadReport {
                        source: None,
                        outcomes: run.outcomes,
                        error,
                    },
                }
            }
        };
        METRICS.record_load_duration(start);
        result
    }
}

fn record_source(method: QueryMethod) {
    let counter = match method {
        QueryMethod::Rpc => &METRICS.loads_rpc,
        QueryMethod::Wallet => &METRICS.loads_wallet,
        QueryMethod::Mirror | QueryMethod::Sample => &METRICS.loads_sample,
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Config;
    use crate::contract::tests::{item, FakeContract};
    use crate::kv_store::MemoryStore;
    use crate::metadata::tests::FakeFetcher;
    use crate::mirror::tests::FakeMirror;
    use crate::wallet::tests::FakeWallet;
    use wastemarket_types::{TokenMetadata, WasteProperties};

    const INDEXING_DELAY: &str = "call revert exception [ method=\"fetchMyNFTs()\", data=\"0x\" ]";

    fn metadata(name: &str) -> TokenMetadata {
        TokenMetadata {
            name: name.into(),
            image: format!("ipfs://jsonbin_img_{name}"),
            properties: WasteProperties {
                country: "Kenya".into(),
                weight: "2".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Contract with tokens 1..=n, each pointing at `jsonbin_meta<id>`, and
    /// a fetcher that knows every document except those in `missing`.
    pub(crate) fn market_fixture(n: u64, missing: &[u64]) -> (FakeContract, FakeFetcher) {
        let items: Vec<MarketItem> = (1..=n).map(|i| item(i, i)).collect();
        let mut contract = FakeContract::with_items(&items);
        let mut fetcher = FakeFetcher::default();
        for i in 1..=n {
            contract.token_uris.insert(i, format!("jsonbin_meta{i}"));
            if !missing.contains(&i) {
                fetcher.docs.insert(
                    format!("https://api.jsonbin.io/v3/b/meta{i}/latest"),
                    metadata(&format!("item{i}")),
                );
            }
        }
        (contract, fetcher)
    }

    pub(crate) fn loader(
        rpc: FakeContract,
        wallet: FakeWallet,
        fetcher: FakeFetcher,
    ) -> ListingLoader {
        watched_loader(rpc, wallet, fetcher, Arc::new(FakeMirror::default()))
    }

    fn watched_loader(
        rpc: FakeContract,
        wallet: FakeWallet,
        fetcher: FakeFetcher,
        mirror: Arc<FakeMirror>,
    ) -> ListingLoader {
        let resolver = Arc::new(ContentResolver::new(
            &Config::default(),
            Arc::new(MemoryStore::new()),
        ));
        let mapper = ListingMapper::new(resolver, Arc::new(fetcher));
        let chain = QueryChain::new(
            vec![
                Box::new(RpcStrategy::new(Arc::new(rpc), Address::ZERO)),
                Box::new(WalletStrategy::new(Arc::new(wallet), Address::ZERO)),
            ],
            mapper,
        );
        ListingLoader::new(chain, mirror, "0.0.6519500")
    }

    fn ids(listings: &Listings) -> Vec<u64> {
        listings.items.iter().map(|l| l.token_id).collect()
    }

    #[tokio::test]
    async fn test_rpc_with_three_items_returns_three() {
        let (contract, fetcher) = market_fixture(3, &[]);
        let loader = loader(
            contract,
            FakeWallet::new(FakeContract::failing("should not be called")),
            fetcher,
        );
        let listings = loader.load_listings().await;
        assert_eq!(ids(&listings), vec![1, 2, 3]);
        assert_eq!(listings.report.source, Some(QueryMethod::Rpc));
        assert_eq!(listings.report.outcomes.len(), 1);

        let first = &listings.items[0];
        assert_eq!(first.name, "item1");
        assert_eq!(first.price, "0.1");
        assert_eq!(first.country, "Kenya");
        assert_eq!(first.image, "https://api.jsonbin.io/v3/b/img_item1/latest");
        assert_eq!(first.content_reference.as_ref().unwrap().to_string(), "jsonbin_meta1");
    }

    #[tokio::test]
    async fn test_failed_metadata_drops_only_that_item() {
        let (contract, fetcher) = market_fixture(3, &[2]);
        let loader = loader(contract, FakeWallet::new(FakeContract::default()), fetcher);
        let listings = loader.load_listings().await;
        assert_eq!(ids(&listings), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_rpc_and_wallet_failing_yields_samples() {
        let loader = loader(
            FakeContract::failing("connection refused"),
            FakeWallet::locked(FakeContract::default()),
            FakeFetcher::default(),
        );
        let listings = loader.load_listings().await;
        assert_eq!(ids(&listings), vec![1, 2, 3]);
        let prices: Vec<&str> = listings.items.iter().map(|l| l.price.as_str()).collect();
        assert_eq!(prices, vec!["0.1", "0.05", "0.15"]);

        let methods: Vec<QueryMethod> =
            listings.report.outcomes.iter().map(|o| o.method).collect();
        assert_eq!(
            methods,
            vec![QueryMethod::Rpc, QueryMethod::Wallet, QueryMethod::Sample]
        );
        assert!(!listings.report.outcomes[0].succeeded);
        assert_eq!(listings.report.source, Some(QueryMethod::Sample));
    }

    #[tokio::test]
    async fn test_empty_rpc_result_falls_through_to_wallet() {
        let (wallet_contract, fetcher) = market_fixture(2, &[]);
        let loader = loader(
            FakeContract::with_items(&[]),
            FakeWallet::new(wallet_contract),
            fetcher,
        );
        let listings = loader.load_listings().await;
        assert_eq!(ids(&listings), vec![1, 2]);
        assert_eq!(listings.report.source, Some(QueryMethod::Wallet));
        assert_eq!(listings.report.outcomes[0].count, Some(0));
    }

    #[tokio::test]
    async fn test_owned_items_never_show_samples() {
        let loader = loader(
            FakeContract::failing(INDEXING_DELAY),
            FakeWallet::new(FakeContract::failing(INDEXING_DELAY)),
            FakeFetcher::default(),
        );
        let owner: Address = "0x00000000000000000000000000000000000000bb".parse().unwrap();
        let listings = loader.load_owned_items(Some(owner)).await;
        assert!(listings.items.is_empty());
        assert_eq!(listings.report.source, None);
        let error = listings.report.error.unwrap();
        assert_eq!(error.category, ErrorCategory::IndexingDelay);
        assert_eq!(error.retry_delay_ms, Some(30_000));
    }

    #[tokio::test]
    async fn test_owned_without_address_uses_wallet_account() {
        let (contract, fetcher) = market_fixture(1, &[]);
        let loader = loader(FakeContract::default(), FakeWallet::new(contract), fetcher);
        let listings = loader.load_owned_items(None).await;
        assert_eq!(ids(&listings), vec![1]);
        assert_eq!(listings.report.source, Some(QueryMethod::Wallet));
        assert_eq!(
            listings.report.outcomes[0].error_category,
            Some(ErrorCategory::Generic)
        );
    }

    #[tokio::test]
    async fn test_owned_failure_checks_contract_on_mirror() {
        let mirror = Arc::new(FakeMirror::default());
        let loader = watched_loader(
            FakeContract::failing(INDEXING_DELAY),
            FakeWallet::new(FakeContract::failing(INDEXING_DELAY)),
            FakeFetcher::default(),
            mirror.clone(),
        );
        let owner: Address = "0x00000000000000000000000000000000000000bb".parse().unwrap();
        let listings = loader.load_owned_items(Some(owner)).await;
        assert!(listings.items.is_empty());
        assert_eq!(mirror.info_calls(), 1);
    }

    #[tokio::test]
    async fn test_mirror_untouched_on_browse_and_owned_success() {
        let mirror = Arc::new(FakeMirror::default());
        let loader = watched_loader(
            FakeContract::failing("connection refused"),
            FakeWallet::locked(FakeContract::default()),
            FakeFetcher::default(),
            mirror.clone(),
        );
        let listings = loader.load_listings().await;
        assert_eq!(listings.report.source, Some(QueryMethod::Sample));
        assert_eq!(mirror.info_calls(), 0);

        let mirror = Arc::new(FakeMirror::default());
        let (contract, fetcher) = market_fixture(2, &[]);
        let loader = watched_loader(
            contract,
            FakeWallet::new(FakeContract::default()),
            fetcher,
            mirror.clone(),
        );
        let owner: Address = "0x00000000000000000000000000000000000000bb".parse().unwrap();
        let listings = loader.load_owned_items(Some(owner)).await;
        assert_eq!(ids(&listings), vec![1, 2]);
        assert_eq!(mirror.info_calls(), 0);
    }
}
