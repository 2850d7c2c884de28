//! Typed binding to the marketplace contract.

use async_trait::async_trait;
use wastemarket_types::abi::{self, Token};
use wastemarket_types::{Address, MarketItem, U256};

/// Anything that can run a read-only contract call.
#[async_trait]
pub trait ContractCaller: Send + Sync {
    /// `eth_call`; `from` sets `msg.sender` for sender-scoped views.
    async fn call(
        &self,
        from: Option<Address>,
        to: Address,
        data: &[u8],
    ) -> Result<Vec<u8>, crate::Error>;

    /// Deployed bytecode at `address`; empty when no contract exists.
    async fn code_at(&self, address: Address) -> Result<Vec<u8>, crate::Error>;
}

/// Read calls and transaction payloads for one marketplace deployment.
pub struct Marketplace<'a, C: ContractCaller + ?Sized> {
    caller: &'a C,
    address: Address,
}

impl<'a, C: ContractCaller + ?Sized> Marketplace<'a, C> {
    pub fn new(caller: &'a C, address: Address) -> Self {
        Self { caller, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Unsold listings.
    pub async fn fetch_market_items(&self) -> Result<Vec<MarketItem>, crate::Error> {
        let data = self.read(None, abi::FETCH_MARKET_ITEMS, &[]).await?;
        Ok(abi::decode_market_items(&data)?)
    }

    /// Items owned by `owner` (the contract filters on `msg.sender`).
    pub async fn fetch_my_nfts(&self, owner: Address) -> Result<Vec<MarketItem>, crate::Error> {
        let data = self.read(Some(owner), abi::FETCH_MY_NFTS, &[]).await?;
        Ok(abi::decode_market_items(&data)?)
    }

    pub async fn token_uri(&self, token_id: U256) -> Result<String, crate::Error> {
        let data = self
            .read(None, abi::TOKEN_URI, &[Token::Uint(token_id)])
            .await?;
        Ok(abi::decode_string(&data)?)
    }

    pub async fn name(&self) -> Result<String, crate::Error> {
        let data = self.read(None, abi::NAME, &[]).await?;
        Ok(abi::decode_string(&data)?)
    }

    /// An empty return from a function that returns data means the node has
    /// not indexed the contract yet. Reported in the shape the classifier
    /// recognises.
    async fn read(
        &self,
        from: Option<Address>,
        signature: &str,
        args: &[Token],
    ) -> Result<Vec<u8>, crate::Error> {
        let data = abi::encode_call(signature, args);
        let out = self.caller.call(from, self.address, &data).await?;
        if out.is_empty() {
            return Err(crate::Error::Contract(format!(
                "call revert exception [ method=\"{signature}\", data=\"0x\" ]"
            )));
        }
        Ok(out)
    }
}

/// `createToken(tokenURI, price)` payload.
pub fn create_token_data(token_uri: &str, price: U256) -> Vec<u8> {
    abi::encode_call(
        abi::CREATE_TOKEN,
        &[Token::String(token_uri.to_string()), Token::Uint(price)],
    )
}

/// `createMarketSale(tokenId)` payload.
pub fn create_market_sale_data(token_id: U256) -> Vec<u8> {
    abi::encode_call(abi::CREATE_MARKET_SALE, &[Token::Uint(token_id)])
}
