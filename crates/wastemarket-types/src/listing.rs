//! On-chain records, the off-chain metadata schema, and the listing projection
//! handed to the UI.

use crate::address::Address;
use crate::content::ContentReference;
use crate::units::{format_hbar, parse_hbar};
use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// `MarketItem` struct as returned by `fetchMarketItems()` / `fetchMyNFTs()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketItem {
    pub token_id: U256,
    pub seller: Address,
    pub owner: Address,
    pub price: U256,
    pub sold: bool,
}

/// Metadata document stored next to each token.
///
/// Every text field defaults to an empty string. Numeric properties are
/// accepted as JSON numbers or strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenMetadata {
    #[serde(deserialize_with = "text")]
    pub name: String,
    #[serde(deserialize_with = "text")]
    pub description: String,
    #[serde(deserialize_with = "text")]
    pub image: String,
    #[serde(
        rename = "imageUrl",
        deserialize_with = "text",
        skip_serializing_if = "String::is_empty"
    )]
    pub image_url: String,
    #[serde(deserialize_with = "text", skip_serializing_if = "String::is_empty")]
    pub external_url: String,
    #[serde(deserialize_with = "text", skip_serializing_if = "String::is_empty")]
    pub background_color: String,
    pub properties: WasteProperties,
    pub attributes: Vec<Attribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WasteProperties {
    #[serde(deserialize_with = "text")]
    pub country: String,
    #[serde(deserialize_with = "text")]
    pub collection_point: String,
    #[serde(deserialize_with = "text")]
    pub weight: String,
    #[serde(deserialize_with = "text")]
    pub price: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub trait_type: String,
    pub value: serde_json::Value,
}

impl TokenMetadata {
    /// Parse a metadata document. Non-object bodies are rejected.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Accept string, number, bool or null and normalise to a string.
fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

/// A marketplace entry ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketListing {
    pub token_id: u64,
    /// Price formatted in HBAR.
    pub price: String,
    #[serde(serialize_with = "u256_dec", deserialize_with = "u256_from_dec")]
    pub price_wei: U256,
    pub seller: Address,
    pub owner: Address,
    pub content_reference: Option<ContentReference>,
    pub image: String,
    pub name: String,
    pub description: String,
    pub country: String,
    pub collection_point: String,
    pub weight: String,
}

impl MarketListing {
    /// Join an on-chain record with its resolved metadata. `None` if the token
    /// id does not fit in `u64`.
    pub fn from_parts(
        item: &MarketItem,
        content_reference: Option<ContentReference>,
        metadata: TokenMetadata,
        image: String,
    ) -> Option<Self> {
        if item.token_id > U256::from(u64::MAX) {
            return None;
        }
        Some(Self {
            token_id: item.token_id.low_u64(),
            price: format_hbar(item.price),
            price_wei: item.price,
            seller: item.seller,
            owner: item.owner,
            content_reference,
            image,
            name: metadata.name,
            description: metadata.description,
            country: metadata.properties.country,
            collection_point: metadata.properties.collection_point,
            weight: metadata.properties.weight,
        })
    }
}

fn u256_dec<S: Serializer>(v: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&v.to_string())
}

fn u256_from_dec<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    let s = String::deserialize(deserializer)?;
    U256::from_dec_str(&s).map_err(|_| serde::de::Error::custom("invalid decimal u256"))
}

struct Placeholder {
    token_id: u64,
    price: &'static str,
    image: &'static str,
    name: &'static str,
    description: &'static str,
    country: &'static str,
    collection_point: &'static str,
    weight: &'static str,
}

const PLACEHOLDERS: [Placeholder; 3] = [
    Placeholder {
        token_id: 1,
        price: "0.1",
        image: "https://via.placeholder.com/400x300/22c55e/ffffff?text=Plastic+Waste+NFT",
        name: "Plastic Waste NFT",
        description: "Recyclable plastic waste - ready for purchase",
        country: "Demo Country",
        collection_point: "Demo Collection Point",
        weight: "2.5",
    },
    Placeholder {
        token_id: 2,
        price: "0.05",
        image: "https://via.placeholder.com/400x300/3b82f6/ffffff?text=Glass+Waste+NFT",
        name: "Glass Waste NFT",
        description: "Glass bottles for recycling - eco-friendly option",
        country: "Sample Location",
        collection_point: "Sample Collection Point",
        weight: "1.8",
    },
    Placeholder {
        token_id: 3,
        price: "0.15",
        image: "https://via.placeholder.com/400x300/f59e0b/ffffff?text=Metal+Waste+NFT",
        name: "Metal Waste NFT",
        description: "Aluminum cans and metal scraps for recycling",
        country: "Test Region",
        collection_point: "Test Location",
        weight: "3.2",
    },
];

/// Fixed sample set shown by the browse view when no real source answers.
pub fn placeholder_listings() -> Vec<MarketListing> {
    PLACEHOLDERS
        .iter()
        .map(|p| MarketListing {
            token_id: p.token_id,
            price: p.price.to_string(),
            price_wei: parse_hbar(p.price).unwrap_or_default(),
            seller: Address::ZERO,
            owner: Address::ZERO,
            content_reference: None,
            image: p.image.to_string(),
            name: p.name.to_string(),
            description: p.description.to_string(),
            country: p.country.to_string(),
            collection_point: p.collection_point.to_string(),
            weight: p.weight.to_string(),
        })
        .collect()
}
