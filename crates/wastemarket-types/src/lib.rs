//! Shared types and pure-logic utilities for the waste marketplace.
//! No network dependency; the gateway and any other client build on these.

pub mod abi;
mod address;
mod classify;
pub mod content;
mod error;
mod listing;
pub mod units;

pub use address::Address;
pub use classify::{ClassifiedError, ErrorCategory, classify, describe};
pub use content::ContentReference;
pub use error::CodecError;
pub use listing::{
    Attribute, MarketItem, MarketListing, TokenMetadata, WasteProperties, placeholder_listings,
};
pub use primitive_types::U256;
