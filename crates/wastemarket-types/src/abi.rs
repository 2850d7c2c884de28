//! Minimal Solidity ABI codec for the marketplace contract surface.
//!
//! Only the shapes the marketplace exposes are supported: `uint256` and
//! `string` arguments, `string` returns, and `MarketItem[]` returns where
//! `MarketItem` is the static tuple
//! `(uint256 tokenId, address seller, address owner, uint256 price, bool sold)`.

use crate::address::Address;
use crate::error::CodecError;
use crate::listing::MarketItem;
use primitive_types::U256;
use sha3::{Digest, Keccak256};

pub const FETCH_MARKET_ITEMS: &str = "fetchMarketItems()";
pub const FETCH_MY_NFTS: &str = "fetchMyNFTs()";
pub const TOKEN_URI: &str = "tokenURI(uint256)";
pub const CREATE_TOKEN: &str = "createToken(string,uint256)";
pub const CREATE_MARKET_SALE: &str = "createMarketSale(uint256)";
pub const NAME: &str = "name()";

const WORD: usize = 32;
/// Words per encoded `MarketItem`.
const MARKET_ITEM_WORDS: usize = 5;

/// Argument value for [`encode_call`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Uint(U256),
    String(String),
}

/// First four bytes of the Keccak-256 of the canonical signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

/// Selector followed by head/tail encoded arguments.
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let head_len = args.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for arg in args {
        match arg {
            Token::Uint(v) => head.extend_from_slice(&uint_word(*v)),
            Token::String(s) => {
                head.extend_from_slice(&uint_word(U256::from(head_len + tail.len())));
                tail.extend_from_slice(&uint_word(U256::from(s.len())));
                tail.extend_from_slice(s.as_bytes());
                let pad = (WORD - s.len() % WORD) % WORD;
                tail.extend(std::iter::repeat(0u8).take(pad));
            }
        }
    }

    let mut out = Vec::with_capacity(4 + head.len() + tail.len());
    out.extend_from_slice(&selector(signature));
    out.extend_from_slice(&head);
    out.extend_from_slice(&tail);
    out
}

/// Decode a single dynamic `string` return value.
pub fn decode_string(data: &[u8]) -> Result<String, CodecError> {
    let offset = read_usize(data, 0)?;
    let len = read_usize(data, offset)?;
    let start = offset + WORD;
    let bytes = slice(data, start, len)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Decode a `MarketItem[]` return value.
pub fn decode_market_items(data: &[u8]) -> Result<Vec<MarketItem>, CodecError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let offset = read_usize(data, 0)?;
    let count = read_usize(data, offset)?;
    let base = offset + WORD;
    slice(data, base, count.saturating_mul(MARKET_ITEM_WORDS * WORD))?;

    (0..count)
        .map(|i| {
            let at = base + i * MARKET_ITEM_WORDS * WORD;
            Ok(MarketItem {
                token_id: read_uint(data, at)?,
                seller: Address::from_word(&read_word(data, at + WORD)?),
                owner: Address::from_word(&read_word(data, at + 2 * WORD)?),
                price: read_uint(data, at + 3 * WORD)?,
                sold: !read_uint(data, at + 4 * WORD)?.is_zero(),
            })
        })
        .collect()
}

/// Encode a `MarketItem[]` return value, as the contract would.
pub fn encode_market_items(items: &[MarketItem]) -> Vec<u8> {
    let mut out = Vec::with_capacity((2 + items.len() * MARKET_ITEM_WORDS) * WORD);
    out.extend_from_slice(&uint_word(U256::from(WORD)));
    out.extend_from_slice(&uint_word(U256::from(items.len())));
    for item in items {
        out.extend_from_slice(&uint_word(item.token_id));
        out.extend_from_slice(&address_word(&item.seller));
        out.extend_from_slice(&address_word(&item.owner));
        out.extend_from_slice(&uint_word(item.price));
        out.extend_from_slice(&uint_word(U256::from(item.sold as u8)));
    }
    out
}

/// Encode a single `string` return value.
pub fn encode_string(s: &str) -> Vec<u8> {
    encode_call(NAME, &[Token::String(s.to_string())])[4..].to_vec()
}

/// `0x`-prefixed hex for JSON-RPC payloads.
pub fn to_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

pub fn from_hex(s: &str) -> Result<Vec<u8>, CodecError> {
    let body = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(body).map_err(|_| CodecError::InvalidHex(s.to_string()))
}

/// Quantity encoding (`0x` + minimal hex) used for `value`, `gas`, `gasPrice`.
pub fn to_quantity(v: U256) -> String {
    let encoded = hex::encode(uint_word(v));
    let digits = encoded.trim_start_matches('0');
    if digits.is_empty() {
        "0x0".to_string()
    } else {
        format!("0x{digits}")
    }
}

pub fn from_quantity(s: &str) -> Result<U256, CodecError> {
    let body = s.strip_prefix("0x").unwrap_or(s);
    if body.is_empty() {
        return Ok(U256::zero());
    }
    let padded = if body.len() % 2 == 1 {
        format!("0{body}")
    } else {
        body.to_string()
    };
    let bytes = hex::decode(&padded).map_err(|_| CodecError::InvalidHex(s.to_string()))?;
    if bytes.len() > WORD {
        return Err(CodecError::Overflow("quantity"));
    }
    Ok(U256::from_big_endian(&bytes))
}

fn uint_word(v: U256) -> [u8; WORD] {
    let mut out = [0u8; WORD];
    for (i, byte) in out.iter_mut().rev().enumerate() {
        *byte = v.byte(i);
    }
    out
}

fn address_word(addr: &Address) -> [u8; WORD] {
    let mut out = [0u8; WORD];
    out[12..].copy_from_slice(addr.as_bytes());
    out
}

fn slice(data: &[u8], start: usize, len: usize) -> Result<&[u8], CodecError> {
    let end = start.checked_add(len).ok_or(CodecError::Overflow("abi offset"))?;
    data.get(start..end).ok_or(CodecError::Truncated {
        needed: end,
        got: data.len(),
    })
}

fn read_word(data: &[u8], at: usize) -> Result<[u8; WORD], CodecError> {
    let mut out = [0u8; WORD];
    out.copy_from_slice(slice(data, at, WORD)?);
    Ok(out)
}

fn read_uint(data: &[u8], at: usize) -> Result<U256, CodecError> {
    Ok(U256::from_big_endian(&read_word(data, at)?))
}

fn read_usize(data: &[u8], at: usize) -> Result<usize, CodecError> {
    let v = read_uint(data, at)?;
    if v > U256::from(u32::MAX) {
        return Err(CodecError::Overflow("abi length"));
    }
    Ok(v.low_u64() as usize)
}
