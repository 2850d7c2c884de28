//! Decimal <-> base-unit conversion for HBAR amounts on the EVM layer.

use crate::error::CodecError;
use primitive_types::U256;

/// HBAR is exposed with 18 decimals (weibar) through the JSON-RPC relay.
pub const HBAR_DECIMALS: u32 = 18;

/// Format base units as a decimal string. Always keeps one fractional digit
/// (`1000000000000000000` → `"1.0"`).
pub fn format_units(value: U256, decimals: u32) -> String {
    let divisor = U256::exp10(decimals as usize);
    let (whole, frac) = value.div_mod(divisor);
    let mut frac_str = format!("{frac}");
    while frac_str.len() < decimals as usize {
        frac_str.insert(0, '0');
    }
    let trimmed = frac_str.trim_end_matches('0');
    let frac_out = if trimmed.is_empty() { "0" } else { trimmed };
    format!("{whole}.{frac_out}")
}

/// Parse a non-negative decimal string into base units.
pub fn parse_units(amount: &str, decimals: u32) -> Result<U256, CodecError> {
    let amount = amount.trim();
    let invalid = || CodecError::InvalidAmount(amount.to_string());

    let (whole, frac) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > decimals as usize {
        return Err(invalid());
    }

    let mut digits = String::with_capacity(whole.len() + decimals as usize);
    digits.push_str(whole);
    digits.push_str(frac);
    for _ in frac.len()..decimals as usize {
        digits.push('0');
    }
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_dec_str(digits).map_err(|_| CodecError::Overflow("amount"))
}

pub fn format_hbar(value: U256) -> String {
    format_units(value, HBAR_DECIMALS)
}

pub fn parse_hbar(amount: &str) -> Result<U256, CodecError> {
    parse_units(amount, HBAR_DECIMALS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_matches_ether_style() {
        assert_eq!(format_hbar(U256::exp10(17)), "0.1");
        assert_eq!(format_hbar(U256::exp10(18)), "1.0");
        assert_eq!(format_hbar(U256::zero()), "0.0");
        assert_eq!(format_hbar(U256::from(15u64) * U256::exp10(16)), "0.15");
        assert_eq!(format_hbar(U256::from(1u64)), "0.000000000000000001");
    }

    #[test]
    fn test_parse_decimal_amounts() {
        assert_eq!(parse_hbar("0.1").unwrap(), U256::exp10(17));
        assert_eq!(parse_hbar("2").unwrap(), U256::from(2u64) * U256::exp10(18));
        assert_eq!(parse_hbar("0").unwrap(), U256::zero());
        assert_eq!(parse_hbar(".5").unwrap(), U256::from(5u64) * U256::exp10(17));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_hbar("").is_err());
        assert!(parse_hbar("-1").is_err());
        assert!(parse_hbar("1.2.3").is_err());
        assert!(parse_hbar("abc").is_err());
        assert!(parse_hbar("0.0000000000000000001").is_err());
    }
}
