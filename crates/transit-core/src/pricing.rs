//! Service price on top of the ledger's storage price.
//!
//! Ledger amounts are decimal strings in the smallest unit and can exceed
//! 64 bits, so all arithmetic is done on 256-bit integers.

use alloy_primitives::U256;
use thiserror::Error;

/// Fee divisor: the service keeps one part in a thousand.
const FEE_DIVISOR: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceError {
	#[error("invalid amount: {0:?}")]
	InvalidAmount(String),
	#[error("amount overflows 256 bits")]
	Overflow,
}

/// Parses a non-negative decimal amount.
pub fn parse_amount(value: &str) -> Result<U256, PriceError> {
	if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
		return Err(PriceError::InvalidAmount(value.to_string()));
	}
	U256::from_str_radix(value, 10).map_err(|_| PriceError::Overflow)
}

/// `base + floor(base / 1000)`.
pub fn price_with_fee(base: &str) -> Result<String, PriceError> {
	Ok(required_payment(parse_amount(base)?)?.to_string())
}

pub fn required_payment(base: U256) -> Result<U256, PriceError> {
	base.checked_add(base / U256::from(FEE_DIVISOR))
		.ok_or(PriceError::Overflow)
}
