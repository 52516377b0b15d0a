//! Binary formats used by the transit service.
//!
//! This crate decodes, encodes and verifies ANS-104 data items and computes
//! the signature payload of ledger transfers signed by the service wallet.
//! Both formats sign a SHA-384 "deep hash" of their fields.

use thiserror::Error;

pub mod b64;
pub mod data_item;
pub mod deep_hash;
pub mod tags;
pub mod transaction;

pub use data_item::{DataItem, SignatureType};
pub use deep_hash::{deep_hash, DeepHashChunk};
pub use tags::Tag;

/// Errors raised while decoding or verifying binary payloads.
#[derive(Debug, Error)]
pub enum CodecError {
	#[error("input truncated while reading {0}")]
	Truncated(&'static str),
	#[error("unsupported signature type {0}")]
	UnsupportedSignatureType(u16),
	#[error("invalid {field} presence flag {value}")]
	InvalidFlag { field: &'static str, value: u8 },
	#[error("invalid {field} length {length}")]
	InvalidLength { field: &'static str, length: usize },
	#[error("declared {declared} tags but decoded {actual}")]
	TagCount { declared: u64, actual: u64 },
	#[error("invalid tags: {0}")]
	InvalidTags(String),
	#[error("invalid public key: {0}")]
	InvalidKey(String),
	#[error("signature does not match owner")]
	InvalidSignature,
	#[error("invalid base64url: {0}")]
	Base64(String),
}
