//! Unpadded base64url, the encoding of every binary field on the ledger.

use crate::CodecError;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

/// Writes without padding and reads with or without it.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
	&alphabet::URL_SAFE,
	GeneralPurposeConfig::new()
		.with_encode_padding(false)
		.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub fn encode(bytes: impl AsRef<[u8]>) -> String {
	URL_SAFE_LENIENT.encode(bytes)
}

pub fn decode(value: &str) -> Result<Vec<u8>, CodecError> {
	URL_SAFE_LENIENT
		.decode(value)
		.map_err(|e| CodecError::Base64(e.to_string()))
}
