//! Signing payload of format 2 ledger transactions.

use crate::data_item::verify_rsa_pss;
use crate::deep_hash::{deep_hash, DeepHashChunk};
use crate::{b64, CodecError};
use sha2::{Digest, Sha256};
use transit_types::LedgerTransaction;

/// The deep hash a wallet signs for `tx`.
///
/// Covers format, owner, target, quantity, reward, anchor, tags, data size and
/// data root. Binary fields are base64url decoded first.
pub fn signature_data(tx: &LedgerTransaction) -> Result<[u8; 48], CodecError> {
	let format = tx.format.to_string();
	let owner = b64::decode(&tx.owner)?;
	let target = b64::decode(&tx.target)?;
	let last_tx = b64::decode(&tx.last_tx)?;
	let data_root = b64::decode(&tx.data_root)?;
	let tags = tx
		.tags
		.iter()
		.map(|tag| Ok((b64::decode(&tag.name)?, b64::decode(&tag.value)?)))
		.collect::<Result<Vec<_>, CodecError>>()?;

	let tag_chunks = tags
		.iter()
		.map(|(name, value)| {
			DeepHashChunk::List(vec![DeepHashChunk::Blob(name), DeepHashChunk::Blob(value)])
		})
		.collect();

	Ok(deep_hash(&DeepHashChunk::List(vec![
		DeepHashChunk::Blob(format.as_bytes()),
		DeepHashChunk::Blob(&owner),
		DeepHashChunk::Blob(&target),
		DeepHashChunk::Blob(tx.quantity.as_bytes()),
		DeepHashChunk::Blob(tx.reward.as_bytes()),
		DeepHashChunk::Blob(&last_tx),
		DeepHashChunk::List(tag_chunks),
		DeepHashChunk::Blob(tx.data_size.as_bytes()),
		DeepHashChunk::Blob(&data_root),
	])))
}

/// Stores `signature` on `tx` and derives the transaction id from it.
pub fn attach_signature(tx: &mut LedgerTransaction, signature: &[u8]) {
	tx.signature = b64::encode(signature);
	tx.id = b64::encode(Sha256::digest(signature));
}

/// Checks an RSA-PSS signed transaction against its owner.
pub fn verify(tx: &LedgerTransaction) -> Result<(), CodecError> {
	let signature = b64::decode(&tx.signature)?;
	if tx.id != b64::encode(Sha256::digest(&signature)) {
		return Err(CodecError::InvalidSignature);
	}
	let owner = b64::decode(&tx.owner)?;
	verify_rsa_pss(&owner, &signature_data(tx)?, &signature)
}

/// Ledger address for an RSA modulus.
pub fn address(owner: &[u8]) -> String {
	b64::encode(Sha256::digest(owner))
}

#[cfg(test)]
mod tests {
	use super::*;
	use transit_types::LedgerTag;

	fn transfer() -> LedgerTransaction {
		let mut tx = LedgerTransaction::transfer(b64::encode([4u8; 32]), "1000", "20", b64::encode([5u8; 48]));
		tx.owner = b64::encode([6u8; 512]);
		tx
	}

	#[test]
	fn test_every_signed_field_changes_digest() {
		let base = signature_data(&transfer()).unwrap();

		let mut quantity = transfer();
		quantity.quantity = "1001".into();
		assert_ne!(signature_data(&quantity).unwrap(), base);

		let mut reward = transfer();
		reward.reward = "21".into();
		assert_ne!(signature_data(&reward).unwrap(), base);

		let mut tagged = transfer();
		tagged.tags.push(LedgerTag {
			name: b64::encode("Order-Id"),
			value: b64::encode("item"),
		});
		assert_ne!(signature_data(&tagged).unwrap(), base);
	}

	#[test]
	fn test_unsigned_fields_do_not_change_digest() {
		let base = signature_data(&transfer()).unwrap();
		let mut tx = transfer();
		tx.data = "ignored".into();
		attach_signature(&mut tx, &[1, 2, 3]);
		assert_eq!(signature_data(&tx).unwrap(), base);
	}

	#[test]
	fn test_attach_signature_derives_id() {
		let mut tx = transfer();
		attach_signature(&mut tx, &[9u8; 512]);
		assert_eq!(tx.id, b64::encode(Sha256::digest([9u8; 512])));
		assert!(tx.is_signed());
	}

	#[test]
	fn test_bad_base64_is_rejected() {
		let mut tx = transfer();
		tx.target = "***".into();
		assert!(matches!(signature_data(&tx), Err(CodecError::Base64(_))));
	}
}
