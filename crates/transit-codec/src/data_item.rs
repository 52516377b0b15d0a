//! ANS-104 data items.
//!
//! Layout, all integers little endian:
//!
//! ```text
//! u16 signature type | signature | owner | u8 target flag [+ 32 bytes]
//! | u8 anchor flag [+ 32 bytes] | u64 tag count | u64 tag bytes | tags | data
//! ```
//!
//! The signature and owner lengths are fixed by the signature type. The item
//! id is the base64url SHA-256 of the signature.

use crate::deep_hash::{deep_hash, DeepHashChunk};
use crate::tags::{self, Tag};
use crate::{b64, CodecError};
use bytes::Bytes;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sha3::Keccak256;
use std::fmt;

const TARGET_LENGTH: usize = 32;
const ANCHOR_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureType {
	/// RSA-PSS over a 4096-bit key.
	Arweave,
	Ed25519,
	/// secp256k1 over an EIP-191 personal message.
	Ethereum,
	Solana,
}

impl SignatureType {
	pub fn from_u16(value: u16) -> Result<Self, CodecError> {
		match value {
			1 => Ok(SignatureType::Arweave),
			2 => Ok(SignatureType::Ed25519),
			3 => Ok(SignatureType::Ethereum),
			4 => Ok(SignatureType::Solana),
			other => Err(CodecError::UnsupportedSignatureType(other)),
		}
	}

	pub fn as_u16(&self) -> u16 {
		match self {
			SignatureType::Arweave => 1,
			SignatureType::Ed25519 => 2,
			SignatureType::Ethereum => 3,
			SignatureType::Solana => 4,
		}
	}

	pub fn signature_length(&self) -> usize {
		match self {
			SignatureType::Arweave => 512,
			SignatureType::Ed25519 | SignatureType::Solana => 64,
			SignatureType::Ethereum => 65,
		}
	}

	pub fn owner_length(&self) -> usize {
		match self {
			SignatureType::Arweave => 512,
			SignatureType::Ed25519 | SignatureType::Solana => 32,
			SignatureType::Ethereum => 65,
		}
	}
}

impl fmt::Display for SignatureType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_u16())
	}
}

/// A decoded data item.
///
/// `data` shares the buffer the item was decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataItem {
	pub signature_type: SignatureType,
	pub signature: Vec<u8>,
	pub owner: Vec<u8>,
	pub target: Option<Vec<u8>>,
	pub anchor: Option<Vec<u8>>,
	pub tags: Vec<Tag>,
	raw_tags: Vec<u8>,
	pub data: Bytes,
}

impl DataItem {
	/// Creates an unsigned item. Sign `signature_data()` and pass the result
	/// to `with_signature`.
	pub fn new(
		signature_type: SignatureType,
		owner: Vec<u8>,
		tags: Vec<Tag>,
		data: impl Into<Bytes>,
	) -> Self {
		let raw_tags = tags::encode_tags(&tags);
		Self {
			signature_type,
			signature: vec![0; signature_type.signature_length()],
			owner,
			target: None,
			anchor: None,
			tags,
			raw_tags,
			data: data.into(),
		}
	}

	pub fn with_target(mut self, target: [u8; TARGET_LENGTH]) -> Self {
		self.target = Some(target.to_vec());
		self
	}

	pub fn with_anchor(mut self, anchor: [u8; ANCHOR_LENGTH]) -> Self {
		self.anchor = Some(anchor.to_vec());
		self
	}

	pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
		self.signature = signature;
		self
	}

	/// Parses an item, checking only its structure.
	pub fn decode(raw: Bytes) -> Result<Self, CodecError> {
		let mut pos = 0;
		let header = &raw[..];

		let sig_type = u16::from_le_bytes(take::<2>(header, &mut pos, "signature type")?);
		let signature_type = SignatureType::from_u16(sig_type)?;
		let signature = take_slice(
			header,
			&mut pos,
			signature_type.signature_length(),
			"signature",
		)?
		.to_vec();
		let owner = take_slice(header, &mut pos, signature_type.owner_length(), "owner")?.to_vec();
		let target = take_optional(header, &mut pos, TARGET_LENGTH, "target")?;
		let anchor = take_optional(header, &mut pos, ANCHOR_LENGTH, "anchor")?;

		let tag_count = u64::from_le_bytes(take::<8>(header, &mut pos, "tag count")?);
		let tag_bytes = u64::from_le_bytes(take::<8>(header, &mut pos, "tag length")?);
		let tag_bytes = usize::try_from(tag_bytes).map_err(|_| CodecError::InvalidLength {
			field: "tags",
			length: usize::MAX,
		})?;
		let raw_tags = take_slice(header, &mut pos, tag_bytes, "tags")?.to_vec();
		let tags = tags::decode_tags(&raw_tags)?;
		if tags.len() as u64 != tag_count {
			return Err(CodecError::TagCount {
				declared: tag_count,
				actual: tags.len() as u64,
			});
		}

		Ok(Self {
			signature_type,
			signature,
			owner,
			target,
			anchor,
			tags,
			raw_tags,
			data: raw.slice(pos..),
		})
	}

	pub fn encode(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(self.header_len() + self.data.len());
		out.extend_from_slice(&self.signature_type.as_u16().to_le_bytes());
		out.extend_from_slice(&self.signature);
		out.extend_from_slice(&self.owner);
		for field in [&self.target, &self.anchor] {
			match field {
				Some(bytes) => {
					out.push(1);
					out.extend_from_slice(bytes);
				}
				None => out.push(0),
			}
		}
		out.extend_from_slice(&(self.tags.len() as u64).to_le_bytes());
		out.extend_from_slice(&(self.raw_tags.len() as u64).to_le_bytes());
		out.extend_from_slice(&self.raw_tags);
		out.extend_from_slice(&self.data);
		out
	}

	/// Length of everything before the data.
	pub fn header_len(&self) -> usize {
		2 + self.signature.len()
			+ self.owner.len()
			+ 1 + self.target.as_ref().map_or(0, Vec::len)
			+ 1 + self.anchor.as_ref().map_or(0, Vec::len)
			+ 16 + self.raw_tags.len()
	}

	pub fn id(&self) -> String {
		b64::encode(Sha256::digest(&self.signature))
	}

	/// Ledger address of the owner key.
	pub fn owner_address(&self) -> String {
		b64::encode(Sha256::digest(&self.owner))
	}

	/// First tag with the given name, compared case-insensitively.
	pub fn tag(&self, name: &str) -> Option<&str> {
		self.tags
			.iter()
			.find(|t| t.name.eq_ignore_ascii_case(name))
			.map(|t| t.value.as_str())
	}

	/// The message covered by the signature.
	pub fn signature_data(&self) -> [u8; 48] {
		let sig_type = self.signature_type.to_string();
		let empty: &[u8] = &[];
		deep_hash(&DeepHashChunk::List(vec![
			DeepHashChunk::Blob(b"dataitem"),
			DeepHashChunk::Blob(b"1"),
			DeepHashChunk::Blob(sig_type.as_bytes()),
			DeepHashChunk::Blob(&self.owner),
			DeepHashChunk::Blob(self.target.as_deref().unwrap_or(empty)),
			DeepHashChunk::Blob(self.anchor.as_deref().unwrap_or(empty)),
			DeepHashChunk::Blob(&self.raw_tags),
			DeepHashChunk::Blob(&self.data),
		]))
	}

	/// Checks tag limits and the signature against the owner key.
	pub fn verify(&self) -> Result<(), CodecError> {
		tags::validate_tags(&self.tags)?;
		if self.signature.len() != self.signature_type.signature_length() {
			return Err(CodecError::InvalidLength {
				field: "signature",
				length: self.signature.len(),
			});
		}
		if self.owner.len() != self.signature_type.owner_length() {
			return Err(CodecError::InvalidLength {
				field: "owner",
				length: self.owner.len(),
			});
		}

		let message = self.signature_data();
		match self.signature_type {
			SignatureType::Arweave => verify_rsa_pss(&self.owner, &message, &self.signature),
			SignatureType::Ed25519 | SignatureType::Solana => {
				verify_ed25519(&self.owner, &message, &self.signature)
			}
			SignatureType::Ethereum => verify_secp256k1(&self.owner, &message, &self.signature),
		}
	}
}

fn take<const N: usize>(
	buf: &[u8],
	pos: &mut usize,
	field: &'static str,
) -> Result<[u8; N], CodecError> {
	let slice = take_slice(buf, pos, N, field)?;
	let mut out = [0u8; N];
	out.copy_from_slice(slice);
	Ok(out)
}

fn take_slice<'a>(
	buf: &'a [u8],
	pos: &mut usize,
	len: usize,
	field: &'static str,
) -> Result<&'a [u8], CodecError> {
	let end = pos
		.checked_add(len)
		.filter(|end| *end <= buf.len())
		.ok_or(CodecError::Truncated(field))?;
	let out = &buf[*pos..end];
	*pos = end;
	Ok(out)
}

fn take_optional(
	buf: &[u8],
	pos: &mut usize,
	len: usize,
	field: &'static str,
) -> Result<Option<Vec<u8>>, CodecError> {
	match take::<1>(buf, pos, field)?[0] {
		0 => Ok(None),
		1 => Ok(Some(take_slice(buf, pos, len, field)?.to_vec())),
		value => Err(CodecError::InvalidFlag { field, value }),
	}
}

pub(crate) fn verify_rsa_pss(
	modulus: &[u8],
	message: &[u8],
	signature: &[u8],
) -> Result<(), CodecError> {
	let key = ring::signature::RsaPublicKeyComponents {
		n: modulus,
		e: &[0x01, 0x00, 0x01][..],
	};
	key.verify(&ring::signature::RSA_PSS_2048_8192_SHA256, message, signature)
		.map_err(|_| CodecError::InvalidSignature)
}

fn verify_ed25519(owner: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CodecError> {
	use ed25519_dalek::{Signature, Verifier, VerifyingKey};

	let owner: [u8; 32] = owner.try_into().map_err(|_| CodecError::InvalidLength {
		field: "owner",
		length: owner.len(),
	})?;
	let key = VerifyingKey::from_bytes(&owner).map_err(|e| CodecError::InvalidKey(e.to_string()))?;
	let signature =
		Signature::from_slice(signature).map_err(|_| CodecError::InvalidSignature)?;
	key.verify(message, &signature)
		.map_err(|_| CodecError::InvalidSignature)
}

fn verify_secp256k1(owner: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CodecError> {
	use secp256k1::{ecdsa, Message, PublicKey, Secp256k1};

	if signature.len() != 65 {
		return Err(CodecError::InvalidLength {
			field: "signature",
			length: signature.len(),
		});
	}
	let digest = eip191_hash(message);
	let key = PublicKey::from_slice(owner).map_err(|e| CodecError::InvalidKey(e.to_string()))?;
	let mut sig =
		ecdsa::Signature::from_compact(&signature[..64]).map_err(|_| CodecError::InvalidSignature)?;
	sig.normalize_s();

	Secp256k1::verification_only()
		.verify_ecdsa(&Message::from_digest(digest), &sig, &key)
		.map_err(|_| CodecError::InvalidSignature)
}

/// Keccak-256 of an Ethereum personal message.
pub fn eip191_hash(message: &[u8]) -> [u8; 32] {
	let mut hasher = Keccak256::new();
	hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
	hasher.update(message);
	hasher.finalize().into()
}
