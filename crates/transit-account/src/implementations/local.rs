//! Local wallet backed by an RSA key in JWK form.
//!
//! Signs with RSA-PSS over SHA-256. The owner published on transactions is
//! the key modulus and the address is the base64url SHA-256 of it.

use crate::{AccountError, AccountInterface};
use async_trait::async_trait;
use ring::rand::SystemRandom;
use ring::signature::{RsaKeyPair, RSA_PSS_SHA256};
use serde::Deserialize;
use std::path::Path;
use transit_codec::{b64, transaction};
use transit_types::{ConfigSchema, Field, FieldType, LedgerTransaction, Schema};

/// Private key fields of an RSA JSON Web Key.
#[derive(Deserialize)]
struct Jwk {
	kty: String,
	n: String,
	e: String,
	d: String,
	p: String,
	q: String,
	dp: String,
	dq: String,
	qi: String,
}

pub struct LocalWallet {
	key_pair: RsaKeyPair,
	/// Base64url modulus.
	owner: String,
	address: String,
	rng: SystemRandom,
}

impl LocalWallet {
	/// Loads a wallet from JWK JSON text.
	pub fn from_jwk(json: &str) -> Result<Self, AccountError> {
		let jwk: Jwk = serde_json::from_str(json)
			.map_err(|e| AccountError::InvalidKey(format!("Invalid JWK: {}", e)))?;
		if jwk.kty != "RSA" {
			return Err(AccountError::InvalidKey(format!(
				"Unsupported key type {}",
				jwk.kty
			)));
		}

		let decode = |field: &str, value: &str| {
			b64::decode(value)
				.map_err(|e| AccountError::InvalidKey(format!("Invalid JWK field {}: {}", field, e)))
		};
		let n = decode("n", &jwk.n)?;
		let components = ring::rsa::KeyPairComponents {
			public_key: ring::rsa::PublicKeyComponents {
				n: n.clone(),
				e: decode("e", &jwk.e)?,
			},
			d: decode("d", &jwk.d)?,
			p: decode("p", &jwk.p)?,
			q: decode("q", &jwk.q)?,
			dP: decode("dp", &jwk.dp)?,
			dQ: decode("dq", &jwk.dq)?,
			qInv: decode("qi", &jwk.qi)?,
		};
		let key_pair = RsaKeyPair::from_components(&components)
			.map_err(|e| AccountError::InvalidKey(format!("Rejected RSA key: {}", e)))?;

		Ok(Self {
			key_pair,
			owner: b64::encode(&n),
			address: transaction::address(&n),
			rng: SystemRandom::new(),
		})
	}

	pub fn from_path(path: impl AsRef<Path>) -> Result<Self, AccountError> {
		let path = path.as_ref();
		let json = std::fs::read_to_string(path).map_err(|e| {
			AccountError::Config(format!("Cannot read key file {}: {}", path.display(), e))
		})?;
		Self::from_jwk(&json)
	}
}

/// Configuration schema for LocalWallet.
pub struct LocalWalletSchema;

impl ConfigSchema for LocalWalletSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), transit_types::ValidationError> {
		let schema = Schema::new(
			vec![Field::new("key_path", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(path) if !path.trim().is_empty() => Ok(()),
					_ => Err("key_path must not be empty".to_string()),
				}
			})],
			vec![],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalWalletSchema)
	}

	async fn address(&self) -> Result<String, AccountError> {
		Ok(self.address.clone())
	}

	async fn sign_transaction(
		&self,
		mut tx: LedgerTransaction,
	) -> Result<LedgerTransaction, AccountError> {
		tx.owner = self.owner.clone();
		let message = transaction::signature_data(&tx)
			.map_err(|e| AccountError::SigningFailed(format!("Cannot encode transaction: {}", e)))?;

		let mut signature = vec![0u8; self.key_pair.public().modulus_len()];
		self.key_pair
			.sign(&RSA_PSS_SHA256, &self.rng, &message, &mut signature)
			.map_err(|e| AccountError::SigningFailed(format!("RSA signing failed: {}", e)))?;

		transaction::attach_signature(&mut tx, &signature);
		Ok(tx)
	}
}

/// Creates a local wallet from configuration.
///
/// Configuration parameters:
/// - `key_path`: path of the JWK wallet file
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	LocalWalletSchema
		.validate(config)
		.map_err(|e| AccountError::Config(e.to_string()))?;

	let key_path = config
		.get("key_path")
		.and_then(|v| v.as_str())
		.ok_or_else(|| AccountError::Config("key_path is required".to_string()))?;

	Ok(Box::new(LocalWallet::from_path(key_path)?))
}

#[cfg(test)]
mod tests {
	use super::*;

	const WALLET: &str = include_str!("../../tests/fixtures/wallet.json");
	const WALLET_ADDRESS: &str = "oTD4KZSNvH3qEsbahmwsCyC0NKjDBu1INVv_7BlyCso";

	#[tokio::test]
	async fn test_address_from_modulus() {
		let wallet = LocalWallet::from_jwk(WALLET).unwrap();
		assert_eq!(wallet.address().await.unwrap(), WALLET_ADDRESS);
	}

	#[tokio::test]
	async fn test_signed_transfer_verifies() {
		let wallet = LocalWallet::from_jwk(WALLET).unwrap();
		let tx = LedgerTransaction::transfer(
			WALLET_ADDRESS,
			"100000",
			"1000",
			b64::encode([7u8; 48]),
		);

		let signed = wallet.sign_transaction(tx).await.unwrap();
		assert!(signed.is_signed());
		assert_eq!(b64::decode(&signed.owner).unwrap().len(), 512);
		transaction::verify(&signed).unwrap();

		let mut tampered = signed.clone();
		tampered.quantity = "999999".to_string();
		assert!(transaction::verify(&tampered).is_err());
	}

	#[test]
	fn test_rejects_bad_keys() {
		assert!(matches!(
			LocalWallet::from_jwk("{}"),
			Err(AccountError::InvalidKey(_))
		));
		let ec = WALLET.replacen("\"RSA\"", "\"EC\"", 1);
		assert!(LocalWallet::from_jwk(&ec).is_err());
	}

	#[test]
	fn test_factory_reads_key_path() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("wallet.json");
		std::fs::write(&path, WALLET).unwrap();

		let mut table = toml::map::Map::new();
		table.insert(
			"key_path".to_string(),
			toml::Value::String(path.to_string_lossy().to_string()),
		);
		assert!(create_account(&toml::Value::Table(table)).is_ok());

		let empty = toml::Value::Table(toml::map::Map::new());
		assert!(matches!(create_account(&empty), Err(AccountError::Config(_))));
	}
}
