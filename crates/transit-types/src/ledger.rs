//! Ledger transaction types as exchanged with a gateway node.
//!
//! Binary fields are carried as unpadded base64url strings and amounts as
//! decimal strings, matching the gateway's JSON encoding.

use serde::{Deserialize, Serialize};

/// Transaction format produced by the service wallet.
pub const TRANSACTION_FORMAT: u8 = 2;

/// A name/value tag, both base64url encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTag {
	pub name: String,
	pub value: String,
}

/// A ledger transaction as returned by `GET /tx/{id}` and accepted by `POST /tx`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerTransaction {
	pub format: u8,
	pub id: String,
	pub last_tx: String,
	pub owner: String,
	pub tags: Vec<LedgerTag>,
	/// Recipient address, empty for data-only transactions.
	pub target: String,
	/// Transferred amount in the ledger's smallest unit.
	pub quantity: String,
	pub data: String,
	pub data_size: String,
	pub data_root: String,
	/// Fee paid to miners.
	pub reward: String,
	pub signature: String,
}

impl LedgerTransaction {
	/// Builds an unsigned value transfer with no data.
	pub fn transfer(
		target: impl Into<String>,
		quantity: impl Into<String>,
		reward: impl Into<String>,
		last_tx: impl Into<String>,
	) -> Self {
		Self {
			format: TRANSACTION_FORMAT,
			target: target.into(),
			quantity: quantity.into(),
			reward: reward.into(),
			last_tx: last_tx.into(),
			data_size: "0".to_string(),
			..Default::default()
		}
	}

	pub fn is_signed(&self) -> bool {
		!self.signature.is_empty() && !self.id.is_empty()
	}
}

/// Confirmation state of a mined transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatus {
	pub block_height: u64,
	pub block_indep_hash: String,
	pub number_of_confirmations: u64,
}
