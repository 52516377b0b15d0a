//! Ledger access for the transit service.
//!
//! The ledger quotes storage prices, reports client payment transactions and
//! their confirmation depth, and accepts the transfers the service signs to
//! pay bundlers.

use async_trait::async_trait;
use thiserror::Error;
use transit_types::{ConfigSchema, LedgerTransaction, TransactionStatus};

/// Re-export implementations
pub mod implementations {
	pub mod gateway;
}

#[derive(Debug, Error)]
pub enum LedgerError {
	#[error("Transaction not found")]
	NotFound,
	/// Known to the ledger but not yet mined.
	#[error("Transaction pending")]
	Pending,
	#[error("Network error: {0}")]
	Network(String),
	#[error("Unexpected status {status}: {body}")]
	Status { status: u16, body: String },
	#[error("Decode error: {0}")]
	Decode(String),
	#[error("Configuration error: {0}")]
	Config(String),
}

#[async_trait]
pub trait LedgerInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Base price in the ledger's smallest unit for storing `bytes` bytes.
	///
	/// A `target` adds the cost of creating that wallet if it is new.
	async fn price(&self, bytes: u64, target: Option<&str>) -> Result<String, LedgerError>;

	async fn get_transaction(&self, id: &str) -> Result<LedgerTransaction, LedgerError>;

	async fn get_transaction_status(&self, id: &str) -> Result<TransactionStatus, LedgerError>;

	/// Recent block or transaction id to use as `last_tx`.
	async fn anchor(&self) -> Result<String, LedgerError>;

	async fn submit_transaction(&self, tx: &LedgerTransaction) -> Result<(), LedgerError>;
}

pub struct LedgerService {
	provider: Box<dyn LedgerInterface>,
}

impl LedgerService {
	pub fn new(provider: Box<dyn LedgerInterface>) -> Self {
		Self { provider }
	}

	pub async fn price(&self, bytes: u64, target: Option<&str>) -> Result<String, LedgerError> {
		self.provider.price(bytes, target).await
	}

	pub async fn get_transaction(&self, id: &str) -> Result<LedgerTransaction, LedgerError> {
		self.provider.get_transaction(id).await
	}

	pub async fn get_transaction_status(
		&self,
		id: &str,
	) -> Result<TransactionStatus, LedgerError> {
		self.provider.get_transaction_status(id).await
	}

	pub async fn anchor(&self) -> Result<String, LedgerError> {
		self.provider.anchor().await
	}

	/// Returns true if the ledger knows `id`, mined or pending.
	pub async fn is_known(&self, id: &str) -> Result<bool, LedgerError> {
		match self.provider.get_transaction_status(id).await {
			Ok(_) | Err(LedgerError::Pending) => Ok(true),
			Err(LedgerError::NotFound) => Ok(false),
			Err(e) => Err(e),
		}
	}

	pub async fn submit_transaction(&self, tx: &LedgerTransaction) -> Result<(), LedgerError> {
		self.provider.submit_transaction(tx).await?;
		tracing::info!(
			tx_id = %tx.id,
			target = %tx.target,
			quantity = %tx.quantity,
			"transaction submitted"
		);
		Ok(())
	}
}

/// Factory function to create a ledger client from its name and settings.
pub fn create_ledger(
	backend: &str,
	config: &toml::Value,
) -> Result<Box<dyn LedgerInterface>, LedgerError> {
	match backend {
		"gateway" => implementations::gateway::create_ledger(config),
		other => Err(LedgerError::Config(format!(
			"unknown ledger backend '{}'",
			other
		))),
	}
}
