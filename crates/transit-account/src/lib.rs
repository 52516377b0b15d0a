//! Service wallet for the transit service.
//!
//! The wallet receives client payments and signs the transfers that pay
//! bundlers once an order's payment is confirmed.

use async_trait::async_trait;
use thiserror::Error;
use transit_types::{ConfigSchema, LedgerTransaction};

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Configuration error: {0}")]
	Config(String),
}

#[async_trait]
pub trait AccountInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Ledger address payments must be sent to.
	async fn address(&self) -> Result<String, AccountError>;

	/// Fills in owner, signature and id of `tx`.
	async fn sign_transaction(
		&self,
		tx: LedgerTransaction,
	) -> Result<LedgerTransaction, AccountError>;
}

pub struct AccountService {
	provider: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(provider: Box<dyn AccountInterface>) -> Self {
		Self { provider }
	}

	pub async fn get_address(&self) -> Result<String, AccountError> {
		self.provider.address().await
	}

	pub async fn sign(&self, tx: LedgerTransaction) -> Result<LedgerTransaction, AccountError> {
		let signed = self.provider.sign_transaction(tx).await?;
		tracing::debug!(tx_id = %signed.id, target = %signed.target, "transaction signed");
		Ok(signed)
	}
}

/// Factory function to create an account provider from its name and settings.
pub fn create_account(
	backend: &str,
	config: &toml::Value,
) -> Result<Box<dyn AccountInterface>, AccountError> {
	match backend {
		"local" => implementations::local::create_account(config),
		other => Err(AccountError::Config(format!(
			"unknown account backend '{}'",
			other
		))),
	}
}
