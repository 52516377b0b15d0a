//! Staking contract access.
//!
//! The staking contract decides which bundler services an upload. Given an
//! item id and size it returns the chosen bundler's address and URL.

use async_trait::async_trait;
use thiserror::Error;
use transit_types::{ConfigSchema, Staker};

/// Re-export implementations
pub mod implementations {
	pub mod http;
	pub mod registry;
}

#[derive(Debug, Error)]
pub enum ContractError {
	#[error("No stakers available")]
	NoStakers,
	#[error("Network error: {0}")]
	Network(String),
	#[error("Contract rejected request: {0}")]
	Rejected(String),
	#[error("Configuration error: {0}")]
	Config(String),
}

#[async_trait]
pub trait ContractInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Picks the bundler that will store item `id` of `size` bytes.
	async fn initiate(&self, id: &str, size: u64) -> Result<Staker, ContractError>;
}

pub struct ContractService {
	provider: Box<dyn ContractInterface>,
}

impl ContractService {
	pub fn new(provider: Box<dyn ContractInterface>) -> Self {
		Self { provider }
	}

	pub async fn initiate(&self, id: &str, size: u64) -> Result<Staker, ContractError> {
		let staker = self.provider.initiate(id, size).await?;
		tracing::debug!(item_id = %id, staker = %staker.id, url = %staker.url, "staker selected");
		Ok(staker)
	}
}

/// Factory function to create a contract client from its name and settings.
pub fn create_contract(
	backend: &str,
	config: &toml::Value,
) -> Result<Box<dyn ContractInterface>, ContractError> {
	match backend {
		"static" => implementations::registry::create_contract(config),
		"http" => implementations::http::create_contract(config),
		other => Err(ContractError::Config(format!(
			"unknown contract backend '{}'",
			other
		))),
	}
}
