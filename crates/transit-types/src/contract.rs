use serde::{Deserialize, Serialize};

/// Bundler selected by the staking contract for an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staker {
	/// Ledger address of the bundler.
	pub id: String,
	/// Base URL of the bundler node.
	pub url: String,
}

/// Body of an `initiate` call against a remote staking registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateRequest {
	pub id: String,
	pub size: u64,
}
