use crate::pricing::PriceError;
use thiserror::Error;
use transit_account::AccountError;
use transit_bundler::BundlerError;
use transit_ledger::LedgerError;
use transit_storage::StorageError;

/// Failures surfaced to API clients. The message is what the client sees.
#[derive(Debug, Error)]
pub enum IntakeError {
	/// Malformed request.
	#[error("{0}")]
	Validation(String),
	/// Ledger, bundler or staking contract unavailable or refusing.
	#[error("{0}")]
	Dependency(String),
	#[error("{0}")]
	Persistence(String),
	/// Request clashes with the stored order.
	#[error("{0}")]
	Conflict(String),
	#[error("{0}")]
	NotFound(String),
	/// Bad data from a dependency that should never produce it.
	#[error("{0}")]
	Internal(String),
}

/// Failures inside scheduler passes. Never surfaced, only logged.
#[derive(Debug, Error)]
pub enum ReconcileError {
	#[error("storage: {0}")]
	Storage(#[from] StorageError),
	#[error("ledger: {0}")]
	Ledger(#[from] LedgerError),
	#[error("bundler: {0}")]
	Bundler(#[from] BundlerError),
	#[error("account: {0}")]
	Account(#[from] AccountError),
	#[error("price: {0}")]
	Price(#[from] PriceError),
	#[error("timed out after {0}s")]
	Timeout(u64),
}
