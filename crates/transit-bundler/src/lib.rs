//! Client for bundler nodes.
//!
//! Every call takes the bundler's base URL because each order is served by
//! the bundler the staking contract picked for it.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use transit_types::{ConfigSchema, DataItemPostResponse, DataItemPutResponse};

/// Re-export implementations
pub mod implementations {
	pub mod http;
}

#[derive(Debug, Error)]
pub enum BundlerError {
	#[error("Data item not found")]
	NotFound,
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
pub trait BundlerInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Raw bytes of a stored data item.
	async fn get_data_item(&self, url: &str, id: &str) -> Result<Bytes, BundlerError>;

	/// The bundler's status document for an item, passed through untouched.
	async fn get_data_item_status(
		&self,
		url: &str,
		id: &str,
	) -> Result<serde_json::Value, BundlerError>;

	async fn post_data_item(
		&self,
		url: &str,
		item: Bytes,
	) -> Result<DataItemPostResponse, BundlerError>;

	/// Tells the bundler it has been paid for item `id` by `payment_id`.
	async fn put_data_item(
		&self,
		url: &str,
		id: &str,
		payment_id: &str,
	) -> Result<DataItemPutResponse, BundlerError>;
}

pub struct BundlerService {
	provider: Box<dyn BundlerInterface>,
}

impl BundlerService {
	pub fn new(provider: Box<dyn BundlerInterface>) -> Self {
		Self { provider }
	}

	pub async fn get_data_item(&self, url: &str, id: &str) -> Result<Bytes, BundlerError> {
		self.provider.get_data_item(url, id).await
	}

	pub async fn get_data_item_status(
		&self,
		url: &str,
		id: &str,
	) -> Result<serde_json::Value, BundlerError> {
		self.provider.get_data_item_status(url, id).await
	}

	pub async fn post_data_item(
		&self,
		url: &str,
		item: Bytes,
	) -> Result<DataItemPostResponse, BundlerError> {
		let size = item.len();
		let ack = self.provider.post_data_item(url, item).await?;
		tracing::info!(item_id = %ack.id, bundler = %url, size, "data item posted");
		Ok(ack)
	}

	pub async fn put_data_item(
		&self,
		url: &str,
		id: &str,
		payment_id: &str,
	) -> Result<DataItemPutResponse, BundlerError> {
		let ack = self.provider.put_data_item(url, id, payment_id).await?;
		tracing::info!(item_id = %id, payment_id = %payment_id, bundler = %url, "bundler notified of payment");
		Ok(ack)
	}
}

/// Adds `default_scheme` to URLs that have none and drops trailing slashes.
pub fn normalize_url(url: &str, default_scheme: &str) -> String {
	let url = url.trim().trim_end_matches('/');
	if url.starts_with("http://") || url.starts_with("https://") {
		url.to_string()
	} else {
		format!("{}://{}", default_scheme, url)
	}
}

/// Factory function to create a bundler client from its name and settings.
pub fn create_bundler(
	backend: &str,
	config: &toml::Value,
) -> Result<Box<dyn BundlerInterface>, BundlerError> {
	match backend {
		"http" => implementations::http::create_bundler(config),
		other => Err(BundlerError::Config(format!(
			"unknown bundler backend '{}'",
			other
		))),
	}
}
