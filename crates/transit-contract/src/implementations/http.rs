//! Remote staking registry reached over HTTP.

use crate::{ContractError, ContractInterface};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use transit_types::{ConfigSchema, Field, FieldType, InitiateRequest, Schema, Staker};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct HttpRegistry {
	client: Client,
	endpoint: String,
}

impl HttpRegistry {
	pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ContractError> {
		let client = Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| ContractError::Config(format!("Failed to build HTTP client: {}", e)))?;
		Ok(Self {
			client,
			endpoint: endpoint.trim_end_matches('/').to_string(),
		})
	}
}

/// Configuration schema for HttpRegistry.
pub struct HttpRegistrySchema;

impl ConfigSchema for HttpRegistrySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), transit_types::ValidationError> {
		Schema::new(
			vec![Field::new("endpoint", FieldType::Url)],
			vec![Field::new(
				"timeout_secs",
				FieldType::Integer {
					min: Some(1),
					max: Some(600),
				},
			)],
		)
		.validate(config)
	}
}

#[async_trait]
impl ContractInterface for HttpRegistry {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpRegistrySchema)
	}

	async fn initiate(&self, id: &str, size: u64) -> Result<Staker, ContractError> {
		let response = self
			.client
			.post(format!("{}/initiate", self.endpoint))
			.json(&InitiateRequest {
				id: id.to_string(),
				size,
			})
			.send()
			.await
			.map_err(|e| ContractError::Network(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(ContractError::Rejected(format!("{}: {}", status, body)));
		}

		let staker: Staker = response
			.json()
			.await
			.map_err(|e| ContractError::Rejected(format!("invalid staker: {}", e)))?;
		if staker.id.is_empty() || staker.url.is_empty() {
			return Err(ContractError::NoStakers);
		}
		Ok(staker)
	}
}

/// Creates an HTTP registry client from configuration.
///
/// Configuration parameters:
/// - `endpoint`: base URL of the registry
/// - `timeout_secs`: per request timeout (default: 30)
pub fn create_contract(config: &toml::Value) -> Result<Box<dyn ContractInterface>, ContractError> {
	HttpRegistrySchema
		.validate(config)
		.map_err(|e| ContractError::Config(e.to_string()))?;

	let endpoint = config
		.get("endpoint")
		.and_then(|v| v.as_str())
		.ok_or_else(|| ContractError::Config("endpoint is required".to_string()))?;
	let timeout = config
		.get("timeout_secs")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECS);

	Ok(Box::new(HttpRegistry::new(endpoint, Duration::from_secs(timeout))?))
}

#[cfg(test)]
mod tests {
	use super::*;
	use wiremock::matchers::{body_json, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	#[tokio::test]
	async fn test_initiate_posts_item() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/initiate"))
			.and(body_json(serde_json::json!({"id": "item", "size": 1000})))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"id": "bundler-address",
				"url": "bundler.example"
			})))
			.mount(&server)
			.await;

		let registry = HttpRegistry::new(&server.uri(), Duration::from_secs(5)).unwrap();
		let staker = registry.initiate("item", 1000).await.unwrap();
		assert_eq!(staker.id, "bundler-address");
		assert_eq!(staker.url, "bundler.example");
	}

	#[tokio::test]
	async fn test_initiate_error_status() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/initiate"))
			.respond_with(ResponseTemplate::new(503))
			.mount(&server)
			.await;

		let registry = HttpRegistry::new(&server.uri(), Duration::from_secs(5)).unwrap();
		assert!(matches!(
			registry.initiate("item", 1).await,
			Err(ContractError::Rejected(_))
		));
	}
}
