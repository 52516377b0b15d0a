//! HTTP gateway client.
//!
//! Talks to a gateway node's public REST API. A `202 Accepted` on a
//! transaction lookup means the transaction is in the mempool.

use crate::{LedgerError, LedgerInterface};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use transit_types::{ConfigSchema, Field, FieldType, LedgerTransaction, Schema, TransactionStatus};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct GatewayLedger {
	client: Client,
	gateway: String,
}

impl GatewayLedger {
	pub fn new(gateway: &str, timeout: Duration) -> Result<Self, LedgerError> {
		let client = Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| LedgerError::Config(format!("Failed to build HTTP client: {}", e)))?;

		Ok(Self {
			client,
			gateway: gateway.trim_end_matches('/').to_string(),
		})
	}

	async fn get(&self, path: &str) -> Result<Response, LedgerError> {
		let url = format!("{}{}", self.gateway, path);
		tracing::debug!(%url, "gateway request");
		let response = self
			.client
			.get(&url)
			.send()
			.await
			.map_err(|e| LedgerError::Network(e.to_string()))?;

		match response.status() {
			StatusCode::OK => Ok(response),
			StatusCode::ACCEPTED => Err(LedgerError::Pending),
			StatusCode::NOT_FOUND => Err(LedgerError::NotFound),
			status => Err(unexpected(status, response).await),
		}
	}

	async fn get_text(&self, path: &str) -> Result<String, LedgerError> {
		let response = self.get(path).await?;
		let text = response
			.text()
			.await
			.map_err(|e| LedgerError::Network(e.to_string()))?;
		Ok(text.trim().to_string())
	}
}

async fn unexpected(status: StatusCode, response: Response) -> LedgerError {
	let body = response.text().await.unwrap_or_default();
	LedgerError::Status {
		status: status.as_u16(),
		body,
	}
}

/// Configuration schema for GatewayLedger.
pub struct GatewayLedgerSchema;

impl ConfigSchema for GatewayLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), transit_types::ValidationError> {
		let schema = Schema::new(
			vec![Field::new("gateway", FieldType::Url)],
			vec![Field::new(
				"timeout_secs",
				FieldType::Integer {
					min: Some(1),
					max: Some(600),
				},
			)],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl LedgerInterface for GatewayLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(GatewayLedgerSchema)
	}

	async fn price(&self, bytes: u64, target: Option<&str>) -> Result<String, LedgerError> {
		let path = match target {
			Some(target) => format!("/price/{}/{}", bytes, target),
			None => format!("/price/{}", bytes),
		};
		let price = self.get_text(&path).await?;
		if price.is_empty() || !price.bytes().all(|b| b.is_ascii_digit()) {
			return Err(LedgerError::Decode(format!("invalid price '{}'", price)));
		}
		Ok(price)
	}

	async fn get_transaction(&self, id: &str) -> Result<LedgerTransaction, LedgerError> {
		self.get(&format!("/tx/{}", id))
			.await?
			.json()
			.await
			.map_err(|e| LedgerError::Decode(e.to_string()))
	}

	async fn get_transaction_status(&self, id: &str) -> Result<TransactionStatus, LedgerError> {
		self.get(&format!("/tx/{}/status", id))
			.await?
			.json()
			.await
			.map_err(|e| LedgerError::Decode(e.to_string()))
	}

	async fn anchor(&self) -> Result<String, LedgerError> {
		let anchor = self.get_text("/tx_anchor").await?;
		if anchor.is_empty() {
			return Err(LedgerError::Decode("empty anchor".to_string()));
		}
		Ok(anchor)
	}

	async fn submit_transaction(&self, tx: &LedgerTransaction) -> Result<(), LedgerError> {
		let response = self
			.client
			.post(format!("{}/tx", self.gateway))
			.json(tx)
			.send()
			.await
			.map_err(|e| LedgerError::Network(e.to_string()))?;

		match response.status() {
			// 208: the gateway already has this transaction.
			StatusCode::OK | StatusCode::ALREADY_REPORTED => Ok(()),
			status => Err(unexpected(status, response).await),
		}
	}
}

/// Creates a gateway client from configuration.
///
/// Configuration parameters:
/// - `gateway`: base URL of the gateway node
/// - `timeout_secs`: per request timeout (default: 30)
pub fn create_ledger(config: &toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError> {
	GatewayLedgerSchema
		.validate(config)
		.map_err(|e| LedgerError::Config(e.to_string()))?;

	let gateway = config
		.get("gateway")
		.and_then(|v| v.as_str())
		.ok_or_else(|| LedgerError::Config("gateway is required".to_string()))?;
	let timeout = config
		.get("timeout_secs")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECS);

	Ok(Box::new(GatewayLedger::new(
		gateway,
		Duration::from_secs(timeout),
	)?))
}

#[cfg(test)]
mod tests {
	use super::*;
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	async fn ledger(server: &MockServer) -> GatewayLedger {
		GatewayLedger::new(&server.uri(), Duration::from_secs(5)).unwrap()
	}

	#[tokio::test]
	async fn test_price_with_and_without_target() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/price/1000"))
			.respond_with(ResponseTemplate::new(200).set_body_string("1000"))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/price/0/bundler"))
			.respond_with(ResponseTemplate::new(200).set_body_string("42\n"))
			.mount(&server)
			.await;

		let ledger = ledger(&server).await;
		assert_eq!(ledger.price(1000, None).await.unwrap(), "1000");
		assert_eq!(ledger.price(0, Some("bundler")).await.unwrap(), "42");
	}

	#[tokio::test]
	async fn test_non_numeric_price_rejected() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/price/5"))
			.respond_with(ResponseTemplate::new(200).set_body_string("cheap"))
			.mount(&server)
			.await;

		assert!(matches!(
			ledger(&server).await.price(5, None).await,
			Err(LedgerError::Decode(_))
		));
	}

	#[tokio::test]
	async fn test_transaction_lookup_states() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/tx/mined"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"format": 2,
				"id": "mined",
				"target": "service",
				"quantity": "100100",
				"reward": "10"
			})))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/tx/pending"))
			.respond_with(ResponseTemplate::new(202).set_body_string("Pending"))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/tx/broken"))
			.respond_with(ResponseTemplate::new(500).set_body_string("boom"))
			.mount(&server)
			.await;

		let ledger = ledger(&server).await;
		let tx = ledger.get_transaction("mined").await.unwrap();
		assert_eq!(tx.quantity, "100100");
		assert!(matches!(
			ledger.get_transaction("pending").await,
			Err(LedgerError::Pending)
		));
		assert!(matches!(
			ledger.get_transaction("unknown").await,
			Err(LedgerError::NotFound)
		));
		assert!(matches!(
			ledger.get_transaction("broken").await,
			Err(LedgerError::Status { status: 500, .. })
		));
	}

	#[tokio::test]
	async fn test_status_and_anchor() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/tx/paid/status"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"block_height": 1400000,
				"block_indep_hash": "hash",
				"number_of_confirmations": 11
			})))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/tx_anchor"))
			.respond_with(ResponseTemplate::new(200).set_body_string("anchor-value"))
			.mount(&server)
			.await;

		let ledger = ledger(&server).await;
		let status = ledger.get_transaction_status("paid").await.unwrap();
		assert_eq!(status.number_of_confirmations, 11);
		assert_eq!(ledger.anchor().await.unwrap(), "anchor-value");
	}

	#[tokio::test]
	async fn test_submit_and_is_known() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/tx"))
			.respond_with(ResponseTemplate::new(200))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/tx/settled/status"))
			.respond_with(ResponseTemplate::new(202))
			.mount(&server)
			.await;

		let service = crate::LedgerService::new(Box::new(ledger(&server).await));
		let tx = LedgerTransaction::transfer("bundler", "1", "1", "anchor");
		service.submit_transaction(&tx).await.unwrap();
		assert!(service.is_known("settled").await.unwrap());
		assert!(!service.is_known("never-sent").await.unwrap());
	}

	#[tokio::test]
	async fn test_rejected_submission() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/tx"))
			.respond_with(ResponseTemplate::new(400).set_body_string("invalid signature"))
			.mount(&server)
			.await;

		let tx = LedgerTransaction::transfer("bundler", "1", "1", "anchor");
		match ledger(&server).await.submit_transaction(&tx).await {
			Err(LedgerError::Status { status, body }) => {
				assert_eq!(status, 400);
				assert_eq!(body, "invalid signature");
			}
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn test_factory_requires_gateway() {
		let empty = toml::Value::Table(toml::map::Map::new());
		assert!(matches!(create_ledger(&empty), Err(LedgerError::Config(_))));
	}
}
