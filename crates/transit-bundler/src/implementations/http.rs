use crate::{normalize_url, BundlerError, BundlerInterface};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use transit_types::{
	ConfigSchema, DataItemPostResponse, DataItemPutResponse, Field, FieldType, Schema,
};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Bundler client speaking the bundler REST API.
pub struct HttpBundler {
	client: Client,
	/// Scheme for bundler URLs registered without one.
	scheme: String,
}

impl HttpBundler {
	pub fn new(scheme: &str, timeout: Duration) -> Result<Self, BundlerError> {
		let client = Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| BundlerError::Config(format!("Failed to build HTTP client: {}", e)))?;
		Ok(Self {
			client,
			scheme: scheme.to_string(),
		})
	}

	fn endpoint(&self, url: &str, path: &str) -> String {
		format!("{}{}", normalize_url(url, &self.scheme), path)
	}

	async fn check(response: Result<Response, reqwest::Error>) -> Result<Response, BundlerError> {
		let response = response.map_err(|e| BundlerError::Network(e.to_string()))?;
		match response.status() {
			status if status.is_success() => Ok(response),
			StatusCode::NOT_FOUND => Err(BundlerError::NotFound),
			status => {
				let body = response.text().await.unwrap_or_default();
				Err(BundlerError::Status {
					status: status.as_u16(),
					body,
				})
			}
		}
	}
}

/// Configuration schema for HttpBundler.
pub struct HttpBundlerSchema;

impl ConfigSchema for HttpBundlerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), transit_types::ValidationError> {
		Schema::new(
			vec![],
			vec![
				Field::new("scheme", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some("http") | Some("https") => Ok(()),
						_ => Err("scheme must be http or https".to_string()),
					}
				}),
				Field::new(
					"timeout_secs",
					FieldType::Integer {
						min: Some(1),
						max: Some(3600),
					},
				),
			],
		)
		.validate(config)
	}
}

#[async_trait]
impl BundlerInterface for HttpBundler {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpBundlerSchema)
	}

	async fn get_data_item(&self, url: &str, id: &str) -> Result<Bytes, BundlerError> {
		let response =
			Self::check(self.client.get(self.endpoint(url, &format!("/tx/{}", id))).send().await)
				.await?;
		response
			.bytes()
			.await
			.map_err(|e| BundlerError::Network(e.to_string()))
	}

	async fn get_data_item_status(
		&self,
		url: &str,
		id: &str,
	) -> Result<serde_json::Value, BundlerError> {
		let response = Self::check(
			self.client
				.get(self.endpoint(url, &format!("/tx/{}/status", id)))
				.send()
				.await,
		)
		.await?;
		response
			.json()
			.await
			.map_err(|e| BundlerError::Decode(e.to_string()))
	}

	async fn post_data_item(
		&self,
		url: &str,
		item: Bytes,
	) -> Result<DataItemPostResponse, BundlerError> {
		let response = Self::check(
			self.client
				.post(self.endpoint(url, "/tx"))
				.header(CONTENT_TYPE, "application/octet-stream")
				.body(item)
				.send()
				.await,
		)
		.await?;
		response
			.json()
			.await
			.map_err(|e| BundlerError::Decode(e.to_string()))
	}

	async fn put_data_item(
		&self,
		url: &str,
		id: &str,
		payment_id: &str,
	) -> Result<DataItemPutResponse, BundlerError> {
		let response = Self::check(
			self.client
				.put(self.endpoint(url, &format!("/tx/{}/{}", id, payment_id)))
				.send()
				.await,
		)
		.await?;
		let body = response
			.bytes()
			.await
			.map_err(|e| BundlerError::Network(e.to_string()))?;

		// Some bundlers acknowledge with an empty body.
		if body.iter().all(u8::is_ascii_whitespace) {
			return Ok(DataItemPutResponse {
				id: id.to_string(),
				payment_id: payment_id.to_string(),
			});
		}
		serde_json::from_slice(&body).map_err(|e| BundlerError::Decode(e.to_string()))
	}
}

/// Creates a bundler client from configuration.
///
/// Configuration parameters:
/// - `scheme`: scheme added to bundler URLs without one (default: "https")
/// - `timeout_secs`: per request timeout (default: 60)
pub fn create_bundler(config: &toml::Value) -> Result<Box<dyn BundlerInterface>, BundlerError> {
	HttpBundlerSchema
		.validate(config)
		.map_err(|e| BundlerError::Config(e.to_string()))?;

	let scheme = config
		.get("scheme")
		.and_then(|v| v.as_str())
		.unwrap_or("https");
	let timeout = config
		.get("timeout_secs")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECS);

	Ok(Box::new(HttpBundler::new(scheme, Duration::from_secs(timeout))?))
}

#[cfg(test)]
mod tests {
	use super::*;
	use wiremock::matchers::{body_bytes, header, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn bundler() -> HttpBundler {
		HttpBundler::new("http", Duration::from_secs(5)).unwrap()
	}

	#[tokio::test]
	async fn test_post_data_item() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/tx"))
			.and(header("content-type", "application/octet-stream"))
			.and(body_bytes(b"item-bytes".to_vec()))
			.respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
				"id": "item",
				"owner": "owner",
				"dataCaches": ["cache"],
				"deadlineHeight": 10,
				"fastFinalityIndexes": [],
				"version": "1.0.0"
			})))
			.mount(&server)
			.await;

		let ack = bundler()
			.post_data_item(&server.uri(), Bytes::from_static(b"item-bytes"))
			.await
			.unwrap();
		assert_eq!(ack.id, "item");
		assert_eq!(ack.deadline_height, 10);
	}

	#[tokio::test]
	async fn test_url_without_scheme_uses_default() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/tx/item"))
			.respond_with(ResponseTemplate::new(200).set_body_bytes(b"raw".to_vec()))
			.mount(&server)
			.await;

		let host = server.uri().trim_start_matches("http://").to_string();
		let bytes = bundler().get_data_item(&host, "item").await.unwrap();
		assert_eq!(&bytes[..], b"raw");
	}

	#[tokio::test]
	async fn test_missing_item_and_server_error() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/tx/broken/status"))
			.respond_with(ResponseTemplate::new(500).set_body_string("down"))
			.mount(&server)
			.await;

		let client = bundler();
		assert!(matches!(
			client.get_data_item(&server.uri(), "missing").await,
			Err(BundlerError::NotFound)
		));
		assert!(matches!(
			client.get_data_item_status(&server.uri(), "broken").await,
			Err(BundlerError::Status { status: 500, .. })
		));
	}

	#[tokio::test]
	async fn test_put_data_item() {
		let server = MockServer::start().await;
		Mock::given(method("PUT"))
			.and(path("/tx/item/payment"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"id": "item",
				"payment_id": "payment"
			})))
			.mount(&server)
			.await;
		Mock::given(method("PUT"))
			.and(path("/tx/quiet/payment"))
			.respond_with(ResponseTemplate::new(202))
			.mount(&server)
			.await;

		let client = bundler();
		let ack = client
			.put_data_item(&server.uri(), "item", "payment")
			.await
			.unwrap();
		assert_eq!(ack.payment_id, "payment");

		let quiet = client
			.put_data_item(&server.uri(), "quiet", "payment")
			.await
			.unwrap();
		assert_eq!(quiet.id, "quiet");
	}

	#[test]
	fn test_schema_rejects_unknown_scheme() {
		let config: toml::Value = toml::from_str("scheme = \"ftp\"").unwrap();
		assert!(create_bundler(&config).is_err());
	}
}
