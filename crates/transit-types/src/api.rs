//! Response bodies for the public HTTP API.

use serde::{Deserialize, Serialize};

/// Error body returned for every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub code: u16,
	pub message: String,
}

/// Body of `GET /price/{bytes}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceResponse {
	/// Amount the client must pay, fee included.
	pub price: String,
	/// Address the payment must be sent to.
	pub address: String,
}

/// Body of `PUT /tx/{id}/{payment_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
	pub id: String,
	pub payment_id: String,
}

/// Body of `GET /`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
	pub name: String,
	pub version: String,
}
