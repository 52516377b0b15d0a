use serde::{Deserialize, Serialize};

/// Acknowledgment returned by a bundler after `POST /tx`.
///
/// Fields this service does not know about are kept in `extra` so the
/// acknowledgment can be relayed to the client unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataItemPostResponse {
	pub id: String,
	#[serde(default)]
	pub owner: String,
	#[serde(default)]
	pub data_caches: Vec<String>,
	#[serde(default)]
	pub deadline_height: u64,
	#[serde(default)]
	pub fast_finality_indexes: Vec<String>,
	#[serde(default)]
	pub version: String,
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Acknowledgment returned by a bundler after `PUT /tx/{id}/{payment_id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataItemPutResponse {
	pub id: String,
	#[serde(alias = "paymentId")]
	pub payment_id: String,
}
