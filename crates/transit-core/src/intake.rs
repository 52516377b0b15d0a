//! Request handling behind the public HTTP API.
//!
//! Every operation returns an [`IntakeError`] whose message is safe to show
//! to clients. Causes from dependencies are logged here and not passed on.

use crate::error::IntakeError;
use crate::media::{self, OCTET_STREAM};
use crate::pricing::price_with_fee;
use crate::{Dependencies, EventBus};
use bytes::Bytes;
use tracing::instrument;
use transit_codec::{b64, DataItem};
use transit_storage::StorageError;
use transit_types::{
	DataItemPostResponse, Order, OrderEvent, OrderPatch, OrderStatus, PaymentResponse,
	PriceResponse, TransitEvent,
};

/// Fields of a stored data item exposed by `GET /tx/{id}/{field}`.
pub const ITEM_FIELDS: [&str; 5] = ["owner", "signature", "target", "anchor", "tags"];

pub struct Intake {
	deps: Dependencies,
	event_bus: EventBus,
	max_data_size: u64,
}

impl Intake {
	pub fn new(deps: Dependencies, event_bus: EventBus, max_data_size: u64) -> Self {
		Self {
			deps,
			event_bus,
			max_data_size,
		}
	}

	/// Checks upload headers and returns the declared length.
	pub fn validate_headers(
		&self,
		content_type: Option<&str>,
		content_length: Option<&str>,
	) -> Result<u64, IntakeError> {
		let (Some(content_type), Some(content_length)) = (content_type, content_length) else {
			return Err(IntakeError::Validation(
				"required header(s) - content-type, content-length".into(),
			));
		};
		if content_type.trim() != OCTET_STREAM {
			return Err(IntakeError::Validation(
				"required header(s) - content-type: application/octet-stream".into(),
			));
		}
		let range = || {
			IntakeError::Validation(format!(
				"content-length: supported range 1B - {}B",
				self.max_data_size
			))
		};
		let declared: u64 = content_length.trim().parse().map_err(|_| range())?;
		if declared == 0 || declared > self.max_data_size {
			return Err(range());
		}
		Ok(declared)
	}

	/// Accepts a signed data item, hands it to a bundler and opens an order.
	///
	/// Returns the bundler's acknowledgment unchanged.
	#[instrument(skip_all, fields(size = body.len()))]
	pub async fn upload(
		&self,
		content_type: Option<&str>,
		content_length: Option<&str>,
		body: Bytes,
	) -> Result<DataItemPostResponse, IntakeError> {
		let declared = self.validate_headers(content_type, content_length)?;
		let size = body.len() as u64;
		if size != declared {
			return Err(IntakeError::Validation(format!(
				"content-length, body: length mismatch ({}, {})",
				declared, size
			)));
		}

		let item = DataItem::decode(body.clone()).map_err(|e| {
			tracing::debug!(error = %e, "data item rejected");
			IntakeError::Validation("failed to decode data item".into())
		})?;
		item.verify().map_err(|e| {
			tracing::debug!(error = %e, "data item signature rejected");
			IntakeError::Validation("failed to verify data item".into())
		})?;
		let id = item.id();

		// Duplicates racing past this check are rejected by the insert below.
		if self.deps.storage.get_order(&id).await.is_ok() {
			return Err(IntakeError::Conflict("data item already exists".into()));
		}

		let staker = self.deps.contract.initiate(&id, size).await.map_err(|e| {
			tracing::warn!(item_id = %id, error = %e, "staking contract did not assign a bundler");
			IntakeError::Dependency("failed to post to bundler".into())
		})?;

		let ack = self
			.deps
			.bundler
			.post_data_item(&staker.url, body)
			.await
			.map_err(|e| {
				tracing::warn!(item_id = %id, bundler = %staker.url, error = %e, "bundler upload failed");
				IntakeError::Dependency("failed to post to bundler".into())
			})?;

		let order = Order::new(&id, &staker.url, &staker.id, size);
		match self.deps.storage.create_order(&order).await {
			Ok(()) => {}
			Err(StorageError::AlreadyExists(_)) => {
				return Err(IntakeError::Conflict("data item already exists".into()));
			}
			Err(e) => {
				tracing::warn!(
					item_id = %id,
					bundler = %staker.url,
					error = %e,
					"order not stored, bundler keeps an orphaned copy"
				);
				return Err(IntakeError::Persistence("failed to create order".into()));
			}
		}

		tracing::info!(item_id = %id, bundler = %staker.url, size, "order created");
		self.event_bus
			.publish(TransitEvent::Order(OrderEvent::Created {
				order_id: id,
				bundler: staker.url,
				size,
			}));

		Ok(ack)
	}

	/// Records the client's payment transaction and queues the order.
	///
	/// Repeating the call with the same payment id is a no-op.
	#[instrument(skip(self))]
	pub async fn record_payment(
		&self,
		id: &str,
		payment_id: &str,
	) -> Result<PaymentResponse, IntakeError> {
		if payment_id.trim().is_empty() {
			return Err(IntakeError::Validation("payment id is required".into()));
		}
		let order = self.find_order(id).await?;

		match order.transaction_id.as_deref() {
			Some(existing) if existing != payment_id => {
				return Err(IntakeError::Conflict(
					"a different payment is already recorded".into(),
				));
			}
			_ => {}
		}
		if !matches!(order.status, OrderStatus::Created | OrderStatus::Queued) {
			return Err(IntakeError::Conflict(format!(
				"order is {}, payments are no longer accepted",
				order.status
			)));
		}

		let patch = OrderPatch::new()
			.transaction_id(payment_id)
			.status(OrderStatus::Queued);
		self.deps
			.storage
			.update_order(id, &patch)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => IntakeError::NotFound("order not found".into()),
				StorageError::InvalidTransition(e) => IntakeError::Conflict(e.to_string()),
				e => {
					tracing::error!(order_id = %id, error = %e, "failed to record payment");
					IntakeError::Persistence("failed to update order".into())
				}
			})?;

		if order.transaction_id.is_none() {
			tracing::info!(order_id = %id, transaction_id = %payment_id, "payment recorded");
			self.event_bus
				.publish(TransitEvent::Order(OrderEvent::Queued {
					order_id: id.to_string(),
					transaction_id: payment_id.to_string(),
				}));
		}

		Ok(PaymentResponse {
			id: id.to_string(),
			payment_id: payment_id.to_string(),
		})
	}

	/// Raw bytes of a data item, fetched from its bundler.
	pub async fn get_item(&self, id: &str) -> Result<Bytes, IntakeError> {
		let order = self.find_order(id).await?;
		self.deps
			.bundler
			.get_data_item(&order.url, id)
			.await
			.map_err(|e| {
				tracing::warn!(order_id = %id, bundler = %order.url, error = %e, "failed to fetch data item");
				IntakeError::Dependency("failed to fetch data item".into())
			})
	}

	/// The bundler's status document for a data item.
	pub async fn get_status(&self, id: &str) -> Result<serde_json::Value, IntakeError> {
		let order = self.find_order(id).await?;
		self.deps
			.bundler
			.get_data_item_status(&order.url, id)
			.await
			.map_err(|e| {
				tracing::warn!(order_id = %id, bundler = %order.url, error = %e, "failed to fetch data item status");
				IntakeError::Dependency("failed to fetch data item status".into())
			})
	}

	/// Payload of a data item and the content type to serve it with.
	pub async fn get_data(
		&self,
		id: &str,
		mime_type: Option<&str>,
		accept: Option<&str>,
	) -> Result<(String, Bytes), IntakeError> {
		let item = self.decoded(id).await?;
		let content_type = media::resolve(mime_type, accept, item.tag("Content-Type"), &item.data);
		Ok((content_type, item.data))
	}

	/// One decoded field of a data item as JSON.
	///
	/// Binary fields are base64url strings, absent target and anchor are
	/// empty strings.
	pub async fn get_field(&self, id: &str, field: &str) -> Result<serde_json::Value, IntakeError> {
		if !ITEM_FIELDS.contains(&field) {
			return Err(IntakeError::Validation("field not found".into()));
		}
		let item = self.decoded(id).await?;
		let optional = |value: &Option<Vec<u8>>| value.as_ref().map(|v| b64::encode(v)).unwrap_or_default();

		let value = match field {
			"owner" => serde_json::Value::String(b64::encode(&item.owner)),
			"signature" => serde_json::Value::String(b64::encode(&item.signature)),
			"target" => serde_json::Value::String(optional(&item.target)),
			"anchor" => serde_json::Value::String(optional(&item.anchor)),
			_ => serde_json::to_value(&item.tags)
				.map_err(|e| IntakeError::Internal(e.to_string()))?,
		};
		Ok(value)
	}

	/// Quote for storing `bytes` bytes, fee included.
	pub async fn price(&self, bytes: &str) -> Result<PriceResponse, IntakeError> {
		let size = bytes
			.parse::<u64>()
			.ok()
			.filter(|n| (1..=u64::from(u32::MAX)).contains(n))
			.ok_or_else(|| {
				IntakeError::Validation("byte size should be between 1 and 2^32-1".into())
			})?;

		let base = self.deps.ledger.price(size, None).await.map_err(|e| {
			tracing::warn!(bytes = size, error = %e, "ledger price lookup failed");
			IntakeError::Dependency("failed to fetch price".into())
		})?;
		let price = price_with_fee(&base).map_err(|e| {
			tracing::warn!(bytes = size, quote = %base, error = %e, "ledger returned an unusable price");
			IntakeError::Dependency("failed to fetch price".into())
		})?;
		let address = self.deps.account.get_address().await.map_err(|e| {
			tracing::error!(error = %e, "service wallet unavailable");
			IntakeError::Internal("failed to load service address".into())
		})?;

		Ok(PriceResponse { price, address })
	}

	async fn find_order(&self, id: &str) -> Result<Order, IntakeError> {
		self.deps.storage.get_order(id).await.map_err(|e| match e {
			StorageError::NotFound => IntakeError::NotFound("data item not found".into()),
			e => {
				tracing::error!(order_id = %id, error = %e, "order lookup failed");
				IntakeError::Persistence("failed to load order".into())
			}
		})
	}

	async fn decoded(&self, id: &str) -> Result<DataItem, IntakeError> {
		let raw = self.get_item(id).await?;
		DataItem::decode(raw).map_err(|e| {
			tracing::error!(order_id = %id, error = %e, "bundler returned an undecodable item");
			IntakeError::Internal("failed to decode data item".into())
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{harness, BUNDLER_ADDRESS, BUNDLER_URL, SERVICE_ADDRESS};
	use ed25519_dalek::{Signer, SigningKey};
	use std::sync::atomic::Ordering;
	use transit_codec::{SignatureType, Tag};
	use transit_types::PaymentStatus;

	const MAX: u64 = 2 * 1024 * 1024 * 1024;

	fn signed(tags: Vec<Tag>, data: &[u8]) -> Bytes {
		let key = SigningKey::from_bytes(&[3u8; 32]);
		let item = DataItem::new(
			SignatureType::Ed25519,
			key.verifying_key().to_bytes().to_vec(),
			tags,
			data.to_vec(),
		);
		let signature = key.sign(&item.signature_data()).to_bytes().to_vec();
		Bytes::from(item.with_signature(signature).encode())
	}

	async fn upload(intake: &Intake, body: Bytes) -> Result<DataItemPostResponse, IntakeError> {
		let length = body.len().to_string();
		intake
			.upload(Some(OCTET_STREAM), Some(&length), body)
			.await
	}

	#[test]
	fn test_header_validation_messages() {
		let (_, deps, bus) = harness();
		let intake = Intake::new(deps, bus, MAX);

		let message = |r: Result<u64, IntakeError>| r.unwrap_err().to_string();
		assert_eq!(
			message(intake.validate_headers(None, Some("10"))),
			"required header(s) - content-type, content-length"
		);
		assert_eq!(
			message(intake.validate_headers(Some("text/plain"), Some("10"))),
			"required header(s) - content-type: application/octet-stream"
		);
		assert_eq!(
			message(intake.validate_headers(Some(OCTET_STREAM), Some("0"))),
			format!("content-length: supported range 1B - {}B", MAX)
		);
		assert_eq!(
			message(intake.validate_headers(Some(OCTET_STREAM), Some("abc"))),
			format!("content-length: supported range 1B - {}B", MAX)
		);
		assert_eq!(
			intake
				.validate_headers(Some(OCTET_STREAM), Some("1000"))
				.unwrap(),
			1000
		);
	}

	#[tokio::test]
	async fn test_upload_creates_order() {
		let (fakes, deps, bus) = harness();
		let mut events = bus.subscribe();
		let intake = Intake::new(deps.clone(), bus, MAX);

		let body = signed(vec![], &[42u8; 884]);
		assert_eq!(body.len(), 1000);
		let ack = upload(&intake, body).await.unwrap();

		let order = deps.storage.get_order(&ack.id).await.unwrap();
		assert_eq!(order.status, OrderStatus::Created);
		assert_eq!(order.payment, PaymentStatus::Unpaid);
		assert_eq!(order.size, 1000);
		assert_eq!(order.url, BUNDLER_URL);
		assert_eq!(order.address, BUNDLER_ADDRESS);
		assert!(fakes.bundler.items.lock().unwrap().contains_key(&ack.id));
		assert_eq!(ack.extra["signature"], "receipt");
		assert!(matches!(
			events.recv().await.unwrap(),
			TransitEvent::Order(OrderEvent::Created { size: 1000, .. })
		));
	}

	#[tokio::test]
	async fn test_upload_rejections() {
		let (_, deps, bus) = harness();
		let intake = Intake::new(deps, bus, MAX);

		let body = signed(vec![], b"payload");
		let err = intake
			.upload(Some(OCTET_STREAM), Some("5"), body.clone())
			.await
			.unwrap_err();
		assert_eq!(
			err.to_string(),
			format!("content-length, body: length mismatch (5, {})", body.len())
		);

		let garbage = Bytes::from_static(b"\x09\x00not a data item");
		let err = upload(&intake, garbage).await.unwrap_err();
		assert_eq!(err.to_string(), "failed to decode data item");

		let mut tampered = body.to_vec();
		let last = tampered.len() - 1;
		tampered[last] ^= 1;
		let err = upload(&intake, Bytes::from(tampered)).await.unwrap_err();
		assert_eq!(err.to_string(), "failed to verify data item");
	}

	#[tokio::test]
	async fn test_duplicate_upload_rejected() {
		let (_, deps, bus) = harness();
		let intake = Intake::new(deps, bus, MAX);
		let body = signed(vec![], b"once");

		upload(&intake, body.clone()).await.unwrap();
		let err = upload(&intake, body).await.unwrap_err();
		assert!(matches!(err, IntakeError::Conflict(ref m) if m == "data item already exists"));
	}

	#[tokio::test]
	async fn test_dependency_failures() {
		let (fakes, deps, bus) = harness();
		let intake = Intake::new(deps.clone(), bus, MAX);

		fakes.contract.unavailable.store(true, Ordering::SeqCst);
		let err = upload(&intake, signed(vec![], b"a")).await.unwrap_err();
		assert!(matches!(err, IntakeError::Dependency(ref m) if m == "failed to post to bundler"));
		fakes.contract.unavailable.store(false, Ordering::SeqCst);

		fakes.bundler.unavailable.store(true, Ordering::SeqCst);
		let err = upload(&intake, signed(vec![], b"b")).await.unwrap_err();
		assert!(matches!(err, IntakeError::Dependency(_)));

		let stored = deps
			.storage
			.get_orders(&Default::default(), None)
			.await
			.unwrap();
		assert!(stored.is_empty());
	}

	#[tokio::test]
	async fn test_record_payment() {
		let (_, deps, bus) = harness();
		let mut events = bus.subscribe();
		let intake = Intake::new(deps.clone(), bus, MAX);
		let ack = upload(&intake, signed(vec![], b"pay me")).await.unwrap();
		let _created = events.recv().await.unwrap();

		let response = intake.record_payment(&ack.id, "payment-tx").await.unwrap();
		assert_eq!(response.payment_id, "payment-tx");
		let order = deps.storage.get_order(&ack.id).await.unwrap();
		assert_eq!(order.status, OrderStatus::Queued);
		assert_eq!(order.transaction_id.as_deref(), Some("payment-tx"));
		assert!(matches!(
			events.recv().await.unwrap(),
			TransitEvent::Order(OrderEvent::Queued { .. })
		));

		// Same id again is accepted, a different one is not.
		intake.record_payment(&ack.id, "payment-tx").await.unwrap();
		let err = intake
			.record_payment(&ack.id, "other-tx")
			.await
			.unwrap_err();
		assert!(matches!(err, IntakeError::Conflict(_)));

		let err = intake
			.record_payment("unknown", "payment-tx")
			.await
			.unwrap_err();
		assert!(matches!(err, IntakeError::NotFound(_)));
	}

	#[tokio::test]
	async fn test_payment_rejected_after_failure() {
		let (_, deps, bus) = harness();
		let intake = Intake::new(deps.clone(), bus, MAX);
		let ack = upload(&intake, signed(vec![], b"late")).await.unwrap();
		deps.storage
			.update_order(
				&ack.id,
				&OrderPatch::new()
					.status(OrderStatus::Failed)
					.payment(PaymentStatus::Invalid),
			)
			.await
			.unwrap();

		let err = intake.record_payment(&ack.id, "tx").await.unwrap_err();
		assert!(matches!(err, IntakeError::Conflict(_)));
	}

	#[tokio::test]
	async fn test_read_paths() {
		let (_, deps, bus) = harness();
		let intake = Intake::new(deps, bus, MAX);
		let body = signed(vec![Tag::new("Content-Type", "text/markdown")], b"# hello");
		let ack = upload(&intake, body.clone()).await.unwrap();

		assert_eq!(intake.get_item(&ack.id).await.unwrap(), body);
		assert_eq!(intake.get_status(&ack.id).await.unwrap()["id"], ack.id);

		let (content_type, data) = intake.get_data(&ack.id, None, None).await.unwrap();
		assert_eq!(content_type, "text/markdown");
		assert_eq!(&data[..], b"# hello");
		let (content_type, _) = intake
			.get_data(&ack.id, Some("text/plain"), None)
			.await
			.unwrap();
		assert_eq!(content_type, "text/plain");

		let tags = intake.get_field(&ack.id, "tags").await.unwrap();
		assert_eq!(tags[0]["name"], "Content-Type");
		assert_eq!(intake.get_field(&ack.id, "target").await.unwrap(), "");
		let owner = intake.get_field(&ack.id, "owner").await.unwrap();
		assert_eq!(owner.as_str().map(str::len), Some(43));

		let err = intake.get_field(&ack.id, "colour").await.unwrap_err();
		assert_eq!(err.to_string(), "field not found");
		assert!(matches!(
			intake.get_item("missing").await,
			Err(IntakeError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn test_price() {
		let (fakes, deps, bus) = harness();
		let intake = Intake::new(deps, bus, MAX);
		fakes.ledger.set_base_price("1000");

		let quote = intake.price("1000").await.unwrap();
		assert_eq!(quote.price, "1001");
		assert_eq!(quote.address, SERVICE_ADDRESS);

		for bad in ["0", "-10", "abc", "4294967296"] {
			let err = intake.price(bad).await.unwrap_err();
			assert_eq!(err.to_string(), "byte size should be between 1 and 2^32-1");
		}

		fakes.ledger.unavailable.store(true, Ordering::SeqCst);
		let err = intake.price("10").await.unwrap_err();
		assert!(matches!(err, IntakeError::Dependency(ref m) if m == "failed to fetch price"));
	}
}
