//! Order rows and the lifecycle they move through.
//!
//! An order is the broker's local record of one data item. Its `status`
//! tracks delivery to the bundler and its `payment` tracks the client's
//! ledger payment. Both only move forward along fixed edges, with the
//! exception of the terminal failure states which any live state may enter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Delivery status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
	/// Item accepted by a bundler, no payment submitted yet.
	Created,
	/// Client supplied a payment transaction id.
	Queued,
	/// Payment has enough confirmations.
	Confirmed,
	/// Bundler has been paid and notified.
	Sent,
	/// Payment was rejected.
	Failed,
}

impl OrderStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Created => "created",
			OrderStatus::Queued => "queued",
			OrderStatus::Confirmed => "confirmed",
			OrderStatus::Sent => "sent",
			OrderStatus::Failed => "failed",
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Sent | OrderStatus::Failed)
	}

	/// Returns true if `next` is reachable from `self` in one step.
	///
	/// Staying in the same state is always allowed so that repeated patches
	/// are no-ops.
	pub fn can_transition_to(&self, next: OrderStatus) -> bool {
		use OrderStatus::*;
		*self == next
			|| matches!(
				(*self, next),
				(Created, Queued)
					| (Queued, Confirmed)
					| (Confirmed, Sent)
					| (Created | Queued | Confirmed, Failed)
			)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"created" => Ok(OrderStatus::Created),
			"queued" => Ok(OrderStatus::Queued),
			"confirmed" => Ok(OrderStatus::Confirmed),
			"sent" => Ok(OrderStatus::Sent),
			"failed" => Ok(OrderStatus::Failed),
			other => Err(format!("unknown order status: {}", other)),
		}
	}
}

/// Payment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
	Unpaid,
	/// Amount and recipient checked against the ledger.
	Paid,
	/// Payment transaction is deep enough in the chain.
	Confirmed,
	/// Amount too low or wrong recipient.
	Invalid,
}

impl PaymentStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			PaymentStatus::Unpaid => "unpaid",
			PaymentStatus::Paid => "paid",
			PaymentStatus::Confirmed => "confirmed",
			PaymentStatus::Invalid => "invalid",
		}
	}

	pub fn is_settled(&self) -> bool {
		matches!(self, PaymentStatus::Paid | PaymentStatus::Confirmed)
	}

	pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
		use PaymentStatus::*;
		*self == next
			|| matches!(
				(*self, next),
				(Unpaid, Paid) | (Paid, Confirmed) | (Unpaid | Paid, Invalid)
			)
	}
}

impl fmt::Display for PaymentStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for PaymentStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"unpaid" => Ok(PaymentStatus::Unpaid),
			"paid" => Ok(PaymentStatus::Paid),
			"confirmed" => Ok(PaymentStatus::Confirmed),
			"invalid" => Ok(PaymentStatus::Invalid),
			other => Err(format!("unknown payment status: {}", other)),
		}
	}
}

/// Rejected order mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
	#[error("status cannot move from {from} to {to}")]
	Status { from: OrderStatus, to: OrderStatus },
	#[error("payment cannot move from {from} to {to}")]
	Payment { from: PaymentStatus, to: PaymentStatus },
	#[error("transaction id already set to {0}")]
	TransactionIdSet(String),
	#[error("settlement id already set to {0}")]
	SettlementIdSet(String),
	#[error("order cannot be sent while payment is {0}")]
	Unpaid(PaymentStatus),
}

/// One uploaded data item and its payment lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
	/// Data item id. Unique and immutable.
	pub id: String,
	/// Client payment transaction id, set once.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub transaction_id: Option<String>,
	/// Bundler base URL the item was posted to.
	pub url: String,
	/// Bundler ledger address, the recipient of the settlement transfer.
	pub address: String,
	pub status: OrderStatus,
	pub payment: PaymentStatus,
	/// Raw data item length in bytes.
	pub size: u64,
	/// Unix seconds.
	#[serde(default)]
	pub created_at: u64,
	/// Id of the latest signed settlement transfer, recorded before submission.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub settlement_id: Option<String>,
}

impl Order {
	/// Creates an order in the `created`/`unpaid` state.
	pub fn new(
		id: impl Into<String>,
		url: impl Into<String>,
		address: impl Into<String>,
		size: u64,
	) -> Self {
		Self {
			id: id.into(),
			transaction_id: None,
			url: url.into(),
			address: address.into(),
			status: OrderStatus::Created,
			payment: PaymentStatus::Unpaid,
			size,
			created_at: chrono::Utc::now().timestamp().max(0) as u64,
			settlement_id: None,
		}
	}

	/// Applies the fields present in `patch`.
	///
	/// The whole patch is checked before anything is written, so a rejected
	/// patch leaves the order unchanged.
	pub fn apply(&mut self, patch: &OrderPatch) -> Result<(), TransitionError> {
		let status = patch.status.unwrap_or(self.status);
		let payment = patch.payment.unwrap_or(self.payment);

		if !self.status.can_transition_to(status) {
			return Err(TransitionError::Status {
				from: self.status,
				to: status,
			});
		}
		if !self.payment.can_transition_to(payment) {
			return Err(TransitionError::Payment {
				from: self.payment,
				to: payment,
			});
		}
		if status == OrderStatus::Sent && !payment.is_settled() {
			return Err(TransitionError::Unpaid(payment));
		}
		write_once(&self.transaction_id, &patch.transaction_id)
			.map_err(TransitionError::TransactionIdSet)?;
		// A settlement id is replaced when a transfer never reached the ledger
		// and has to be re-signed, but is frozen once the order is sent.
		if self.status == OrderStatus::Sent {
			write_once(&self.settlement_id, &patch.settlement_id)
				.map_err(TransitionError::SettlementIdSet)?;
		}

		self.status = status;
		self.payment = payment;
		if let Some(transaction_id) = &patch.transaction_id {
			self.transaction_id = Some(transaction_id.clone());
		}
		if let Some(settlement_id) = &patch.settlement_id {
			self.settlement_id = Some(settlement_id.clone());
		}
		if let Some(url) = &patch.url {
			self.url = url.clone();
		}
		if let Some(address) = &patch.address {
			self.address = address.clone();
		}
		Ok(())
	}
}

fn write_once(current: &Option<String>, next: &Option<String>) -> Result<(), String> {
	match (current, next) {
		(Some(current), Some(next)) if current != next => Err(current.clone()),
		_ => Ok(()),
	}
}

/// Named predicates that cannot be expressed as field equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderScope {
	HasTransactionId,
	MissingTransactionId,
	HasSettlementId,
}

impl OrderScope {
	pub fn matches(&self, order: &Order) -> bool {
		match self {
			OrderScope::HasTransactionId => order.transaction_id.is_some(),
			OrderScope::MissingTransactionId => order.transaction_id.is_none(),
			OrderScope::HasSettlementId => order.settlement_id.is_some(),
		}
	}
}

/// Query predicate over orders. Only `Some` fields constrain the match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
	pub id: Option<String>,
	pub transaction_id: Option<String>,
	pub url: Option<String>,
	pub address: Option<String>,
	pub status: Option<OrderStatus>,
	pub payment: Option<PaymentStatus>,
	pub size: Option<u64>,
	pub scopes: Vec<OrderScope>,
	/// Keyset cursor. Only orders strictly after this key match.
	pub after: Option<OrderKey>,
}

/// Position of an order in oldest-first page order: `(created_at, id)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderKey {
	pub created_at: u64,
	pub id: String,
}

impl OrderKey {
	pub fn of(order: &Order) -> Self {
		Self {
			created_at: order.created_at,
			id: order.id.clone(),
		}
	}

	fn precedes(&self, order: &Order) -> bool {
		(self.created_at, self.id.as_str()) < (order.created_at, order.id.as_str())
	}
}

impl OrderFilter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_status(mut self, status: OrderStatus) -> Self {
		self.status = Some(status);
		self
	}

	pub fn with_payment(mut self, payment: PaymentStatus) -> Self {
		self.payment = Some(payment);
		self
	}

	pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
		self.transaction_id = Some(transaction_id.into());
		self
	}

	pub fn with_scope(mut self, scope: OrderScope) -> Self {
		self.scopes.push(scope);
		self
	}

	/// Resumes a scan after `key`.
	pub fn with_after(mut self, key: OrderKey) -> Self {
		self.after = Some(key);
		self
	}

	pub fn matches(&self, order: &Order) -> bool {
		fn eq<T: PartialEq>(want: &Option<T>, have: &T) -> bool {
			want.as_ref().map_or(true, |w| w == have)
		}

		eq(&self.id, &order.id)
			&& self
				.transaction_id
				.as_ref()
				.map_or(true, |t| order.transaction_id.as_ref() == Some(t))
			&& eq(&self.url, &order.url)
			&& eq(&self.address, &order.address)
			&& eq(&self.status, &order.status)
			&& eq(&self.payment, &order.payment)
			&& eq(&self.size, &order.size)
			&& self.scopes.iter().all(|s| s.matches(order))
			&& self.after.as_ref().map_or(true, |key| key.precedes(order))
	}
}

/// Partial update. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPatch {
	pub transaction_id: Option<String>,
	pub url: Option<String>,
	pub address: Option<String>,
	pub status: Option<OrderStatus>,
	pub payment: Option<PaymentStatus>,
	pub settlement_id: Option<String>,
}

impl OrderPatch {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn status(mut self, status: OrderStatus) -> Self {
		self.status = Some(status);
		self
	}

	pub fn payment(mut self, payment: PaymentStatus) -> Self {
		self.payment = Some(payment);
		self
	}

	pub fn transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
		self.transaction_id = Some(transaction_id.into());
		self
	}

	pub fn settlement_id(mut self, settlement_id: impl Into<String>) -> Self {
		self.settlement_id = Some(settlement_id.into());
		self
	}

	pub fn is_empty(&self) -> bool {
		*self == Self::default()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn order() -> Order {
		Order::new("item", "https://bundler.example", "bundler-address", 1000)
	}

	#[test]
	fn test_new_order_is_created_unpaid() {
		let order = order();
		assert_eq!(order.status, OrderStatus::Created);
		assert_eq!(order.payment, PaymentStatus::Unpaid);
		assert_eq!(order.transaction_id, None);
		assert_eq!(order.size, 1000);
	}

	#[test]
	fn test_status_only_patch_leaves_other_fields() {
		let mut order = order();
		order
			.apply(&OrderPatch::new().transaction_id("tx").status(OrderStatus::Queued))
			.unwrap();
		let before = order.clone();

		order
			.apply(&OrderPatch::new().status(OrderStatus::Failed))
			.unwrap();

		assert_eq!(order.status, OrderStatus::Failed);
		assert_eq!(order.payment, before.payment);
		assert_eq!(order.transaction_id, before.transaction_id);
		assert_eq!(order.url, before.url);
	}

	#[test]
	fn test_backward_transitions_rejected() {
		let mut order = order();
		order
			.apply(&OrderPatch::new().status(OrderStatus::Queued))
			.unwrap();

		let err = order
			.apply(&OrderPatch::new().status(OrderStatus::Created))
			.unwrap_err();
		assert_eq!(
			err,
			TransitionError::Status {
				from: OrderStatus::Queued,
				to: OrderStatus::Created
			}
		);

		order
			.apply(&OrderPatch::new().payment(PaymentStatus::Invalid))
			.unwrap();
		assert!(order
			.apply(&OrderPatch::new().payment(PaymentStatus::Paid))
			.is_err());
	}

	#[test]
	fn test_transaction_id_is_write_once() {
		let mut order = order();
		order
			.apply(&OrderPatch::new().transaction_id("first"))
			.unwrap();
		order
			.apply(&OrderPatch::new().transaction_id("first"))
			.unwrap();

		let err = order
			.apply(&OrderPatch::new().transaction_id("second"))
			.unwrap_err();
		assert_eq!(err, TransitionError::TransactionIdSet("first".into()));
		assert_eq!(order.transaction_id.as_deref(), Some("first"));
	}

	#[test]
	fn test_sent_requires_settled_payment() {
		let mut order = order();
		order.status = OrderStatus::Confirmed;

		let err = order
			.apply(&OrderPatch::new().status(OrderStatus::Sent))
			.unwrap_err();
		assert_eq!(err, TransitionError::Unpaid(PaymentStatus::Unpaid));
		assert_eq!(order.status, OrderStatus::Confirmed);

		order.payment = PaymentStatus::Confirmed;
		order
			.apply(&OrderPatch::new().status(OrderStatus::Sent))
			.unwrap();
		assert_eq!(order.status, OrderStatus::Sent);
	}

	#[test]
	fn test_settlement_id_frozen_once_sent() {
		let mut order = order();
		order.status = OrderStatus::Confirmed;
		order.payment = PaymentStatus::Confirmed;
		order
			.apply(&OrderPatch::new().settlement_id("first"))
			.unwrap();
		order
			.apply(&OrderPatch::new().settlement_id("second"))
			.unwrap();
		order
			.apply(&OrderPatch::new().status(OrderStatus::Sent))
			.unwrap();

		let err = order
			.apply(&OrderPatch::new().settlement_id("third"))
			.unwrap_err();
		assert_eq!(err, TransitionError::SettlementIdSet("second".into()));
	}

	#[test]
	fn test_rejected_patch_is_not_partially_applied() {
		let mut order = order();
		let err = order.apply(
			&OrderPatch::new()
				.transaction_id("tx")
				.payment(PaymentStatus::Confirmed),
		);
		assert!(err.is_err());
		assert_eq!(order.transaction_id, None);
	}

	#[test]
	fn test_filter_matches_explicit_fields_and_scopes() {
		let mut order = order();
		let unpaid_with_tx = OrderFilter::new()
			.with_payment(PaymentStatus::Unpaid)
			.with_scope(OrderScope::HasTransactionId);

		assert!(OrderFilter::new().matches(&order));
		assert!(!unpaid_with_tx.matches(&order));

		order.transaction_id = Some("tx".into());
		assert!(unpaid_with_tx.matches(&order));
		assert!(OrderFilter::new().with_transaction_id("tx").matches(&order));
		assert!(!OrderFilter::new().with_transaction_id("other").matches(&order));
		assert!(!OrderFilter::new()
			.with_status(OrderStatus::Sent)
			.matches(&order));
	}

	#[test]
	fn test_after_key_skips_earlier_orders() {
		let mut order = order();
		order.created_at = 10;

		let key = |created_at, id: &str| OrderKey {
			created_at,
			id: id.to_string(),
		};
		assert!(OrderFilter::new().with_after(key(9, "zzz")).matches(&order));
		assert!(OrderFilter::new().with_after(key(10, "abc")).matches(&order));
		assert!(!OrderFilter::new().with_after(key(10, "item")).matches(&order));
		assert!(!OrderFilter::new().with_after(key(11, "")).matches(&order));
		assert_eq!(OrderKey::of(&order), key(10, "item"));
	}

	#[test]
	fn test_status_round_trips_through_strings() {
		for status in [
			OrderStatus::Created,
			OrderStatus::Queued,
			OrderStatus::Confirmed,
			OrderStatus::Sent,
			OrderStatus::Failed,
		] {
			assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
		}
		assert!("pending".parse::<PaymentStatus>().is_err());
	}
}
