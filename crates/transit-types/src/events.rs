use serde::{Deserialize, Serialize};

/// Events published as orders move through their lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitEvent {
	Order(OrderEvent),
	Payment(PaymentEvent),
	Settlement(SettlementEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
	Created {
		order_id: String,
		bundler: String,
		size: u64,
	},
	Queued {
		order_id: String,
		transaction_id: String,
	},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentEvent {
	Verified {
		order_id: String,
		transaction_id: String,
	},
	Rejected {
		order_id: String,
		transaction_id: String,
		reason: String,
	},
	Confirmed {
		order_id: String,
		confirmations: u64,
	},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementEvent {
	/// Transfer to the bundler signed and accepted by the ledger.
	Submitted {
		order_id: String,
		settlement_id: String,
	},
	/// Bundler notified, order complete.
	Sent {
		order_id: String,
		settlement_id: String,
	},
}

impl TransitEvent {
	pub fn order_id(&self) -> &str {
		match self {
			TransitEvent::Order(OrderEvent::Created { order_id, .. })
			| TransitEvent::Order(OrderEvent::Queued { order_id, .. })
			| TransitEvent::Payment(PaymentEvent::Verified { order_id, .. })
			| TransitEvent::Payment(PaymentEvent::Rejected { order_id, .. })
			| TransitEvent::Payment(PaymentEvent::Confirmed { order_id, .. })
			| TransitEvent::Settlement(SettlementEvent::Submitted { order_id, .. })
			| TransitEvent::Settlement(SettlementEvent::Sent { order_id, .. }) => order_id,
		}
	}
}
