use super::Pass;
use crate::error::ReconcileError;
use crate::{Dependencies, EventBus};
use async_trait::async_trait;
use transit_ledger::LedgerError;
use transit_types::{
	Order, OrderFilter, OrderPatch, OrderStatus, PaymentEvent, PaymentStatus, TransitEvent,
};

/// Waits for verified payments to be buried deep enough.
pub struct PaymentConfirmationPass {
	deps: Dependencies,
	event_bus: EventBus,
	threshold: u64,
}

impl PaymentConfirmationPass {
	pub fn new(deps: Dependencies, event_bus: EventBus, threshold: u64) -> Self {
		Self {
			deps,
			event_bus,
			threshold,
		}
	}
}

#[async_trait]
impl Pass for PaymentConfirmationPass {
	fn name(&self) -> &'static str {
		"payment_confirmation"
	}

	fn filter(&self) -> OrderFilter {
		OrderFilter::new().with_payment(PaymentStatus::Paid)
	}

	async fn process(&self, order: &Order) -> Result<(), ReconcileError> {
		let Some(transaction_id) = order.transaction_id.as_deref() else {
			return Ok(());
		};

		let status = match self.deps.ledger.get_transaction_status(transaction_id).await {
			Ok(status) => status,
			Err(LedgerError::Pending) => {
				tracing::debug!(order_id = %order.id, transaction_id, "payment not mined yet");
				return Ok(());
			}
			Err(e) => return Err(e.into()),
		};

		let confirmations = status.number_of_confirmations;
		if confirmations < self.threshold {
			tracing::debug!(
				order_id = %order.id,
				confirmations,
				threshold = self.threshold,
				"payment below confirmation threshold"
			);
			return Ok(());
		}

		self.deps
			.storage
			.update_order(
				&order.id,
				&OrderPatch::new()
					.payment(PaymentStatus::Confirmed)
					.status(OrderStatus::Confirmed),
			)
			.await?;
		tracing::info!(order_id = %order.id, confirmations, "payment confirmed");
		self.event_bus
			.publish(TransitEvent::Payment(PaymentEvent::Confirmed {
				order_id: order.id.clone(),
				confirmations,
			}));
		Ok(())
	}
}
