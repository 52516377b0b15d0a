use super::Pass;
use crate::error::ReconcileError;
use crate::pricing::{parse_amount, required_payment};
use crate::{Dependencies, EventBus};
use async_trait::async_trait;
use transit_types::{
	Order, OrderFilter, OrderPatch, OrderScope, OrderStatus, PaymentEvent, PaymentStatus,
	TransitEvent,
};

/// Checks that a client payment pays enough to the service wallet.
pub struct PaymentAmountPass {
	deps: Dependencies,
	event_bus: EventBus,
}

impl PaymentAmountPass {
	pub fn new(deps: Dependencies, event_bus: EventBus) -> Self {
		Self { deps, event_bus }
	}
}

#[async_trait]
impl Pass for PaymentAmountPass {
	fn name(&self) -> &'static str {
		"payment_amount"
	}

	fn filter(&self) -> OrderFilter {
		OrderFilter::new()
			.with_payment(PaymentStatus::Unpaid)
			.with_scope(OrderScope::HasTransactionId)
	}

	async fn process(&self, order: &Order) -> Result<(), ReconcileError> {
		let Some(transaction_id) = order.transaction_id.as_deref() else {
			return Ok(());
		};

		let tx = self.deps.ledger.get_transaction(transaction_id).await?;
		let paid = parse_amount(&tx.quantity)?;
		let base = self.deps.ledger.price(order.size, None).await?;
		let required = required_payment(parse_amount(&base)?)?;
		let address = self.deps.account.get_address().await?;

		if paid >= required && tx.target == address {
			self.deps
				.storage
				.update_order(&order.id, &OrderPatch::new().payment(PaymentStatus::Paid))
				.await?;
			tracing::info!(order_id = %order.id, transaction_id, %paid, "payment verified");
			self.event_bus
				.publish(TransitEvent::Payment(PaymentEvent::Verified {
					order_id: order.id.clone(),
					transaction_id: transaction_id.to_string(),
				}));
			return Ok(());
		}

		let reason = if tx.target != address {
			format!("payment sent to {} instead of {}", tx.target, address)
		} else {
			format!("paid {} of required {}", paid, required)
		};
		self.deps
			.storage
			.update_order(
				&order.id,
				&OrderPatch::new()
					.payment(PaymentStatus::Invalid)
					.status(OrderStatus::Failed),
			)
			.await?;
		tracing::warn!(order_id = %order.id, transaction_id, %reason, "payment rejected");
		self.event_bus
			.publish(TransitEvent::Payment(PaymentEvent::Rejected {
				order_id: order.id.clone(),
				transaction_id: transaction_id.to_string(),
				reason,
			}));
		Ok(())
	}
}
