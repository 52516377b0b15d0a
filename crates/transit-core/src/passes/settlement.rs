use super::Pass;
use crate::error::ReconcileError;
use crate::pricing::parse_amount;
use crate::{Dependencies, EventBus};
use async_trait::async_trait;
use transit_types::{
	LedgerTransaction, Order, OrderFilter, OrderPatch, OrderStatus, PaymentStatus,
	SettlementEvent, TransitEvent,
};

/// Pays the bundler for a confirmed order and tells it so.
///
/// The signed transfer id is stored on the order before it is submitted.
/// On a retry a transfer the ledger already knows is not paid again; only
/// the bundler notification is repeated.
pub struct SettlementPass {
	deps: Dependencies,
	event_bus: EventBus,
}

impl SettlementPass {
	pub fn new(deps: Dependencies, event_bus: EventBus) -> Self {
		Self { deps, event_bus }
	}

	/// Signs, records and submits the transfer. Returns its id.
	async fn disburse(&self, order: &Order) -> Result<String, ReconcileError> {
		let quantity = self.deps.ledger.price(order.size, None).await?;
		parse_amount(&quantity)?;
		let reward = self.deps.ledger.price(0, Some(&order.address)).await?;
		let anchor = self.deps.ledger.anchor().await?;

		let transfer = LedgerTransaction::transfer(&order.address, quantity, reward, anchor);
		let signed = self.deps.account.sign(transfer).await?;

		self.deps
			.storage
			.update_order(&order.id, &OrderPatch::new().settlement_id(&signed.id))
			.await?;
		self.deps.ledger.submit_transaction(&signed).await?;

		self.event_bus
			.publish(TransitEvent::Settlement(SettlementEvent::Submitted {
				order_id: order.id.clone(),
				settlement_id: signed.id.clone(),
			}));
		Ok(signed.id)
	}
}

#[async_trait]
impl Pass for SettlementPass {
	fn name(&self) -> &'static str {
		"settlement"
	}

	fn filter(&self) -> OrderFilter {
		OrderFilter::new()
			.with_status(OrderStatus::Confirmed)
			.with_payment(PaymentStatus::Confirmed)
	}

	async fn process(&self, order: &Order) -> Result<(), ReconcileError> {
		let settlement_id = match order.settlement_id.as_deref() {
			Some(previous) if self.deps.ledger.is_known(previous).await? => {
				tracing::info!(
					order_id = %order.id,
					settlement_id = %previous,
					"transfer already on the ledger, repeating notification"
				);
				previous.to_string()
			}
			_ => self.disburse(order).await?,
		};

		self.deps
			.bundler
			.put_data_item(&order.url, &order.id, &settlement_id)
			.await?;
		self.deps
			.storage
			.update_order(&order.id, &OrderPatch::new().status(OrderStatus::Sent))
			.await?;

		tracing::info!(order_id = %order.id, %settlement_id, bundler = %order.url, "order settled");
		self.event_bus
			.publish(TransitEvent::Settlement(SettlementEvent::Sent {
				order_id: order.id.clone(),
				settlement_id,
			}));
		Ok(())
	}
}
