//! Reconciliation passes run by the scheduler on every tick.
//!
//! A pass selects the rows in its own precondition state and moves each of
//! them at most one step. Rows it cannot move are left untouched, so running
//! a pass again against unchanged ledger state changes nothing.

use crate::error::ReconcileError;
use async_trait::async_trait;
use transit_types::{Order, OrderFilter};

pub mod payment_amount;
pub mod payment_confirmation;
pub mod settlement;

pub use payment_amount::PaymentAmountPass;
pub use payment_confirmation::PaymentConfirmationPass;
pub use settlement::SettlementPass;

#[async_trait]
pub trait Pass: Send + Sync {
	fn name(&self) -> &'static str;

	/// Rows this pass acts on.
	fn filter(&self) -> OrderFilter;

	/// Advances one row. An error leaves the row for the next tick.
	async fn process(&self, order: &Order) -> Result<(), ReconcileError>;
}
