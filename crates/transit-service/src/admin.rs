//! Operator commands working directly on the order store.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use transit_config::Config;
use transit_storage::StorageService;
use transit_types::{Order, OrderFilter, OrderStatus, PaymentStatus};

#[derive(Subcommand, Debug)]
pub enum OrdersCommand {
	/// List stored orders, oldest first
	List {
		#[arg(long)]
		status: Option<OrderStatus>,
		#[arg(long)]
		payment: Option<PaymentStatus>,
		#[arg(long, default_value_t = 25)]
		limit: usize,
	},
	/// Print one order as JSON
	Show { id: String },
	/// Remove an order from the store. A running service keeps serving it
	/// until restarted.
	Delete { id: String },
}

/// Runs one command against the configured store. The memory backend is
/// refused: its orders exist only inside the service process.
pub async fn run(config: &Config, command: OrdersCommand) -> Result<()> {
	if config.storage.backend == "memory" {
		bail!(
			"orders commands need a persistent storage backend; \
			 'memory' orders are only visible to the running service"
		);
	}
	let backend = transit_storage::create_storage(&config.storage.backend, &config.storage.config)
		.context("Failed to open order storage")?;
	let storage = StorageService::new(backend);

	match command {
		OrdersCommand::List {
			status,
			payment,
			limit,
		} => {
			let mut filter = OrderFilter::new();
			if let Some(status) = status {
				filter = filter.with_status(status);
			}
			if let Some(payment) = payment {
				filter = filter.with_payment(payment);
			}
			let orders = storage.get_orders(&filter, Some(limit)).await?;
			for order in &orders {
				println!("{}", summary(order));
			}
			println!("{} order(s)", orders.len());
		}
		OrdersCommand::Show { id } => {
			let order = storage
				.get_order(&id)
				.await
				.with_context(|| format!("Order {} not found", id))?;
			println!("{}", serde_json::to_string_pretty(&order)?);
		}
		OrdersCommand::Delete { id } => {
			storage
				.delete_order(&id)
				.await
				.with_context(|| format!("Failed to delete order {}", id))?;
			println!("Deleted order {}", id);
		}
	}
	Ok(())
}

fn summary(order: &Order) -> String {
	format!(
		"{}  {:<9} {:<9} {:>12}B  payment={}  settlement={}",
		order.id,
		order.status.as_str(),
		order.payment.as_str(),
		order.size,
		order.transaction_id.as_deref().unwrap_or("-"),
		order.settlement_id.as_deref().unwrap_or("-"),
	)
}
