//! Fixed cadence driver for the reconciliation passes.

use crate::error::ReconcileError;
use crate::passes::{Pass, PaymentAmountPass, PaymentConfirmationPass, SettlementPass};
use crate::{Dependencies, EventBus};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::instrument;
use transit_config::SchedulerConfig;
use transit_ledger::LedgerError;
use transit_storage::StorageService;
use transit_types::OrderKey;

/// Drives the passes one page at a time.
///
/// Each pass keeps a cursor into its candidate rows. A full page moves the
/// cursor past its last row and a short page resets it, so rows that keep
/// failing rotate through the page instead of pinning it.
pub struct Scheduler {
	storage: Arc<StorageService>,
	passes: Vec<Box<dyn Pass>>,
	config: SchedulerConfig,
	cursors: Mutex<HashMap<&'static str, OrderKey>>,
}

impl Scheduler {
	/// Creates a scheduler running amount verification, confirmation polling
	/// and settlement, in that order.
	pub fn new(deps: &Dependencies, event_bus: &EventBus, config: SchedulerConfig) -> Self {
		let passes: Vec<Box<dyn Pass>> = vec![
			Box::new(PaymentAmountPass::new(deps.clone(), event_bus.clone())),
			Box::new(PaymentConfirmationPass::new(
				deps.clone(),
				event_bus.clone(),
				config.confirmation_threshold,
			)),
			Box::new(SettlementPass::new(deps.clone(), event_bus.clone())),
		];
		Self::with_passes(deps.storage.clone(), passes, config)
	}

	pub fn with_passes(
		storage: Arc<StorageService>,
		passes: Vec<Box<dyn Pass>>,
		config: SchedulerConfig,
	) -> Self {
		Self {
			storage,
			passes,
			config,
			cursors: Mutex::new(HashMap::new()),
		}
	}

	/// Ticks until `shutdown` changes or its sender is dropped.
	///
	/// A tick in progress always completes before the loop exits.
	pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
		let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
		tracing::info!(
			interval_secs = self.config.interval_secs,
			page_size = self.config.page_size,
			concurrency = self.config.concurrency,
			"scheduler started"
		);

		loop {
			tokio::select! {
				_ = interval.tick() => self.tick().await,
				_ = shutdown.changed() => {
					tracing::info!("scheduler stopped");
					break;
				}
			}
		}
	}

	/// Runs every pass once, in order.
	pub async fn tick(&self) {
		for pass in &self.passes {
			self.run_pass(pass.as_ref()).await;
		}
	}

	#[instrument(skip_all, fields(pass = pass.name()))]
	async fn run_pass(&self, pass: &dyn Pass) {
		let page_size = self.config.page_size;
		let cursor = self.cursors.lock().await.get(pass.name()).cloned();
		let mut filter = pass.filter();
		if let Some(key) = cursor {
			tracing::trace!(after = %key.id, "resuming page");
			filter = filter.with_after(key);
		}

		let orders = match self.storage.get_orders(&filter, Some(page_size)).await {
			Ok(orders) => orders,
			Err(e) => {
				tracing::error!(error = %e, "failed to load orders");
				return;
			}
		};

		{
			let mut cursors = self.cursors.lock().await;
			match orders.last() {
				Some(last) if orders.len() >= page_size => {
					cursors.insert(pass.name(), OrderKey::of(last));
				}
				_ => {
					cursors.remove(pass.name());
				}
			}
		}
		if orders.is_empty() {
			return;
		}
		tracing::debug!(rows = orders.len(), "processing page");

		let row_timeout = self.config.row_timeout_secs;
		futures::stream::iter(orders)
			.for_each_concurrent(self.config.concurrency.max(1), |order| async move {
				let result =
					match tokio::time::timeout(Duration::from_secs(row_timeout), pass.process(&order))
						.await
					{
						Ok(result) => result,
						Err(_) => Err(ReconcileError::Timeout(row_timeout)),
					};
				match result {
					Ok(()) => {}
					Err(ReconcileError::Ledger(LedgerError::Pending)) => {
						tracing::debug!(order_id = %order.id, "ledger transaction pending");
					}
					Err(e) => {
						tracing::warn!(order_id = %order.id, error = %e, "row left for next tick");
					}
				}
			})
			.await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{
		harness, reload, seed_order, BUNDLER_ADDRESS, BUNDLER_URL, SERVICE_ADDRESS,
	};
	use async_trait::async_trait;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use transit_types::{Order, OrderFilter, OrderStatus, PaymentStatus};

	fn config() -> SchedulerConfig {
		SchedulerConfig {
			interval_secs: 1,
			row_timeout_secs: 1,
			..SchedulerConfig::default()
		}
	}

	#[tokio::test]
	async fn test_tick_walks_order_to_sent() {
		let (fakes, deps, bus) = harness();
		fakes.ledger.set_base_price("100000");
		fakes.ledger.add_payment("client-tx", SERVICE_ADDRESS, "100100");
		fakes.ledger.set_confirmations("client-tx", 12);
		seed_order(
			&deps,
			"item",
			1000,
			Some("client-tx"),
			OrderStatus::Queued,
			PaymentStatus::Unpaid,
		)
		.await;

		let scheduler = Scheduler::new(&deps, &bus, config());
		scheduler.tick().await;

		let order = reload(&deps, "item").await;
		assert_eq!(order.status, OrderStatus::Sent);
		assert_eq!(order.payment, PaymentStatus::Confirmed);
		assert_eq!(fakes.ledger.submitted().len(), 1);
	}

	#[tokio::test]
	async fn test_repeated_ticks_change_nothing() {
		let (fakes, deps, bus) = harness();
		fakes.ledger.set_base_price("100000");
		fakes.ledger.add_payment("paid-tx", SERVICE_ADDRESS, "100100");
		fakes.ledger.set_confirmations("paid-tx", 3);
		fakes.ledger.add_payment("short-tx", SERVICE_ADDRESS, "5");
		for (id, tx) in [("paid", "paid-tx"), ("short", "short-tx")] {
			seed_order(
				&deps,
				id,
				1000,
				Some(tx),
				OrderStatus::Queued,
				PaymentStatus::Unpaid,
			)
			.await;
		}

		let scheduler = Scheduler::new(&deps, &bus, config());
		scheduler.tick().await;
		let first = (reload(&deps, "paid").await, reload(&deps, "short").await);
		assert_eq!(first.0.payment, PaymentStatus::Paid);
		assert_eq!(first.1.status, OrderStatus::Failed);

		scheduler.tick().await;
		scheduler.tick().await;
		assert_eq!(
			(reload(&deps, "paid").await, reload(&deps, "short").await),
			first
		);
		assert!(fakes.ledger.submitted().is_empty());
	}

	#[tokio::test]
	async fn test_never_sent_without_settled_payment() {
		let (fakes, deps, bus) = harness();
		fakes.ledger.set_base_price("100");
		// A row that is confirmed but whose payment was never verified.
		seed_order(
			&deps,
			"odd",
			10,
			Some("tx"),
			OrderStatus::Confirmed,
			PaymentStatus::Unpaid,
		)
		.await;

		let scheduler = Scheduler::new(&deps, &bus, config());
		scheduler.tick().await;

		let order = reload(&deps, "odd").await;
		assert_ne!(order.status, OrderStatus::Sent);
		assert!(fakes.bundler.notifications().is_empty());
	}

	struct CountingPass {
		seen: Arc<AtomicUsize>,
		slow: &'static str,
	}

	#[async_trait]
	impl Pass for CountingPass {
		fn name(&self) -> &'static str {
			"counting"
		}

		fn filter(&self) -> OrderFilter {
			OrderFilter::new()
		}

		async fn process(&self, order: &Order) -> Result<(), ReconcileError> {
			self.seen.fetch_add(1, Ordering::SeqCst);
			if order.id == self.slow {
				tokio::time::sleep(Duration::from_secs(5)).await;
			}
			Ok(())
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_slow_row_does_not_block_siblings() {
		let (_, deps, _) = harness();
		for id in ["a", "b", "c"] {
			seed_order(&deps, id, 1, None, OrderStatus::Created, PaymentStatus::Unpaid).await;
		}
		let seen = Arc::new(AtomicUsize::new(0));
		let scheduler = Scheduler::with_passes(
			deps.storage.clone(),
			vec![Box::new(CountingPass {
				seen: seen.clone(),
				slow: "a",
			})],
			config(),
		);

		scheduler.tick().await;
		assert_eq!(seen.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn test_stuck_rows_do_not_starve_newer_orders() {
		let (fakes, deps, bus) = harness();
		fakes.ledger.set_base_price("100000");
		fakes.ledger.add_payment("good-tx", SERVICE_ADDRESS, "100100");

		let queued = |id: String, tx: String, created_at| {
			let mut order = Order::new(id, BUNDLER_URL, BUNDLER_ADDRESS, 1000);
			order.transaction_id = Some(tx);
			order.status = OrderStatus::Queued;
			order.created_at = created_at;
			order
		};
		// Payment ids the ledger has never seen keep failing on every tick.
		for i in 0..25 {
			let order = queued(format!("stuck-{:02}", i), format!("bogus-{}", i), 1);
			deps.storage.create_order(&order).await.unwrap();
		}
		deps.storage
			.create_order(&queued("good".into(), "good-tx".into(), 2))
			.await
			.unwrap();

		let scheduler = Scheduler::new(&deps, &bus, config());
		for _ in 0..3 {
			scheduler.tick().await;
		}

		assert_eq!(reload(&deps, "good").await.payment, PaymentStatus::Paid);
		assert_eq!(
			reload(&deps, "stuck-00").await.payment,
			PaymentStatus::Unpaid
		);
	}

	#[tokio::test]
	async fn test_cursor_wraps_after_short_page() {
		let (_, deps, _) = harness();
		for id in ["a", "b", "c"] {
			seed_order(&deps, id, 1, None, OrderStatus::Created, PaymentStatus::Unpaid).await;
		}
		let seen = Arc::new(AtomicUsize::new(0));
		let scheduler = Scheduler::with_passes(
			deps.storage.clone(),
			vec![Box::new(CountingPass {
				seen: seen.clone(),
				slow: "",
			})],
			SchedulerConfig {
				page_size: 2,
				..config()
			},
		);

		// Pages of two: [a, b], [c], then back to [a, b].
		scheduler.tick().await;
		assert_eq!(seen.load(Ordering::SeqCst), 2);
		scheduler.tick().await;
		assert_eq!(seen.load(Ordering::SeqCst), 3);
		scheduler.tick().await;
		assert_eq!(seen.load(Ordering::SeqCst), 5);
	}

	#[tokio::test(start_paused = true)]
	async fn test_run_stops_on_shutdown() {
		let (_, deps, bus) = harness();
		let scheduler = Arc::new(Scheduler::new(&deps, &bus, config()));
		let (tx, rx) = watch::channel(false);

		let handle = tokio::spawn({
			let scheduler = scheduler.clone();
			async move { scheduler.run(rx).await }
		});
		tokio::time::sleep(Duration::from_secs(3)).await;
		tx.send(true).unwrap();
		handle.await.unwrap();
	}
}
