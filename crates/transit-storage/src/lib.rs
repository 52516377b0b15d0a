//! Order persistence for the transit service.
//!
//! Backends implement a small row-store interface over [`Order`] rows:
//! unique inserts, point lookups, bounded filtered scans and field-scoped
//! patches. Patches are validated against the order lifecycle inside the
//! backend so that concurrent writers can never move a row backwards.

use async_trait::async_trait;
use thiserror::Error;
use transit_types::{Order, OrderFilter, OrderPatch, TransitionError};

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Rows returned by `get_orders` when the caller gives no limit.
pub const DEFAULT_PAGE_SIZE: usize = 25;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Not found")]
	NotFound,
	/// An order with the same id is already stored.
	#[error("Already exists: {0}")]
	AlreadyExists(String),
	/// The id cannot be stored by this backend.
	#[error("Invalid order id: {0}")]
	InvalidId(String),
	/// The patch would break the order lifecycle.
	#[error("Invalid transition: {0}")]
	InvalidTransition(#[from] TransitionError),
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Backend error: {0}")]
	Backend(String),
}

/// Interface every order store implements.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Inserts a new order. Fails with `AlreadyExists` on a duplicate id.
	async fn create_order(&self, order: &Order) -> Result<(), StorageError>;

	async fn get_order(&self, id: &str) -> Result<Order, StorageError>;

	/// Returns up to `limit` matching orders, oldest first.
	async fn get_orders(&self, filter: &OrderFilter, limit: usize)
		-> Result<Vec<Order>, StorageError>;

	/// Applies `patch` to one row atomically and returns the updated row.
	async fn update_order(&self, id: &str, patch: &OrderPatch) -> Result<Order, StorageError>;

	async fn delete_order(&self, id: &str) -> Result<(), StorageError>;
}

/// Store wrapper used by the rest of the service.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	pub async fn create_order(&self, order: &Order) -> Result<(), StorageError> {
		self.backend.create_order(order).await?;
		tracing::debug!(order_id = %order.id, size = order.size, "order stored");
		Ok(())
	}

	pub async fn get_order(&self, id: &str) -> Result<Order, StorageError> {
		self.backend.get_order(id).await
	}

	/// Returns a page of matching orders. `None` uses [`DEFAULT_PAGE_SIZE`].
	pub async fn get_orders(
		&self,
		filter: &OrderFilter,
		limit: Option<usize>,
	) -> Result<Vec<Order>, StorageError> {
		self.backend
			.get_orders(filter, limit.unwrap_or(DEFAULT_PAGE_SIZE))
			.await
	}

	pub async fn update_order(&self, id: &str, patch: &OrderPatch) -> Result<Order, StorageError> {
		let order = self.backend.update_order(id, patch).await?;
		tracing::debug!(
			order_id = %id,
			status = %order.status,
			payment = %order.payment,
			"order updated"
		);
		Ok(order)
	}

	/// Removes an order. Only reachable from administrative tooling.
	pub async fn delete_order(&self, id: &str) -> Result<(), StorageError> {
		self.backend.delete_order(id).await?;
		tracing::warn!(order_id = %id, "order deleted");
		Ok(())
	}
}

/// Factory function to create a storage backend from its name and settings.
pub fn create_storage(
	backend: &str,
	config: &toml::Value,
) -> Result<Box<dyn StorageInterface>, StorageError> {
	match backend {
		"memory" => Ok(Box::new(implementations::memory::MemoryStorage::new())),
		"file" => implementations::file::create_storage(config),
		other => Err(StorageError::Backend(format!(
			"unknown storage backend '{}'",
			other
		))),
	}
}

/// Sorts oldest first and truncates to `limit`. Shared by the backends.
pub(crate) fn page(mut orders: Vec<Order>, limit: usize) -> Vec<Order> {
	orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
	orders.truncate(limit);
	orders
}

#[cfg(test)]
pub(crate) mod test_support {
	use super::*;
	use transit_types::{OrderKey, OrderScope, OrderStatus, PaymentStatus};

	pub fn order(id: &str, created_at: u64) -> Order {
		let mut order = Order::new(id, "https://bundler.example", "bundler", 1000);
		order.created_at = created_at;
		order
	}

	/// Behaviour every backend must share.
	pub async fn exercise_backend(store: &dyn StorageInterface) {
		store.create_order(&order("b", 2)).await.unwrap();
		store.create_order(&order("a", 1)).await.unwrap();
		store.create_order(&order("c", 3)).await.unwrap();

		assert!(matches!(
			store.create_order(&order("a", 9)).await,
			Err(StorageError::AlreadyExists(id)) if id == "a"
		));
		assert!(matches!(
			store.get_order("missing").await,
			Err(StorageError::NotFound)
		));

		let page = store.get_orders(&OrderFilter::new(), 2).await.unwrap();
		let ids: Vec<_> = page.iter().map(|o| o.id.as_str()).collect();
		assert_eq!(ids, vec!["a", "b"]);

		let resumed = store
			.get_orders(&OrderFilter::new().with_after(OrderKey::of(&page[1])), 25)
			.await
			.unwrap();
		let ids: Vec<_> = resumed.iter().map(|o| o.id.as_str()).collect();
		assert_eq!(ids, vec!["c"]);

		let updated = store
			.update_order(
				"b",
				&OrderPatch::new()
					.transaction_id("payment")
					.status(OrderStatus::Queued),
			)
			.await
			.unwrap();
		assert_eq!(updated.status, OrderStatus::Queued);
		assert_eq!(updated.payment, PaymentStatus::Unpaid);
		assert_eq!(updated.url, "https://bundler.example");

		let with_tx = store
			.get_orders(
				&OrderFilter::new()
					.with_payment(PaymentStatus::Unpaid)
					.with_scope(OrderScope::HasTransactionId),
				25,
			)
			.await
			.unwrap();
		assert_eq!(with_tx.len(), 1);
		assert_eq!(with_tx[0].transaction_id.as_deref(), Some("payment"));

		assert!(matches!(
			store
				.update_order("b", &OrderPatch::new().status(OrderStatus::Created))
				.await,
			Err(StorageError::InvalidTransition(_))
		));
		assert_eq!(
			store.get_order("b").await.unwrap().status,
			OrderStatus::Queued
		);
		assert!(matches!(
			store
				.update_order("missing", &OrderPatch::new().status(OrderStatus::Queued))
				.await,
			Err(StorageError::NotFound)
		));

		store.delete_order("c").await.unwrap();
		assert!(matches!(
			store.get_order("c").await,
			Err(StorageError::NotFound)
		));
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_service_default_page_size() {
		let service = StorageService::new(Box::new(implementations::memory::MemoryStorage::new()));
		for i in 0..30 {
			service
				.create_order(&test_support::order(&format!("order-{:02}", i), i))
				.await
				.unwrap();
		}

		let page = service.get_orders(&OrderFilter::new(), None).await.unwrap();
		assert_eq!(page.len(), DEFAULT_PAGE_SIZE);
		assert_eq!(page[0].id, "order-00");
	}

	#[test]
	fn test_unknown_backend() {
		let config = toml::Value::Table(Default::default());
		assert!(create_storage("postgres", &config).is_err());
		assert!(create_storage("memory", &config).is_ok());
	}
}
