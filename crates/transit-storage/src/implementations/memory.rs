//! In-memory order store.
//!
//! Rows live in a concurrent map and are lost on restart. Useful for tests
//! and for running the service without a data directory.

use crate::{page, StorageError, StorageInterface};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use transit_types::{Order, OrderFilter, OrderPatch};

#[derive(Default)]
pub struct MemoryStorage {
	orders: DashMap<String, Order>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn create_order(&self, order: &Order) -> Result<(), StorageError> {
		match self.orders.entry(order.id.clone()) {
			Entry::Occupied(_) => Err(StorageError::AlreadyExists(order.id.clone())),
			Entry::Vacant(slot) => {
				slot.insert(order.clone());
				Ok(())
			}
		}
	}

	async fn get_order(&self, id: &str) -> Result<Order, StorageError> {
		self.orders
			.get(id)
			.map(|o| o.value().clone())
			.ok_or(StorageError::NotFound)
	}

	async fn get_orders(
		&self,
		filter: &OrderFilter,
		limit: usize,
	) -> Result<Vec<Order>, StorageError> {
		let matches = self
			.orders
			.iter()
			.filter(|o| filter.matches(o.value()))
			.map(|o| o.value().clone())
			.collect();
		Ok(page(matches, limit))
	}

	async fn update_order(&self, id: &str, patch: &OrderPatch) -> Result<Order, StorageError> {
		// The shard lock is held for the whole read-check-write.
		let mut row = self.orders.get_mut(id).ok_or(StorageError::NotFound)?;
		row.apply(patch)?;
		Ok(row.value().clone())
	}

	async fn delete_order(&self, id: &str) -> Result<(), StorageError> {
		self.orders
			.remove(id)
			.map(|_| ())
			.ok_or(StorageError::NotFound)
	}
}
