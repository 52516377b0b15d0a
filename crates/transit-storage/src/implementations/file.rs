//! File-based order store.
//!
//! Each order is one JSON document under the storage directory. Writes go to
//! a temporary file that is renamed over the target. The directory is read
//! once, on first use, into an in-memory index keyed by lifecycle state, and
//! every later query is answered from that index. The index lock serialises
//! read-modify-write so patches stay atomic per row.

use crate::{page, StorageError, StorageInterface};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{OnceCell, RwLock};
use transit_types::{
	ConfigSchema, Field, FieldType, Order, OrderFilter, OrderKey, OrderPatch, OrderStatus,
	PaymentStatus, Schema,
};

const EXTENSION: &str = "json";

type State = (OrderStatus, PaymentStatus);

/// Orders on disk, grouped by `(status, payment)` in page order.
#[derive(Default)]
struct Index {
	rows: HashMap<String, Order>,
	by_state: HashMap<State, BTreeSet<OrderKey>>,
}

impl Index {
	fn insert(&mut self, order: Order) {
		if let Some(previous) = self.rows.get(&order.id) {
			let state = (previous.status, previous.payment);
			if let Some(keys) = self.by_state.get_mut(&state) {
				keys.remove(&OrderKey::of(previous));
			}
		}
		self.by_state
			.entry((order.status, order.payment))
			.or_default()
			.insert(OrderKey::of(&order));
		self.rows.insert(order.id.clone(), order);
	}

	fn remove(&mut self, id: &str) -> Option<Order> {
		let order = self.rows.remove(id)?;
		if let Some(keys) = self.by_state.get_mut(&(order.status, order.payment)) {
			keys.remove(&OrderKey::of(&order));
		}
		Some(order)
	}

	/// Walks only the state buckets the filter can match, each from the
	/// filter's cursor, and stops a bucket once it has yielded `limit` rows.
	fn query(&self, filter: &OrderFilter, limit: usize) -> Vec<Order> {
		if let Some(id) = &filter.id {
			return self
				.rows
				.get(id)
				.filter(|order| filter.matches(order))
				.cloned()
				.into_iter()
				.collect();
		}

		let start = match &filter.after {
			Some(key) => Bound::Excluded(key.clone()),
			None => Bound::Unbounded,
		};
		let mut matches = Vec::new();
		for ((status, payment), keys) in &self.by_state {
			if filter.status.is_some_and(|s| s != *status)
				|| filter.payment.is_some_and(|p| p != *payment)
			{
				continue;
			}
			matches.extend(
				keys.range((start.clone(), Bound::Unbounded))
					.filter_map(|key| self.rows.get(&key.id))
					.filter(|order| filter.matches(order))
					.take(limit)
					.cloned(),
			);
		}
		page(matches, limit)
	}
}

pub struct FileStorage {
	base_path: PathBuf,
	index: OnceCell<RwLock<Index>>,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self {
			base_path,
			index: OnceCell::new(),
		}
	}

	/// Ids become file names, so only the base64url alphabet is accepted.
	fn order_path(&self, id: &str) -> Result<PathBuf, StorageError> {
		let valid = !id.is_empty()
			&& id
				.bytes()
				.all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
		if !valid {
			return Err(StorageError::InvalidId(id.to_string()));
		}
		Ok(self.base_path.join(format!("{}.{}", id, EXTENSION)))
	}

	async fn index(&self) -> Result<&RwLock<Index>, StorageError> {
		self.index
			.get_or_try_init(|| async { self.load().await.map(RwLock::new) })
			.await
	}

	async fn load(&self) -> Result<Index, StorageError> {
		let mut index = Index::default();
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(index),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
				continue;
			}
			match read(&path).await {
				Ok(order) => index.insert(order),
				Err(e) => {
					tracing::warn!(path = %path.display(), error = %e, "skipping unreadable order file");
				}
			}
		}

		tracing::info!(
			path = %self.base_path.display(),
			orders = index.rows.len(),
			"order index loaded"
		);
		Ok(index)
	}

	async fn write(&self, order: &Order) -> Result<(), StorageError> {
		let path = self.order_path(&order.id)?;
		let bytes =
			serde_json::to_vec_pretty(order).map_err(|e| StorageError::Serialization(e.to_string()))?;

		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, bytes)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}
}

async fn read(path: &Path) -> Result<Order, StorageError> {
	let bytes = fs::read(path)
		.await
		.map_err(|e| StorageError::Backend(e.to_string()))?;
	serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn create_order(&self, order: &Order) -> Result<(), StorageError> {
		self.order_path(&order.id)?;
		let mut index = self.index().await?.write().await;
		if index.rows.contains_key(&order.id) {
			return Err(StorageError::AlreadyExists(order.id.clone()));
		}
		self.write(order).await?;
		index.insert(order.clone());
		Ok(())
	}

	async fn get_order(&self, id: &str) -> Result<Order, StorageError> {
		let index = self.index().await?.read().await;
		index.rows.get(id).cloned().ok_or(StorageError::NotFound)
	}

	async fn get_orders(
		&self,
		filter: &OrderFilter,
		limit: usize,
	) -> Result<Vec<Order>, StorageError> {
		Ok(self.index().await?.read().await.query(filter, limit))
	}

	async fn update_order(&self, id: &str, patch: &OrderPatch) -> Result<Order, StorageError> {
		let mut index = self.index().await?.write().await;
		let mut order = index.rows.get(id).cloned().ok_or(StorageError::NotFound)?;
		order.apply(patch)?;
		self.write(&order).await?;
		index.insert(order.clone());
		Ok(order)
	}

	async fn delete_order(&self, id: &str) -> Result<(), StorageError> {
		let mut index = self.index().await?.write().await;
		if !index.rows.contains_key(id) {
			return Err(StorageError::NotFound);
		}
		match fs::remove_file(self.order_path(id)?).await {
			Ok(_) => {}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		}
		index.remove(id);
		Ok(())
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), transit_types::ValidationError> {
		Schema::new(vec![], vec![Field::new("storage_path", FieldType::String)]).validate(config)
	}
}

/// Creates a file store from configuration.
///
/// Configuration parameters:
/// - `storage_path`: directory holding the order files (default: "./data/orders")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Backend(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/orders");

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}
