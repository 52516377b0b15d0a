//! In-process fakes of every external collaborator.

use crate::{Dependencies, EventBus};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use transit_account::{AccountError, AccountInterface, AccountService};
use transit_bundler::{BundlerError, BundlerInterface, BundlerService};
use transit_codec::DataItem;
use transit_contract::{ContractError, ContractInterface, ContractService};
use transit_ledger::{LedgerError, LedgerInterface, LedgerService};
use transit_storage::implementations::memory::MemoryStorage;
use transit_storage::StorageService;
use transit_types::{
	ConfigSchema, DataItemPostResponse, DataItemPutResponse, LedgerTransaction, Order,
	OrderStatus, PaymentStatus, Staker, TransactionStatus, ValidationError,
};

pub const SERVICE_ADDRESS: &str = "service-wallet";
pub const BUNDLER_ADDRESS: &str = "bundler-address";
pub const BUNDLER_URL: &str = "bundler.example";
pub const REWARD: &str = "7";

struct NoConfig;

impl ConfigSchema for NoConfig {
	fn validate(&self, _config: &toml::Value) -> Result<(), ValidationError> {
		Ok(())
	}
}

#[derive(Clone, Default)]
pub struct FakeLedger {
	pub base_price: Arc<Mutex<String>>,
	pub transactions: Arc<Mutex<HashMap<String, LedgerTransaction>>>,
	pub confirmations: Arc<Mutex<HashMap<String, u64>>>,
	pub submitted: Arc<Mutex<Vec<LedgerTransaction>>>,
	pub unavailable: Arc<AtomicBool>,
	pub reject_submissions: Arc<AtomicBool>,
}

impl FakeLedger {
	pub fn set_base_price(&self, price: &str) {
		*self.base_price.lock().unwrap() = price.to_string();
	}

	/// Records a client payment of `quantity` to `target`.
	pub fn add_payment(&self, id: &str, target: &str, quantity: &str) {
		let tx = LedgerTransaction {
			id: id.to_string(),
			..LedgerTransaction::transfer(target, quantity, "1", "anchor")
		};
		self.transactions
			.lock()
			.unwrap()
			.insert(id.to_string(), tx);
	}

	pub fn set_confirmations(&self, id: &str, confirmations: u64) {
		self.confirmations
			.lock()
			.unwrap()
			.insert(id.to_string(), confirmations);
	}

	pub fn submitted(&self) -> Vec<LedgerTransaction> {
		self.submitted.lock().unwrap().clone()
	}

	fn check_available(&self) -> Result<(), LedgerError> {
		if self.unavailable.load(Ordering::SeqCst) {
			return Err(LedgerError::Network("gateway unreachable".into()));
		}
		Ok(())
	}
}

#[async_trait]
impl LedgerInterface for FakeLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(NoConfig)
	}

	async fn price(&self, _bytes: u64, target: Option<&str>) -> Result<String, LedgerError> {
		self.check_available()?;
		match target {
			Some(_) => Ok(REWARD.to_string()),
			None => Ok(self.base_price.lock().unwrap().clone()),
		}
	}

	async fn get_transaction(&self, id: &str) -> Result<LedgerTransaction, LedgerError> {
		self.check_available()?;
		self.transactions
			.lock()
			.unwrap()
			.get(id)
			.cloned()
			.ok_or(LedgerError::NotFound)
	}

	async fn get_transaction_status(&self, id: &str) -> Result<TransactionStatus, LedgerError> {
		self.check_available()?;
		if let Some(confirmations) = self.confirmations.lock().unwrap().get(id) {
			return Ok(TransactionStatus {
				block_height: 100,
				block_indep_hash: "block".into(),
				number_of_confirmations: *confirmations,
			});
		}
		if self.submitted.lock().unwrap().iter().any(|tx| tx.id == id) {
			return Err(LedgerError::Pending);
		}
		Err(LedgerError::NotFound)
	}

	async fn anchor(&self) -> Result<String, LedgerError> {
		self.check_available()?;
		Ok("anchor".into())
	}

	async fn submit_transaction(&self, tx: &LedgerTransaction) -> Result<(), LedgerError> {
		self.check_available()?;
		if self.reject_submissions.load(Ordering::SeqCst) {
			return Err(LedgerError::Status {
				status: 400,
				body: "rejected".into(),
			});
		}
		self.submitted.lock().unwrap().push(tx.clone());
		Ok(())
	}
}

#[derive(Clone, Default)]
pub struct FakeBundler {
	pub items: Arc<Mutex<HashMap<String, Bytes>>>,
	pub notifications: Arc<Mutex<Vec<(String, String, String)>>>,
	pub unavailable: Arc<AtomicBool>,
}

impl FakeBundler {
	pub fn notifications(&self) -> Vec<(String, String, String)> {
		self.notifications.lock().unwrap().clone()
	}

	fn check_available(&self) -> Result<(), BundlerError> {
		if self.unavailable.load(Ordering::SeqCst) {
			return Err(BundlerError::Network("bundler unreachable".into()));
		}
		Ok(())
	}
}

#[async_trait]
impl BundlerInterface for FakeBundler {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(NoConfig)
	}

	async fn get_data_item(&self, _url: &str, id: &str) -> Result<Bytes, BundlerError> {
		self.check_available()?;
		self.items
			.lock()
			.unwrap()
			.get(id)
			.cloned()
			.ok_or(BundlerError::NotFound)
	}

	async fn get_data_item_status(
		&self,
		url: &str,
		id: &str,
	) -> Result<serde_json::Value, BundlerError> {
		self.get_data_item(url, id).await?;
		Ok(serde_json::json!({ "id": id, "status": "pending" }))
	}

	async fn post_data_item(
		&self,
		_url: &str,
		item: Bytes,
	) -> Result<DataItemPostResponse, BundlerError> {
		self.check_available()?;
		let id = DataItem::decode(item.clone())
			.map_err(|e| BundlerError::Decode(e.to_string()))?
			.id();
		self.items.lock().unwrap().insert(id.clone(), item);
		let mut extra = serde_json::Map::new();
		extra.insert("signature".into(), serde_json::json!("receipt"));
		Ok(DataItemPostResponse {
			id,
			owner: BUNDLER_ADDRESS.into(),
			data_caches: vec!["arweave.net".into()],
			deadline_height: 1500,
			fast_finality_indexes: vec![],
			version: "1.0.0".into(),
			extra,
		})
	}

	async fn put_data_item(
		&self,
		url: &str,
		id: &str,
		payment_id: &str,
	) -> Result<DataItemPutResponse, BundlerError> {
		self.check_available()?;
		self.notifications.lock().unwrap().push((
			url.to_string(),
			id.to_string(),
			payment_id.to_string(),
		));
		Ok(DataItemPutResponse {
			id: id.to_string(),
			payment_id: payment_id.to_string(),
		})
	}
}

#[derive(Clone, Default)]
pub struct FakeContract {
	pub unavailable: Arc<AtomicBool>,
}

#[async_trait]
impl ContractInterface for FakeContract {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(NoConfig)
	}

	async fn initiate(&self, _id: &str, _size: u64) -> Result<Staker, ContractError> {
		if self.unavailable.load(Ordering::SeqCst) {
			return Err(ContractError::Network("contract unreachable".into()));
		}
		Ok(Staker {
			id: BUNDLER_ADDRESS.into(),
			url: BUNDLER_URL.into(),
		})
	}
}

/// Signs by numbering transactions `settlement-1`, `settlement-2`, ...
#[derive(Clone, Default)]
pub struct FakeAccount {
	pub signed: Arc<AtomicU64>,
}

#[async_trait]
impl AccountInterface for FakeAccount {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(NoConfig)
	}

	async fn address(&self) -> Result<String, AccountError> {
		Ok(SERVICE_ADDRESS.into())
	}

	async fn sign_transaction(
		&self,
		mut tx: LedgerTransaction,
	) -> Result<LedgerTransaction, AccountError> {
		let n = self.signed.fetch_add(1, Ordering::SeqCst) + 1;
		tx.owner = "service-owner".into();
		tx.signature = format!("signature-{}", n);
		tx.id = format!("settlement-{}", n);
		Ok(tx)
	}
}

#[derive(Clone, Default)]
pub struct Fakes {
	pub ledger: FakeLedger,
	pub bundler: FakeBundler,
	pub contract: FakeContract,
	pub account: FakeAccount,
}

impl Fakes {
	pub fn dependencies(&self) -> Dependencies {
		Dependencies {
			storage: Arc::new(StorageService::new(Box::new(MemoryStorage::new()))),
			bundler: Arc::new(BundlerService::new(Box::new(self.bundler.clone()))),
			ledger: Arc::new(LedgerService::new(Box::new(self.ledger.clone()))),
			contract: Arc::new(ContractService::new(Box::new(self.contract.clone()))),
			account: Arc::new(AccountService::new(Box::new(self.account.clone()))),
		}
	}
}

/// Fakes plus dependencies wired to them and an event bus.
pub fn harness() -> (Fakes, Dependencies, EventBus) {
	let fakes = Fakes::default();
	let deps = fakes.dependencies();
	(fakes, deps, EventBus::new(64))
}

/// Stores an order already moved to the given state.
pub async fn seed_order(
	deps: &Dependencies,
	id: &str,
	size: u64,
	transaction_id: Option<&str>,
	status: OrderStatus,
	payment: PaymentStatus,
) -> Order {
	let mut order = Order::new(id, BUNDLER_URL, BUNDLER_ADDRESS, size);
	order.transaction_id = transaction_id.map(str::to_string);
	order.status = status;
	order.payment = payment;
	deps.storage.create_order(&order).await.unwrap();
	order
}

pub async fn reload(deps: &Dependencies, id: &str) -> Order {
	deps.storage.get_order(id).await.unwrap()
}

