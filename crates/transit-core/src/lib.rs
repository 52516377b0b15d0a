//! Order lifecycle engine of the transit upload broker.
//!
//! [`Intake`] turns uploads into orders and records client payments. The
//! [`Scheduler`] then reconciles those orders against the ledger on a fixed
//! cadence until the bundler has been paid. Both work on the same
//! [`Dependencies`], which the [`TransitBuilder`] assembles from configuration.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use transit_account::{AccountError, AccountInterface, AccountService};
use transit_bundler::{BundlerError, BundlerInterface, BundlerService};
use transit_config::{BackendConfig, Config};
use transit_contract::{ContractError, ContractInterface, ContractService};
use transit_ledger::{LedgerError, LedgerInterface, LedgerService};
use transit_storage::{StorageError, StorageInterface, StorageService};

pub mod error;
pub mod event_bus;
pub mod intake;
pub mod media;
pub mod passes;
pub mod pricing;
pub mod scheduler;

#[cfg(any(test, feature = "testing"))]
pub mod test_support;

pub use error::{IntakeError, ReconcileError};
pub use event_bus::EventBus;
pub use intake::Intake;
pub use scheduler::Scheduler;

const EVENT_BUS_CAPACITY: usize = 1000;

#[derive(Debug, Error)]
pub enum TransitError {
	#[error("Configuration error: {0}")]
	Config(String),
}

/// External collaborators shared by intake and the scheduler passes.
#[derive(Clone)]
pub struct Dependencies {
	pub storage: Arc<StorageService>,
	pub bundler: Arc<BundlerService>,
	pub ledger: Arc<LedgerService>,
	pub contract: Arc<ContractService>,
	pub account: Arc<AccountService>,
}

pub struct TransitEngine {
	config: Config,
	deps: Dependencies,
	event_bus: EventBus,
	intake: Arc<Intake>,
	scheduler: Arc<Scheduler>,
}

impl TransitEngine {
	pub fn new(config: Config, deps: Dependencies) -> Self {
		let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
		let intake = Arc::new(Intake::new(
			deps.clone(),
			event_bus.clone(),
			config.service.max_data_size,
		));
		let scheduler = Arc::new(Scheduler::new(
			&deps,
			&event_bus,
			config.scheduler.clone(),
		));
		Self {
			config,
			deps,
			event_bus,
			intake,
			scheduler,
		}
	}

	/// Runs the reconciliation loop until `shutdown` fires.
	pub async fn run(&self, shutdown: watch::Receiver<bool>) {
		self.scheduler.run(shutdown).await;
	}

	pub fn intake(&self) -> Arc<Intake> {
		self.intake.clone()
	}

	pub fn scheduler(&self) -> Arc<Scheduler> {
		self.scheduler.clone()
	}

	pub fn dependencies(&self) -> &Dependencies {
		&self.deps
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	pub fn config(&self) -> &Config {
		&self.config
	}
}

// Type aliases for factory functions
type Factory<T, E> = Box<dyn Fn(&toml::Value) -> Result<Box<T>, E> + Send>;
type StorageFactory = Factory<dyn StorageInterface, StorageError>;
type BundlerFactory = Factory<dyn BundlerInterface, BundlerError>;
type LedgerFactory = Factory<dyn LedgerInterface, LedgerError>;
type ContractFactory = Factory<dyn ContractInterface, ContractError>;
type AccountFactory = Factory<dyn AccountInterface, AccountError>;

/// Builds a [`TransitEngine`] from configuration.
///
/// Each component is created by the factory registered under the backend
/// name its configuration section selects.
pub struct TransitBuilder {
	config: Config,
	storage_factories: HashMap<String, StorageFactory>,
	bundler_factories: HashMap<String, BundlerFactory>,
	ledger_factories: HashMap<String, LedgerFactory>,
	contract_factories: HashMap<String, ContractFactory>,
	account_factories: HashMap<String, AccountFactory>,
}

impl TransitBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			storage_factories: HashMap::new(),
			bundler_factories: HashMap::new(),
			ledger_factories: HashMap::new(),
			contract_factories: HashMap::new(),
			account_factories: HashMap::new(),
		}
	}

	pub fn with_storage_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> + Send + 'static,
	{
		self.storage_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_bundler_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn BundlerInterface>, BundlerError> + Send + 'static,
	{
		self.bundler_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_ledger_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError> + Send + 'static,
	{
		self.ledger_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_contract_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn ContractInterface>, ContractError>
			+ Send
			+ 'static,
	{
		self.contract_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_account_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> + Send + 'static,
	{
		self.account_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn build(self) -> Result<TransitEngine, TransitError> {
		let config = &self.config;

		let storage = instantiate("storage", &self.storage_factories, &config.storage)?;
		let bundler = instantiate("bundler", &self.bundler_factories, &config.bundler)?;
		let ledger = instantiate("ledger", &self.ledger_factories, &config.ledger)?;
		let contract = instantiate("contract", &self.contract_factories, &config.contract)?;
		let account = instantiate("account", &self.account_factories, &config.account)?;

		let deps = Dependencies {
			storage: Arc::new(StorageService::new(storage)),
			bundler: Arc::new(BundlerService::new(bundler)),
			ledger: Arc::new(LedgerService::new(ledger)),
			contract: Arc::new(ContractService::new(contract)),
			account: Arc::new(AccountService::new(account)),
		};

		Ok(TransitEngine::new(self.config, deps))
	}
}

fn instantiate<T: ?Sized, E: Display>(
	component: &str,
	factories: &HashMap<String, Factory<T, E>>,
	section: &BackendConfig,
) -> Result<Box<T>, TransitError> {
	let factory = factories.get(&section.backend).ok_or_else(|| {
		TransitError::Config(format!(
			"{} factory '{}' not provided",
			component, section.backend
		))
	})?;
	factory(&section.config)
		.map_err(|e| TransitError::Config(format!("{} '{}': {}", component, section.backend, e)))
}
