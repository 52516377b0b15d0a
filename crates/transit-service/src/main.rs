use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transit_config::{Config, ConfigLoader};
use transit_core::TransitBuilder;
use transit_types::TransitEvent;

mod admin;
mod apis;
mod server;

#[derive(Parser)]
#[command(name = "transit")]
#[command(about = "Transit upload broker", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/transit.toml")]
	config: PathBuf,

	#[arg(long, env = "TRANSIT_LOG_LEVEL", default_value = "info")]
	log_level: String,

	#[arg(long, value_enum, default_value_t = LogFormat::Text)]
	log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the HTTP API and the order scheduler
	Start,
	/// Validate the configuration file and every backend it selects
	Validate,
	/// Inspect or remove stored orders
	#[command(subcommand)]
	Orders(admin::OrdersCommand),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
	Text,
	Json,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level, cli.log_format)?;

	match cli.command {
		Some(Commands::Start) | None => start_service(&cli.config).await,
		Some(Commands::Validate) => validate_config(&cli.config).await,
		Some(Commands::Orders(command)) => {
			let config = load_config(&cli.config).await?;
			admin::run(&config, command).await
		}
	}
}

async fn load_config(path: &Path) -> Result<Config> {
	info!("Loading configuration from: {:?}", path);
	ConfigLoader::new()
		.with_file(path)
		.load()
		.await
		.context("Failed to load configuration")
}

/// Registers every backend this binary ships with.
fn builder(config: Config) -> TransitBuilder {
	use transit_account::implementations::local;
	use transit_bundler::implementations::http as http_bundler;
	use transit_contract::implementations::{http as http_contract, registry};
	use transit_ledger::implementations::gateway;

	TransitBuilder::new(config)
		.with_storage_factory("memory", |c| transit_storage::create_storage("memory", c))
		.with_storage_factory("file", |c| transit_storage::create_storage("file", c))
		.with_account_factory("local", local::create_account)
		.with_ledger_factory("gateway", gateway::create_ledger)
		.with_contract_factory("static", registry::create_contract)
		.with_contract_factory("http", http_contract::create_contract)
		.with_bundler_factory("http", http_bundler::create_bundler)
}

async fn start_service(path: &Path) -> Result<()> {
	info!("Starting Transit");
	let config = load_config(path).await?;
	info!("Service name: {}", config.service.name);
	info!("HTTP address: {}:{}", config.service.host, config.service.port);

	let engine = Arc::new(
		builder(config.clone())
			.build()
			.context("Failed to build transit engine")?,
	);

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let events = tokio::spawn(log_events(engine.event_bus().subscribe()));

	let scheduler = tokio::spawn({
		let engine = engine.clone();
		let shutdown = shutdown_rx.clone();
		async move { engine.run(shutdown).await }
	});

	let state = server::AppState {
		intake: engine.intake(),
		name: config.service.name.clone(),
	};
	let mut http = tokio::spawn(server::start_server(
		config.service.clone(),
		state,
		shutdown_rx,
	));

	info!("Transit started successfully");

	let server_result = tokio::select! {
		_ = setup_shutdown_signal() => {
			info!("Shutdown signal received, stopping services...");
			None
		}
		result = &mut http => Some(result),
	};

	let _ = shutdown_tx.send(true);
	let server_result = match server_result {
		Some(result) => result,
		None => http.await,
	};
	scheduler.await.context("Scheduler task failed")?;
	events.abort();

	server_result
		.context("HTTP server task failed")?
		.context("HTTP server stopped")?;

	info!("Transit stopped");
	Ok(())
}

async fn validate_config(path: &Path) -> Result<()> {
	let config = load_config(path).await?;

	builder(config.clone())
		.build()
		.context("Failed to initialize backends")?;

	info!("Configuration is valid");
	info!("Service name: {}", config.service.name);
	info!("  Storage: {}", config.storage.backend);
	info!("  Account: {}", config.account.backend);
	info!("  Ledger: {}", config.ledger.backend);
	info!("  Contract: {}", config.contract.backend);
	info!("  Bundler: {}", config.bundler.backend);
	Ok(())
}

/// Writes lifecycle events to the log until the bus closes.
async fn log_events(mut events: broadcast::Receiver<TransitEvent>) {
	loop {
		match events.recv().await {
			Ok(event) => tracing::debug!(?event, "transit event"),
			Err(broadcast::error::RecvError::Lagged(skipped)) => {
				warn!(skipped, "event log fell behind");
			}
			Err(broadcast::error::RecvError::Closed) => break,
		}
	}
}

fn setup_tracing(log_level: &str, format: LogFormat) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	let registry = tracing_subscriber::registry().with(env_filter);
	match format {
		LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
		LogFormat::Json => registry
			.with(tracing_subscriber::fmt::layer().json())
			.try_init()?,
	}

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!("failed to install Ctrl+C handler: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut sigterm) => {
				sigterm.recv().await;
			}
			Err(e) => {
				error!("failed to install signal handler: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
