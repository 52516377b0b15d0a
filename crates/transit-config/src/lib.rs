//! Configuration for the transit service.
//!
//! Configuration is read from a TOML file. `${VAR}` references anywhere in
//! the file are replaced with the value of the named environment variable
//! before parsing, and a small set of `TRANSIT_`-prefixed variables override
//! individual settings afterwards.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;

/// Largest data item accepted by `POST /tx`, 2 GiB.
pub const MAX_DATA_SIZE: u64 = 2 * 1024 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Top level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	#[serde(default)]
	pub service: ServiceConfig,
	#[serde(default)]
	pub scheduler: SchedulerConfig,
	pub storage: BackendConfig,
	pub account: BackendConfig,
	pub ledger: BackendConfig,
	pub contract: BackendConfig,
	#[serde(default = "default_bundler")]
	pub bundler: BackendConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
	pub name: String,
	pub host: String,
	pub port: u16,
	/// Upper bound for `content-length` on uploads.
	pub max_data_size: u64,
}

impl Default for ServiceConfig {
	fn default() -> Self {
		Self {
			name: "Transit".to_string(),
			host: "0.0.0.0".to_string(),
			port: 8080,
			max_data_size: MAX_DATA_SIZE,
		}
	}
}

/// Reconciliation loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
	/// Seconds between ticks.
	pub interval_secs: u64,
	/// Confirmations required before a payment counts as final.
	pub confirmation_threshold: u64,
	/// Rows loaded per pass per tick.
	pub page_size: usize,
	/// Rows of one page processed at the same time.
	pub concurrency: usize,
	/// Upper bound for the work done on a single row.
	pub row_timeout_secs: u64,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			interval_secs: 60,
			confirmation_threshold: 10,
			page_size: 25,
			concurrency: 1,
			row_timeout_secs: 120,
		}
	}
}

/// A pluggable component: the backend name and its own settings table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
	pub backend: String,
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::map::Map::new())
}

fn default_bundler() -> BackendConfig {
	BackendConfig {
		backend: "http".to_string(),
		config: empty_table(),
	}
}

/// Loads configuration from a file with environment variable substitution.
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "TRANSIT_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<Config, ConfigError> {
		let file_path = self.file_path.as_ref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;

		let content = match tokio::fs::read_to_string(file_path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(ConfigError::FileNotFound(file_path.clone()))
			}
			Err(e) => return Err(e.into()),
		};

		self.parse(&content)
	}

	/// Parses, overrides and validates configuration text.
	pub fn parse(&self, content: &str) -> Result<Config, ConfigError> {
		let substituted = self.substitute_env_vars(content)?;

		let mut config: Config =
			toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))?;

		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;

		tracing::debug!(
			storage = %config.storage.backend,
			ledger = %config.ledger.backend,
			contract = %config.contract.backend,
			"configuration parsed"
		);

		Ok(config)
	}

	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let re = regex::Regex::new(r"\$\{([^}]+)\}")
			.map_err(|e| ConfigError::ParseError(e.to_string()))?;

		let mut result = content.to_string();
		for cap in re.captures_iter(content) {
			let var_name = &cap[1];
			let value = env::var(var_name)
				.map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
			result = result.replace(&cap[0], &value);
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Ok(host) = env::var(format!("{}HOST", self.env_prefix)) {
			config.service.host = host;
		}

		if let Ok(port) = env::var(format!("{}PORT", self.env_prefix)) {
			config.service.port = port
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid port: {}", e)))?;
		}

		if let Ok(interval) = env::var(format!("{}SCHEDULER_INTERVAL_SECS", self.env_prefix)) {
			config.scheduler.interval_secs = interval.parse().map_err(|e| {
				ConfigError::ValidationError(format!("Invalid scheduler interval: {}", e))
			})?;
		}

		Ok(())
	}
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
	let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

	if config.service.max_data_size == 0 || config.service.max_data_size > MAX_DATA_SIZE {
		return invalid("service.max_data_size must be between 1 and 2147483648");
	}
	if config.scheduler.interval_secs == 0 {
		return invalid("scheduler.interval_secs must be positive");
	}
	if config.scheduler.confirmation_threshold == 0 {
		return invalid("scheduler.confirmation_threshold must be positive");
	}
	if config.scheduler.page_size == 0 {
		return invalid("scheduler.page_size must be positive");
	}
	if config.scheduler.concurrency == 0 {
		return invalid("scheduler.concurrency must be positive");
	}
	if config.scheduler.row_timeout_secs == 0 {
		return invalid("scheduler.row_timeout_secs must be positive");
	}

	for (section, backend) in [
		("storage", &config.storage),
		("account", &config.account),
		("ledger", &config.ledger),
		("contract", &config.contract),
		("bundler", &config.bundler),
	] {
		if backend.backend.trim().is_empty() {
			return Err(ConfigError::ValidationError(format!(
				"{}.backend must not be empty",
				section
			)));
		}
		if !backend.config.is_table() {
			return Err(ConfigError::ValidationError(format!(
				"{}.config must be a table",
				section
			)));
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	const MINIMAL: &str = r#"
[storage]
backend = "memory"

[account]
backend = "local"
[account.config]
key_path = "wallet.json"

[ledger]
backend = "gateway"
[ledger.config]
gateway = "https://ledger.example"

[contract]
backend = "static"
[[contract.config.stakers]]
id = "bundler-address"
url = "https://bundler.example"
"#;

	#[test]
	fn test_defaults_applied() {
		let config = ConfigLoader::new()
			.with_env_prefix("TRANSIT_TEST_DEFAULTS_")
			.parse(MINIMAL)
			.unwrap();

		assert_eq!(config.service.port, 8080);
		assert_eq!(config.service.max_data_size, MAX_DATA_SIZE);
		assert_eq!(config.scheduler.interval_secs, 60);
		assert_eq!(config.scheduler.confirmation_threshold, 10);
		assert_eq!(config.scheduler.page_size, 25);
		assert_eq!(config.bundler.backend, "http");
		assert!(config.bundler.config.is_table());
	}

	#[test]
	fn test_env_substitution_and_overrides() {
		env::set_var("TRANSIT_TEST_GATEWAY_URL", "https://other-ledger.example");
		env::set_var("TRANSIT_TEST_ENV_PORT", "9090");

		let content = MINIMAL.replace("https://ledger.example", "${TRANSIT_TEST_GATEWAY_URL}");
		let config = ConfigLoader::new()
			.with_env_prefix("TRANSIT_TEST_ENV_")
			.parse(&content)
			.unwrap();

		assert_eq!(
			config.ledger.config.get("gateway").and_then(|v| v.as_str()),
			Some("https://other-ledger.example")
		);
		assert_eq!(config.service.port, 9090);
	}

	#[test]
	fn test_missing_env_var_is_reported() {
		let content = MINIMAL.replace("wallet.json", "${TRANSIT_TEST_DOES_NOT_EXIST}");
		let err = ConfigLoader::new().parse(&content).unwrap_err();
		assert!(matches!(err, ConfigError::EnvVarNotFound(v) if v == "TRANSIT_TEST_DOES_NOT_EXIST"));
	}

	#[test]
	fn test_rejects_zero_threshold() {
		let content = format!("{}\n[scheduler]\nconfirmation_threshold = 0\n", MINIMAL);
		let err = ConfigLoader::new()
			.with_env_prefix("TRANSIT_TEST_ZERO_")
			.parse(&content)
			.unwrap_err();
		assert!(matches!(err, ConfigError::ValidationError(_)));
	}

	#[tokio::test]
	async fn test_load_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(MINIMAL.as_bytes()).unwrap();

		let config = ConfigLoader::new()
			.with_env_prefix("TRANSIT_TEST_FILE_")
			.with_file(file.path())
			.load()
			.await
			.unwrap();
		assert_eq!(config.storage.backend, "memory");

		let missing = ConfigLoader::new()
			.with_file("/definitely/not/here.toml")
			.load()
			.await;
		assert!(matches!(missing, Err(ConfigError::FileNotFound(_))));
	}
}
