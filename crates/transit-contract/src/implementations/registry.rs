//! Fixed staker registry read from configuration.
//!
//! The staker for an item is chosen by hashing the item id, so the same item
//! always lands on the same bundler and load spreads evenly.

use crate::{ContractError, ContractInterface};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use transit_types::{ConfigSchema, Field, FieldType, Schema, Staker};

pub struct StaticRegistry {
	stakers: Vec<Staker>,
}

impl StaticRegistry {
	pub fn new(stakers: Vec<Staker>) -> Result<Self, ContractError> {
		if stakers.is_empty() {
			return Err(ContractError::NoStakers);
		}
		Ok(Self { stakers })
	}

	fn pick(&self, id: &str) -> &Staker {
		let digest = Sha256::digest(id.as_bytes());
		let mut head = [0u8; 8];
		head.copy_from_slice(&digest[..8]);
		let index = u64::from_be_bytes(head) % self.stakers.len() as u64;
		&self.stakers[index as usize]
	}
}

/// Configuration schema for StaticRegistry.
pub struct StaticRegistrySchema;

impl ConfigSchema for StaticRegistrySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), transit_types::ValidationError> {
		let staker = Schema::new(
			vec![
				Field::new("id", FieldType::String),
				Field::new("url", FieldType::String),
			],
			vec![],
		);
		let schema = Schema::new(
			vec![Field::new("stakers", FieldType::Array(Box::new(FieldType::Table(staker))))
				.with_validator(|value| match value.as_array() {
					Some(stakers) if !stakers.is_empty() => Ok(()),
					_ => Err("at least one staker is required".to_string()),
				})],
			vec![],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl ContractInterface for StaticRegistry {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(StaticRegistrySchema)
	}

	async fn initiate(&self, id: &str, _size: u64) -> Result<Staker, ContractError> {
		Ok(self.pick(id).clone())
	}
}

/// Creates a static registry from configuration.
///
/// Configuration parameters:
/// - `stakers`: array of `{ id, url }` tables
pub fn create_contract(config: &toml::Value) -> Result<Box<dyn ContractInterface>, ContractError> {
	StaticRegistrySchema
		.validate(config)
		.map_err(|e| ContractError::Config(e.to_string()))?;

	let stakers = config
		.get("stakers")
		.and_then(|v| v.as_array())
		.map(|entries| {
			entries
				.iter()
				.filter_map(|entry| {
					Some(Staker {
						id: entry.get("id")?.as_str()?.to_string(),
						url: entry.get("url")?.as_str()?.to_string(),
					})
				})
				.collect::<Vec<_>>()
		})
		.unwrap_or_default();

	Ok(Box::new(StaticRegistry::new(stakers)?))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn stakers() -> Vec<Staker> {
		(0..3)
			.map(|i| Staker {
				id: format!("bundler-{}", i),
				url: format!("bundler-{}.example", i),
			})
			.collect()
	}

	#[tokio::test]
	async fn test_selection_is_stable() {
		let registry = StaticRegistry::new(stakers()).unwrap();
		let first = registry.initiate("item", 10).await.unwrap();
		let second = registry.initiate("item", 99).await.unwrap();
		assert_eq!(first, second);
	}

	#[tokio::test]
	async fn test_selection_spreads() {
		let registry = StaticRegistry::new(stakers()).unwrap();
		let mut seen = std::collections::HashSet::new();
		for i in 0..64 {
			seen.insert(registry.initiate(&format!("item-{}", i), 1).await.unwrap().id);
		}
		assert_eq!(seen.len(), 3);
	}

	#[test]
	fn test_factory() {
		let config: toml::Value = toml::from_str(
			"[[stakers]]\nid = \"bundler\"\nurl = \"https://bundler.example\"",
		)
		.unwrap();
		assert!(create_contract(&config).is_ok());

		let empty: toml::Value = toml::from_str("stakers = []").unwrap();
		assert!(matches!(create_contract(&empty), Err(ContractError::Config(_))));
	}
}
