// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for the Strata provisioning host.
//!
//! Sources, lowest to highest precedence:
//! 1. Built-in defaults
//! 2. TOML file (`/etc/strata/provisioner.toml`, or an explicit path)
//! 3. Environment variables (`STRATA_<SECTION>_<FIELD>`)

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{
	ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource, SYSTEM_CONFIG_PATH,
};

use std::path::PathBuf;

use tracing::{debug, info};

/// Fully resolved configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub logging: LoggingConfig,
	pub database: DatabaseConfig,
	pub provisioners: ProvisionersConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// `config_path` replaces the system TOML file and must exist.
pub fn load_config(config_path: Option<PathBuf>) -> Result<ServerConfig, ConfigError> {
	let toml = match config_path {
		Some(path) => TomlSource::new(path),
		None => TomlSource::system(),
	};

	load_from_sources(vec![
		Box::new(EnvSource),
		Box::new(DefaultsSource),
		Box::new(toml),
	])
}

/// Merge `sources` in precedence order and resolve the result.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let logging = layer.logging.unwrap_or_default().finalize();
	let database = layer.database.unwrap_or_default().finalize()?;
	let provisioners = layer.provisioners.unwrap_or_default().finalize()?;

	info!(
		log_level = %logging.level,
		database = %database.url,
		platform_version = %provisioners.platform_version,
		set_path = ?provisioners.set_path,
		inline_set = provisioners.set_json.is_some(),
		"provisioner configuration loaded"
	);

	Ok(ServerConfig {
		logging,
		database,
		provisioners,
	})
}
