// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{DatabaseConfigLayer, LoggingConfigLayer, ProvisionersConfigLayer};

pub const SYSTEM_CONFIG_PATH: &str = "/etc/strata/provisioner.toml";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
///
/// A missing system file is skipped; a missing explicit file is an error.
pub struct TomlSource {
	path: PathBuf,
	required: bool,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			required: true,
		}
	}

	pub fn system() -> Self {
		Self {
			path: PathBuf::from(SYSTEM_CONFIG_PATH),
			required: false,
		}
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.required && !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::Read {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::Toml {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: STRATA_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		load_from(|name| std::env::var(name).ok())
	}
}

fn load_from<F>(lookup: F) -> Result<ServerConfigLayer, ConfigError>
where
	F: Fn(&str) -> Option<String>,
{
	let var = |name: &str| lookup(name).filter(|s| !s.is_empty());

	Ok(ServerConfigLayer {
		logging: Some(LoggingConfigLayer {
			level: var("STRATA_LOGGING_LEVEL"),
		}),
		database: Some(DatabaseConfigLayer {
			url: var("STRATA_DATABASE_URL"),
		}),
		provisioners: Some(ProvisionersConfigLayer {
			set_path: var("STRATA_PROVISIONERS_SET_PATH").map(PathBuf::from),
			set_json: var("STRATA_PROVISIONERS_SET_JSON"),
			platform_version: var("STRATA_PROVISIONERS_PLATFORM_VERSION"),
		}),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use std::io::Write;

	fn env_layer(vars: &[(&str, &str)]) -> ServerConfigLayer {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		load_from(|name| vars.get(name).cloned()).unwrap()
	}

	#[test]
	fn test_precedence_ordering() {
		assert!(Precedence::Environment > Precedence::ConfigFile);
		assert!(Precedence::ConfigFile > Precedence::Defaults);
	}

	#[test]
	fn test_defaults_source_returns_empty_layer() {
		let layer = DefaultsSource.load().unwrap();
		assert!(layer.logging.is_none());
		assert!(layer.database.is_none());
	}

	#[test]
	fn test_missing_system_file_is_skipped() {
		let source = TomlSource {
			path: PathBuf::from("/nonexistent/provisioner.toml"),
			required: false,
		};
		assert!(source.load().unwrap().provisioners.is_none());
	}

	#[test]
	fn test_missing_explicit_file_is_an_error() {
		let source = TomlSource::new("/nonexistent/provisioner.toml");
		assert!(matches!(
			source.load(),
			Err(ConfigError::Read { .. })
		));
	}

	#[test]
	fn test_toml_source_parses_sections() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
[logging]
level = "debug"

[provisioners]
set_path = "/etc/strata/provisioners.json"
platform_version = "2025.3.1"
"#
		)
		.unwrap();

		let layer = TomlSource::new(file.path()).load().unwrap();
		assert_eq!(layer.logging.unwrap().level.as_deref(), Some("debug"));
		let provisioners = layer.provisioners.unwrap();
		assert_eq!(provisioners.platform_version.as_deref(), Some("2025.3.1"));
		assert!(layer.database.is_none());
	}

	#[test]
	fn test_malformed_toml_reports_path() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "[logging\nlevel = ").unwrap();

		match TomlSource::new(file.path()).load() {
			Err(ConfigError::Toml { path, .. }) => assert_eq!(path, file.path()),
			other => panic!("expected Toml, got {other:?}"),
		}
	}

	#[test]
	fn test_env_vars_map_to_sections() {
		let layer = env_layer(&[
			("STRATA_DATABASE_URL", "sqlite::memory:"),
			("STRATA_PROVISIONERS_SET_JSON", "[]"),
			("STRATA_LOGGING_LEVEL", ""),
		]);

		assert_eq!(
			layer.database.unwrap().url.as_deref(),
			Some("sqlite::memory:")
		);
		assert_eq!(layer.provisioners.unwrap().set_json.as_deref(), Some("[]"));
		assert!(layer.logging.unwrap().level.is_none());
	}
}
