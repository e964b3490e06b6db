// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Where the provisioner set comes from, and the platform release stamped on
//! runtimes that do not request a version.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ConfigError;

/// Provisioner configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct ProvisionersConfig {
	/// File holding the JSON provisioner set.
	pub set_path: Option<PathBuf>,
	/// Inline JSON provisioner set.
	pub set_json: Option<String>,
	pub platform_version: String,
}

impl Default for ProvisionersConfig {
	fn default() -> Self {
		Self {
			set_path: None,
			set_json: None,
			platform_version: env!("CARGO_PKG_VERSION").to_string(),
		}
	}
}

impl ProvisionersConfig {
	/// Read the raw provisioner set document.
	///
	/// An unconfigured set yields `{}`.
	pub fn read_set(&self) -> Result<String, ConfigError> {
		if let Some(json) = &self.set_json {
			return Ok(json.clone());
		}
		match &self.set_path {
			Some(path) => std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
				path: path.clone(),
				source: e,
			}),
			None => Ok("{}".to_string()),
		}
	}
}

/// Provisioner configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvisionersConfigLayer {
	#[serde(default)]
	pub set_path: Option<PathBuf>,
	#[serde(default)]
	pub set_json: Option<String>,
	#[serde(default)]
	pub platform_version: Option<String>,
}

impl ProvisionersConfigLayer {
	pub fn merge(&mut self, other: ProvisionersConfigLayer) {
		if other.set_path.is_some() {
			self.set_path = other.set_path;
		}
		if other.set_json.is_some() {
			self.set_json = other.set_json;
		}
		if other.platform_version.is_some() {
			self.platform_version = other.platform_version;
		}
	}

	pub fn finalize(self) -> Result<ProvisionersConfig, ConfigError> {
		if let (Some(path), Some(_)) = (&self.set_path, &self.set_json) {
			return Err(ConfigError::ConflictingSetSources { path: path.clone() });
		}

		let defaults = ProvisionersConfig::default();
		let platform_version = match self.platform_version {
			Some(v) if v.trim().is_empty() => {
				return Err(ConfigError::Empty {
					key: "provisioners.platform_version",
				})
			}
			Some(v) => v,
			None => defaults.platform_version,
		};

		Ok(ProvisionersConfig {
			set_path: self.set_path,
			set_json: self.set_json,
			platform_version,
		})
	}
}
