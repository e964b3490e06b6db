// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Location of the capacity store backing static provisioners.
//!
//! The store is SQLite. Any other scheme fails at load time instead of when
//! the pool is first opened.

use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_URL: &str = "sqlite:./strata.db";
const SQLITE_SCHEME: &str = "sqlite:";

/// Capacity store configuration (runtime, fully resolved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
	pub url: String,
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self {
			url: DEFAULT_URL.to_string(),
		}
	}
}

impl DatabaseConfig {
	/// Whether allocations are lost when the process exits.
	pub fn is_in_memory(&self) -> bool {
		let target = self.url.strip_prefix(SQLITE_SCHEME).unwrap_or(&self.url);
		target.starts_with(":memory:") || target.contains("mode=memory")
	}
}

/// Capacity store configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfigLayer {
	#[serde(default)]
	pub url: Option<String>,
}

impl DatabaseConfigLayer {
	pub fn merge(&mut self, other: DatabaseConfigLayer) {
		if other.url.is_some() {
			self.url = other.url;
		}
	}

	pub fn finalize(self) -> Result<DatabaseConfig, ConfigError> {
		let Some(url) = self.url else {
			return Ok(DatabaseConfig::default());
		};
		let url = url.trim();
		if url.is_empty() {
			return Err(ConfigError::Empty { key: "database.url" });
		}
		if !url.starts_with(SQLITE_SCHEME) {
			return Err(ConfigError::UnsupportedDatabase {
				url: url.to_string(),
			});
		}
		Ok(DatabaseConfig {
			url: url.to_string(),
		})
	}
}
