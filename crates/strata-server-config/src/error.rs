// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Why the provisioner host's configuration could not be assembled.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	/// A config file or provisioner set file could not be read.
	#[error("cannot read {path}: {source}")]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("malformed config file {path}: {source}")]
	Toml {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("{key} must not be empty")]
	Empty { key: &'static str },

	/// The capacity store only runs on SQLite.
	#[error("capacity store URL {url:?} is not a sqlite: URL")]
	UnsupportedDatabase { url: String },

	#[error("provisioner set given both as {path} and inline; pick one")]
	ConflictingSetSources { path: PathBuf },
}
