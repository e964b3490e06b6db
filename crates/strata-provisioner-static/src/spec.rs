// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};
use strata_provisioner_core::{ProvisionerError, Result};

/// One host's fixed slot pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRuntimeSpec {
	pub host: String,
	pub slots: u32,
	#[serde(default)]
	pub audience_url: String,
}

/// Configuration of the static provisioner: the hosts it may place runtimes on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticSpec {
	#[serde(default)]
	pub runtimes: Vec<StaticRuntimeSpec>,
}

impl StaticSpec {
	pub fn from_value(value: serde_json::Value) -> Result<Self> {
		let spec: StaticSpec =
			serde_json::from_value(value).map_err(|e| ProvisionerError::InvalidSpec {
				message: format!("failed to parse static provisioner spec: {e}"),
			})?;

		if let Some(idx) = spec.runtimes.iter().position(|rt| rt.host.is_empty()) {
			return Err(ProvisionerError::InvalidSpec {
				message: format!("runtimes[{idx}].host is empty"),
			});
		}

		Ok(spec)
	}
}
