// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request envelope passed to every provisioning call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ProvisionerError, Result};

/// Annotation carrying the tenant's billing plan.
pub const BILLING_PLAN_ANNOTATION: &str = "billing_plan";

/// Options for provisioning or reconciling a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceOptions {
	/// Raw args, decoded by each provisioner into its typed args.
	#[serde(default)]
	pub args: serde_json::Value,
	/// Caller annotations (org/project identity, billing plan, ...).
	#[serde(default)]
	pub annotations: BTreeMap<String, String>,
	/// The platform's current release, used when no explicit version is requested.
	#[serde(default)]
	pub platform_version: String,
}

impl ResourceOptions {
	/// Decode `args` as runtime args.
	pub fn runtime_args(&self) -> Result<RuntimeArgs> {
		RuntimeArgs::from_value(&self.args)
	}

	/// The annotation value for `key`, or the empty string.
	pub fn annotation(&self, key: &str) -> &str {
		self.annotations.get(key).map(String::as_str).unwrap_or("")
	}
}

/// Typed args for a runtime resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeArgs {
	#[serde(default)]
	pub slots: u32,
	#[serde(default)]
	pub version: String,
	#[serde(default)]
	pub environment: String,
}

impl RuntimeArgs {
	pub fn from_value(value: &serde_json::Value) -> Result<Self> {
		let args: RuntimeArgs = if value.is_null() {
			RuntimeArgs::default()
		} else {
			serde_json::from_value(value.clone()).map_err(|e| ProvisionerError::InvalidArgs {
				message: format!("failed to parse runtime args: {e}"),
			})?
		};

		if args.slots == 0 {
			return Err(ProvisionerError::InvalidArgs {
				message: "slots must be at least 1".to_string(),
			});
		}

		Ok(args)
	}
}
