// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Provisioned resource model.
//!
//! A [`Resource`] is owned and persisted by the caller. Provisioners produce
//! and refresh it but never store it. The private [`ResourceState`] and the
//! consumer-facing [`ResourceConfig`] are tagged unions so that a provisioner
//! can only ever decode the shape it wrote itself; raw JSON is accepted only at
//! the storage boundary through [`Resource::from_raw`].

use serde::{Deserialize, Serialize};

use crate::error::{ProvisionerError, Result};

/// The kind of resource a provisioner manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
	/// An analytical runtime instance.
	Runtime,
}

impl ResourceType {
	pub fn as_str(&self) -> &'static str {
		match self {
			ResourceType::Runtime => "runtime",
		}
	}
}

impl std::fmt::Display for ResourceType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for ResourceType {
	type Err = ProvisionerError;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"runtime" => Ok(ResourceType::Runtime),
			other => Err(ProvisionerError::InvalidArgs {
				message: format!("unknown resource type {other:?}"),
			}),
		}
	}
}

/// State persisted by the Kubernetes provisioner for a runtime.
///
/// Only used to detect drift on reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeState {
	pub slots: u32,
	pub version: String,
}

/// Provisioner-private state, one variant per provisioner kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provisioner", rename_all = "snake_case")]
pub enum ResourceState {
	/// The provisioner keeps no state (e.g. static placement).
	#[default]
	None,
	Kubernetes(RuntimeState),
}

/// Connection and sizing details handed to consumers of a runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
	pub host: String,
	pub audience: String,
	pub cpu: u32,
	pub memory_gb: u32,
	pub storage_bytes: u64,
}

/// Consumer-facing configuration, one variant per resource shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceConfig {
	#[default]
	None,
	Runtime(RuntimeConfig),
}

/// A resource created by a provisioner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
	/// Caller-assigned identifier, stable for the resource's lifetime.
	pub id: String,
	#[serde(rename = "type")]
	pub resource_type: ResourceType,
	#[serde(default)]
	pub state: ResourceState,
	#[serde(default)]
	pub config: ResourceConfig,
}

impl Resource {
	/// A not-yet-provisioned resource.
	pub fn new(id: impl Into<String>, resource_type: ResourceType) -> Self {
		Self {
			id: id.into(),
			resource_type,
			state: ResourceState::None,
			config: ResourceConfig::None,
		}
	}

	/// Rebuild a resource from the raw JSON columns the caller persisted.
	///
	/// `null` and `{}` decode to the empty variants.
	pub fn from_raw(
		id: impl Into<String>,
		resource_type: ResourceType,
		state: serde_json::Value,
		config: serde_json::Value,
	) -> Result<Self> {
		let id = id.into();
		let state = decode_tagged(state).map_err(|e| ProvisionerError::InvalidState {
			resource_id: id.clone(),
			message: format!("failed to parse state: {e}"),
		})?;
		let config = decode_tagged(config).map_err(|e| ProvisionerError::InvalidState {
			resource_id: id.clone(),
			message: format!("failed to parse config: {e}"),
		})?;
		Ok(Self {
			id,
			resource_type,
			state,
			config,
		})
	}

	/// Raw JSON form of the state, for persistence.
	pub fn state_json(&self) -> serde_json::Value {
		serde_json::to_value(&self.state).unwrap_or(serde_json::Value::Null)
	}

	/// Raw JSON form of the config, for persistence.
	pub fn config_json(&self) -> serde_json::Value {
		serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null)
	}

	/// The runtime config, if this resource has been provisioned as a runtime.
	pub fn runtime_config(&self) -> Option<&RuntimeConfig> {
		match &self.config {
			ResourceConfig::Runtime(cfg) => Some(cfg),
			ResourceConfig::None => None,
		}
	}
}

fn decode_tagged<T>(value: serde_json::Value) -> std::result::Result<T, serde_json::Error>
where
	T: Default + serde::de::DeserializeOwned,
{
	match &value {
		serde_json::Value::Null => Ok(T::default()),
		serde_json::Value::Object(map) if map.is_empty() => Ok(T::default()),
		_ => serde_json::from_value(value),
	}
}
