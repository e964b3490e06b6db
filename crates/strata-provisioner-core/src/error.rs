// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Provisioner error types.

use crate::resource::ResourceType;
use crate::store::StoreError;

/// Boxed error used to carry infrastructure client failures across crate seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for provisioner operations.
pub type Result<T> = std::result::Result<T, ProvisionerError>;

/// Errors that can occur during provisioning operations.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionerError {
	/// The provisioner cannot manage resources of this type.
	#[error("Unsupported resource type: {resource_type}")]
	UnsupportedResourceType { resource_type: ResourceType },

	/// A provisioner set references a type with no registered constructor.
	#[error("Unsupported provisioner type: {name}")]
	UnsupportedProvisionerType { name: String },

	/// The provisioner spec could not be parsed or is incomplete.
	#[error("Invalid provisioner spec: {message}")]
	InvalidSpec { message: String },

	/// A manifest template failed to load, render or decode.
	#[error("Template {template} failed: {message}")]
	Template { template: String, message: String },

	/// The caller supplied args that do not decode into the provisioner's args.
	#[error("Invalid resource args: {message}")]
	InvalidArgs { message: String },

	/// The resource's stored state does not belong to this provisioner.
	#[error("Invalid state for resource {resource_id}: {message}")]
	InvalidState {
		resource_id: String,
		message: String,
	},

	/// No host has enough headroom for the request.
	#[error("No runtime host has capacity for {slots} slots")]
	CapacityExhausted { slots: u32 },

	/// The capacity-accounting store failed.
	#[error(transparent)]
	Store(#[from] StoreError),

	/// A cluster API call failed.
	#[error("{operation} failed for resource {resource_id}: {source}")]
	Cluster {
		operation: String,
		resource_id: String,
		#[source]
		source: BoxError,
	},

	/// The resource did not become ready within the configured timeout.
	#[error("Resource {resource_id} not ready after {timeout_secs}s")]
	ReadinessTimeout {
		resource_id: String,
		timeout_secs: u64,
	},

	/// The resource became ready but never answered its health endpoint.
	#[error("Health probe of {url} failed: {message}")]
	HealthProbe { url: String, message: String },

	/// The caller cancelled the operation.
	#[error("Operation cancelled")]
	Cancelled,

	/// Several independent steps failed (e.g. during teardown).
	#[error("{}", join_messages(.0))]
	Multiple(Vec<ProvisionerError>),
}

impl ProvisionerError {
	/// Wrap a cluster client failure with the failing operation and resource.
	pub fn cluster(
		operation: impl Into<String>,
		resource_id: impl Into<String>,
		source: impl Into<BoxError>,
	) -> Self {
		ProvisionerError::Cluster {
			operation: operation.into(),
			resource_id: resource_id.into(),
			source: source.into(),
		}
	}

	/// True for conditions the caller may retry later without changing the request.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			ProvisionerError::CapacityExhausted { .. } | ProvisionerError::ReadinessTimeout { .. }
		)
	}

	/// Combine independent step errors. Returns `Ok(())` when there are none.
	pub fn combine(mut errors: Vec<ProvisionerError>) -> Result<()> {
		match errors.len() {
			0 => Ok(()),
			1 => Err(errors.remove(0)),
			_ => Err(ProvisionerError::Multiple(errors)),
		}
	}
}

fn join_messages(errors: &[ProvisionerError]) -> String {
	errors
		.iter()
		.map(|e| e.to_string())
		.collect::<Vec<_>>()
		.join("; ")
}
