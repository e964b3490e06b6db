// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The provisioner trait shared by every backend.

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{ProvisionerError, Result};
use crate::options::ResourceOptions;
use crate::resource::{Resource, ResourceType};

/// Built-in provisioner kinds, as named by the `type` field of a provisioner set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionerKind {
	/// Bin-packs runtimes onto a fixed list of hosts.
	Static,
	/// Deploys runtimes onto a Kubernetes cluster.
	Kubernetes,
}

impl ProvisionerKind {
	pub const ALL: [ProvisionerKind; 2] = [ProvisionerKind::Static, ProvisionerKind::Kubernetes];

	pub fn as_str(&self) -> &'static str {
		match self {
			ProvisionerKind::Static => "static",
			ProvisionerKind::Kubernetes => "kubernetes",
		}
	}
}

impl std::fmt::Display for ProvisionerKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for ProvisionerKind {
	type Err = ProvisionerError;

	fn from_str(s: &str) -> Result<Self> {
		ProvisionerKind::ALL
			.into_iter()
			.find(|k| k.as_str() == s)
			.ok_or_else(|| ProvisionerError::UnsupportedProvisionerType {
				name: s.to_string(),
			})
	}
}

/// Lifecycle operations for a provisioned resource.
///
/// Every call runs on the caller's task. The token stands in for the caller's
/// request context: cancelling it aborts in-flight infrastructure calls and
/// readiness waits with [`ProvisionerError::Cancelled`].
#[async_trait]
pub trait Provisioner: Send + Sync {
	fn kind(&self) -> ProvisionerKind;

	fn supports(&self, resource_type: ResourceType) -> bool;

	/// Create or converge the resource. Safe to call repeatedly.
	async fn provision(
		&self,
		cancel: &CancellationToken,
		resource: &Resource,
		opts: &ResourceOptions,
	) -> Result<Resource>;

	/// Tear the resource down. Safe to call repeatedly.
	async fn deprovision(&self, cancel: &CancellationToken, resource: &Resource) -> Result<()>;

	/// Wait until a freshly provisioned resource is serving.
	async fn await_ready(&self, cancel: &CancellationToken, resource: &Resource) -> Result<()>;

	/// Apply new args to an existing resource.
	async fn update(
		&self,
		cancel: &CancellationToken,
		resource: &Resource,
		opts: &ResourceOptions,
	) -> Result<Resource>;

	/// Fleet-level health check. Advisory: problems are logged.
	async fn check(&self, cancel: &CancellationToken) -> Result<()>;

	/// Reconcile a resource against the current desired state.
	///
	/// Returns the resource unchanged when nothing drifted.
	async fn check_resource(
		&self,
		cancel: &CancellationToken,
		resource: &Resource,
		opts: &ResourceOptions,
	) -> Result<Resource>;
}

/// Run `fut` unless `cancel` fires first.
pub async fn run_cancellable<F, T>(cancel: &CancellationToken, fut: F) -> Result<T>
where
	F: Future<Output = Result<T>>,
{
	tokio::select! {
		biased;
		_ = cancel.cancelled() => Err(ProvisionerError::Cancelled),
		res = fut => res,
	}
}

/// Fail with [`ProvisionerError::UnsupportedResourceType`] unless `provisioner` supports the type.
pub fn ensure_supported(provisioner: &dyn Provisioner, resource: &Resource) -> Result<()> {
	if provisioner.supports(resource.resource_type) {
		Ok(())
	} else {
		Err(ProvisionerError::UnsupportedResourceType {
			resource_type: resource.resource_type,
		})
	}
}
