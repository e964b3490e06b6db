// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;

use crate::error::K8sError;
use crate::types::{Deployment, ManifestObject, ObjectKind, PersistentVolumeClaim};

/// Trait for the cluster operations runtime provisioning needs.
///
/// This abstraction allows tests to run against an in-memory cluster while
/// production code talks to the API server through kube.
#[async_trait]
pub trait ClusterClient: Send + Sync {
	/// Create or update an object with server-side apply, forcing ownership of
	/// conflicting fields for `field_manager`.
	async fn apply(
		&self,
		namespace: &str,
		object: &ManifestObject,
		field_manager: &str,
	) -> Result<(), K8sError>;

	/// Delete an object with foreground cascading propagation.
	///
	/// Returns [`K8sError::NotFound`] when the object does not exist.
	async fn delete(&self, namespace: &str, kind: ObjectKind, name: &str) -> Result<(), K8sError>;

	/// Get a Deployment by name. Returns [`K8sError::NotFound`] when absent.
	async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, K8sError>;

	/// Get a PersistentVolumeClaim by name. Returns [`K8sError::NotFound`] when absent.
	async fn get_pvc(&self, namespace: &str, name: &str)
		-> Result<PersistentVolumeClaim, K8sError>;
}
