// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory cluster for exercising provisioners without an API server.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::client::ClusterClient;
use crate::error::K8sError;
use crate::types::{
	Deployment, DeploymentStatus, ManifestObject, ObjectKind, PersistentVolumeClaim,
};

/// A call made against the in-memory cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterOp {
	Apply { kind: ObjectKind, name: String },
	Delete { kind: ObjectKind, name: String },
	Get { kind: ObjectKind, name: String },
}

impl ClusterOp {
	pub fn is_write(&self) -> bool {
		!matches!(self, ClusterOp::Get { .. })
	}
}

type ObjectKey = (String, ObjectKind, String);

#[derive(Default)]
struct State {
	objects: BTreeMap<ObjectKey, ManifestObject>,
	ops: Vec<ClusterOp>,
	apply_failures: HashMap<ObjectKind, String>,
	delete_failures: HashMap<ObjectKind, String>,
}

/// Cluster double that records every call.
///
/// Apply replaces the stored object but keeps its status. Deployments get
/// `metadata.generation` starting at 1, bumped only when the spec changes.
#[derive(Default)]
pub struct InMemoryClusterClient {
	state: Mutex<State>,
}

impl InMemoryClusterClient {
	pub fn new() -> Self {
		Self::default()
	}

	fn lock(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	/// Store an object without recording an operation.
	pub fn insert(&self, namespace: &str, object: ManifestObject) {
		let key = (namespace.to_string(), object.kind(), object.name().to_string());
		self.lock().objects.insert(key, object);
	}

	pub fn object(&self, namespace: &str, kind: ObjectKind, name: &str) -> Option<ManifestObject> {
		self
			.lock()
			.objects
			.get(&(namespace.to_string(), kind, name.to_string()))
			.cloned()
	}

	pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
		match self.object(namespace, ObjectKind::Deployment, name)? {
			ManifestObject::Deployment(d) => Some(d),
			_ => None,
		}
	}

	pub fn pvc(&self, namespace: &str, name: &str) -> Option<PersistentVolumeClaim> {
		match self.object(namespace, ObjectKind::PersistentVolumeClaim, name)? {
			ManifestObject::PersistentVolumeClaim(p) => Some(p),
			_ => None,
		}
	}

	pub fn object_count(&self) -> usize {
		self.lock().objects.len()
	}

	/// Every call made so far, in order.
	pub fn ops(&self) -> Vec<ClusterOp> {
		self.lock().ops.clone()
	}

	/// Applies and deletes made so far, in order.
	pub fn writes(&self) -> Vec<ClusterOp> {
		self.lock().ops.iter().filter(|op| op.is_write()).cloned().collect()
	}

	pub fn clear_ops(&self) {
		self.lock().ops.clear();
	}

	/// Report a rollout status observed at the Deployment's current generation.
	pub fn set_deployment_status(&self, namespace: &str, name: &str, replicas: i32, available: i32) {
		let mut state = self.lock();
		let key = (namespace.to_string(), ObjectKind::Deployment, name.to_string());
		if let Some(ManifestObject::Deployment(d)) = state.objects.get_mut(&key) {
			d.status = Some(DeploymentStatus {
				replicas: Some(replicas),
				available_replicas: Some(available),
				observed_generation: d.metadata.generation,
				..Default::default()
			});
		}
	}

	/// Mark every desired replica of the Deployment available.
	pub fn mark_deployment_ready(&self, namespace: &str, name: &str) {
		let replicas = self
			.deployment(namespace, name)
			.and_then(|d| d.spec.and_then(|s| s.replicas))
			.unwrap_or(1);
		self.set_deployment_status(namespace, name, replicas, replicas);
	}

	/// Fail every apply of `kind` with `message` until cleared.
	pub fn fail_apply(&self, kind: ObjectKind, message: &str) {
		self.lock().apply_failures.insert(kind, message.to_string());
	}

	/// Fail every delete of `kind` with `message` until cleared.
	pub fn fail_delete(&self, kind: ObjectKind, message: &str) {
		self.lock().delete_failures.insert(kind, message.to_string());
	}

	pub fn clear_failures(&self) {
		let mut state = self.lock();
		state.apply_failures.clear();
		state.delete_failures.clear();
	}
}

fn carry_over(existing: &ManifestObject, incoming: &mut ManifestObject) {
	match (existing, incoming) {
		(ManifestObject::Deployment(old), ManifestObject::Deployment(new)) => {
			let generation = old.metadata.generation.unwrap_or(1);
			new.metadata.generation = Some(if old.spec == new.spec {
				generation
			} else {
				generation + 1
			});
			new.status = old.status.clone();
		}
		(ManifestObject::PersistentVolumeClaim(old), ManifestObject::PersistentVolumeClaim(new)) => {
			new.status = old.status.clone();
		}
		(ManifestObject::Service(old), ManifestObject::Service(new)) => {
			new.status = old.status.clone();
		}
		(ManifestObject::Ingress(old), ManifestObject::Ingress(new)) => {
			new.status = old.status.clone();
		}
		_ => {}
	}
}

#[async_trait]
impl ClusterClient for InMemoryClusterClient {
	async fn apply(
		&self,
		namespace: &str,
		object: &ManifestObject,
		_field_manager: &str,
	) -> Result<(), K8sError> {
		let mut state = self.lock();
		let kind = object.kind();
		let name = object.name().to_string();
		state.ops.push(ClusterOp::Apply {
			kind,
			name: name.clone(),
		});

		if let Some(message) = state.apply_failures.get(&kind) {
			return Err(K8sError::ApiError {
				message: message.clone(),
			});
		}

		let key = (namespace.to_string(), kind, name);
		let mut incoming = object.clone();
		match state.objects.get(&key) {
			Some(existing) => carry_over(existing, &mut incoming),
			None => {
				if let ManifestObject::Deployment(d) = &mut incoming {
					d.metadata.generation = Some(1);
				}
			}
		}
		state.objects.insert(key, incoming);
		Ok(())
	}

	async fn delete(&self, namespace: &str, kind: ObjectKind, name: &str) -> Result<(), K8sError> {
		let mut state = self.lock();
		state.ops.push(ClusterOp::Delete {
			kind,
			name: name.to_string(),
		});

		if let Some(message) = state.delete_failures.get(&kind) {
			return Err(K8sError::ApiError {
				message: message.clone(),
			});
		}

		match state
			.objects
			.remove(&(namespace.to_string(), kind, name.to_string()))
		{
			Some(_) => Ok(()),
			None => Err(K8sError::NotFound {
				kind: kind.to_string(),
				name: name.to_string(),
			}),
		}
	}

	async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, K8sError> {
		self.lock().ops.push(ClusterOp::Get {
			kind: ObjectKind::Deployment,
			name: name.to_string(),
		});
		self.deployment(namespace, name).ok_or_else(|| K8sError::NotFound {
			kind: ObjectKind::Deployment.to_string(),
			name: name.to_string(),
		})
	}

	async fn get_pvc(
		&self,
		namespace: &str,
		name: &str,
	) -> Result<PersistentVolumeClaim, K8sError> {
		self.lock().ops.push(ClusterOp::Get {
			kind: ObjectKind::PersistentVolumeClaim,
			name: name.to_string(),
		});
		self.pvc(namespace, name).ok_or_else(|| K8sError::NotFound {
			kind: ObjectKind::PersistentVolumeClaim.to_string(),
			name: name.to_string(),
		})
	}
}
