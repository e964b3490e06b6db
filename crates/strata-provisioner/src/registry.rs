// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Maps provisioner kinds to constructors and builds named provisioner sets.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde::Deserialize;
use strata_provisioner_core::{
	CapacityStore, Provisioner, ProvisionerError, ProvisionerKind, Result,
};
use strata_provisioner_kubernetes::KubernetesProvisioner;
use strata_provisioner_static::StaticProvisioner;
use tracing::{debug, info, instrument};

use crate::error::RegistryError;
use crate::set::ProvisionerSet;

pub type ConstructorFuture = BoxFuture<'static, Result<Arc<dyn Provisioner>>>;

/// Builds a provisioner from its raw spec and the shared capacity store.
pub type Constructor = fn(serde_json::Value, Arc<dyn CapacityStore>) -> ConstructorFuture;

/// One entry of a provisioner set descriptor.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionerSpec {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub spec: serde_json::Value,
}

#[derive(Default)]
pub struct Registry {
	constructors: BTreeMap<ProvisionerKind, Constructor>,
}

impl Registry {
	/// An empty registry. Most callers want [`Registry::builtin`].
	pub fn new() -> Self {
		Self::default()
	}

	/// Registry with every built-in kind.
	pub fn builtin() -> std::result::Result<Self, RegistryError> {
		let mut registry = Self::new();
		registry.register(ProvisionerKind::Static, new_static)?;
		registry.register(ProvisionerKind::Kubernetes, new_kubernetes)?;
		Ok(registry)
	}

	pub fn register(
		&mut self,
		kind: ProvisionerKind,
		constructor: Constructor,
	) -> std::result::Result<(), RegistryError> {
		if self.constructors.contains_key(&kind) {
			return Err(RegistryError::DuplicateRegistration { kind });
		}
		self.constructors.insert(kind, constructor);
		Ok(())
	}

	pub fn kinds(&self) -> impl Iterator<Item = ProvisionerKind> + '_ {
		self.constructors.keys().copied()
	}

	/// Build every provisioner named in `descriptor`.
	///
	/// The descriptor is a JSON object `{"<name>": {"type": ..., "spec": ...}}`.
	/// Any entry with an unknown type or an unparseable spec rejects the whole set.
	#[instrument(skip(self, descriptor, store))]
	pub async fn new_set(
		&self,
		descriptor: &str,
		store: Arc<dyn CapacityStore>,
	) -> std::result::Result<ProvisionerSet, RegistryError> {
		let entries: BTreeMap<String, ProvisionerSpec> = serde_json::from_str(descriptor)?;

		let mut provisioners = BTreeMap::new();
		for (name, entry) in entries {
			let provisioner = self
				.construct(&entry, Arc::clone(&store))
				.await
				.map_err(|source| RegistryError::Build {
					name: name.clone(),
					source,
				})?;
			debug!(name = %name, kind = %provisioner.kind(), "provisioner constructed");
			provisioners.insert(name, provisioner);
		}

		info!(count = provisioners.len(), "provisioner set built");
		Ok(ProvisionerSet::new(provisioners))
	}

	async fn construct(
		&self,
		entry: &ProvisionerSpec,
		store: Arc<dyn CapacityStore>,
	) -> Result<Arc<dyn Provisioner>> {
		let kind: ProvisionerKind = entry.kind.parse()?;
		let constructor = self.constructors.get(&kind).ok_or_else(|| {
			ProvisionerError::UnsupportedProvisionerType {
				name: entry.kind.clone(),
			}
		})?;
		constructor(entry.spec.clone(), store).await
	}
}

fn new_static(spec: serde_json::Value, store: Arc<dyn CapacityStore>) -> ConstructorFuture {
	async move {
		let provisioner = StaticProvisioner::from_spec_json(spec, store)?;
		Ok(Arc::new(provisioner) as Arc<dyn Provisioner>)
	}
	.boxed()
}

fn new_kubernetes(spec: serde_json::Value, _store: Arc<dyn CapacityStore>) -> ConstructorFuture {
	async move {
		let provisioner = KubernetesProvisioner::connect(spec).await?;
		Ok(Arc::new(provisioner) as Arc<dyn Provisioner>)
	}
	.boxed()
}

#[cfg(test)]
mod tests {
	use super::*;
	use strata_provisioner_core::InMemoryCapacityStore;

	fn store() -> Arc<dyn CapacityStore> {
		Arc::new(InMemoryCapacityStore::new())
	}

	#[test]
	fn builtin_registers_every_kind() {
		let registry = Registry::builtin().unwrap();
		let kinds: Vec<_> = registry.kinds().collect();
		assert_eq!(kinds, ProvisionerKind::ALL.to_vec());
	}

	#[test]
	fn duplicate_registration_is_rejected() {
		let mut registry = Registry::new();
		registry.register(ProvisionerKind::Static, new_static).unwrap();
		let err = registry
			.register(ProvisionerKind::Static, new_static)
			.unwrap_err();
		assert!(matches!(
			err,
			RegistryError::DuplicateRegistration {
				kind: ProvisionerKind::Static
			}
		));
	}

	#[tokio::test]
	async fn builds_named_static_provisioners() {
		let registry = Registry::builtin().unwrap();
		let descriptor = r#"{
			"eu": {"type": "static", "spec": {"runtimes": [{"host": "http://eu-1", "slots": 8}]}},
			"us": {"type": "static", "spec": {"runtimes": [{"host": "http://us-1", "slots": 4}]}}
		}"#;

		let set = registry.new_set(descriptor, store()).await.unwrap();
		assert_eq!(set.len(), 2);
		assert_eq!(set.names().collect::<Vec<_>>(), vec!["eu", "us"]);
		assert_eq!(set.get("eu").unwrap().kind(), ProvisionerKind::Static);
		assert!(set.get("ap").is_none());
	}

	#[tokio::test]
	async fn unknown_type_fails_the_whole_set() {
		let registry = Registry::builtin().unwrap();
		let descriptor = r#"{
			"ok": {"type": "static", "spec": {"runtimes": []}},
			"bad": {"type": "clickhouse-static", "spec": {}}
		}"#;

		match registry.new_set(descriptor, store()).await {
			Err(RegistryError::Build { name, source }) => {
				assert_eq!(name, "bad");
				assert!(matches!(
					source,
					ProvisionerError::UnsupportedProvisionerType { .. }
				));
			}
			Err(other) => panic!("expected Build error, got {other}"),
			Ok(_) => panic!("expected the set to be rejected"),
		}
	}

	#[tokio::test]
	async fn known_but_unregistered_kind_is_unsupported() {
		let mut registry = Registry::new();
		registry.register(ProvisionerKind::Static, new_static).unwrap();
		let descriptor = r#"{"k8s": {"type": "kubernetes", "spec": {}}}"#;

		let err = registry.new_set(descriptor, store()).await.err().unwrap();
		assert!(matches!(
			err,
			RegistryError::Build {
				source: ProvisionerError::UnsupportedProvisionerType { .. },
				..
			}
		));
	}

	#[tokio::test]
	async fn bad_spec_fails_the_whole_set() {
		let registry = Registry::builtin().unwrap();
		let descriptor = r#"{"eu": {"type": "static", "spec": {"runtimes": "nope"}}}"#;

		let err = registry.new_set(descriptor, store()).await.err().unwrap();
		assert!(matches!(
			err,
			RegistryError::Build {
				source: ProvisionerError::InvalidSpec { .. },
				..
			}
		));
	}

	#[tokio::test]
	async fn unreachable_cluster_fails_construction() {
		let registry = Registry::builtin().unwrap();
		let descriptor = r#"{"k8s": {"type": "kubernetes", "spec": {
			"host": "https://*.runtime.example.com",
			"image": "strata/runtime",
			"namespace": "runtimes",
			"kubeconfig_path": "/nonexistent/kubeconfig",
			"template_paths": {
				"http_ingress": "/nonexistent/http.yaml",
				"grpc_ingress": "/nonexistent/grpc.yaml",
				"service": "/nonexistent/service.yaml",
				"deployment": "/nonexistent/deployment.yaml",
				"pvc": "/nonexistent/pvc.yaml"
			}
		}}}"#;

		let err = registry.new_set(descriptor, store()).await.err().unwrap();
		assert!(matches!(
			err,
			RegistryError::Build {
				source: ProvisionerError::InvalidSpec { .. },
				..
			}
		));
	}

	#[tokio::test]
	async fn malformed_descriptor_is_rejected() {
		let registry = Registry::builtin().unwrap();
		let err = registry.new_set("[1, 2]", store()).await.err().unwrap();
		assert!(matches!(err, RegistryError::Descriptor(_)));
	}

	#[tokio::test]
	async fn empty_descriptor_builds_empty_set() {
		let registry = Registry::builtin().unwrap();
		let set = registry.new_set("{}", store()).await.unwrap();
		assert!(set.is_empty());
	}
}
