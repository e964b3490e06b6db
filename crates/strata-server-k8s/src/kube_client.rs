// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::{
	api::{Api, DeleteParams, Patch, PatchParams},
	config::{KubeConfigOptions, Kubeconfig},
	Client, Config,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument};

use crate::client::ClusterClient;
use crate::error::K8sError;
use crate::types::{
	Deployment, Ingress, ManifestObject, ObjectKind, PersistentVolumeClaim, Service,
};

/// Production cluster client implementation using the kube crate.
pub struct KubeClient {
	client: Client,
}

impl KubeClient {
	/// Connect using the kubeconfig at `path`, or the in-cluster service
	/// account when no path is given.
	pub async fn from_kubeconfig(path: Option<&Path>) -> Result<Self, K8sError> {
		let config = match path {
			Some(path) => {
				let kubeconfig = Kubeconfig::read_from(path).map_err(|e| K8sError::Config {
					message: format!("failed to read kubeconfig {}: {e}", path.display()),
				})?;
				Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
					.await
					.map_err(|e| K8sError::Config {
						message: format!("failed to load kubeconfig {}: {e}", path.display()),
					})?
			}
			None => Config::incluster().map_err(|e| K8sError::Config {
				message: format!("failed to load in-cluster config: {e}"),
			})?,
		};

		let client = Client::try_from(config)?;
		debug!(kubeconfig = ?path, "K8s client initialized");
		Ok(Self { client })
	}

	async fn apply_typed<K>(
		&self,
		namespace: &str,
		name: &str,
		object: &K,
		field_manager: &str,
	) -> Result<(), K8sError>
	where
		K: kube::Resource<Scope = NamespaceResourceScope>
			+ Clone
			+ DeserializeOwned
			+ Serialize
			+ Debug,
		<K as kube::Resource>::DynamicType: Default,
	{
		let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
		let params = PatchParams::apply(field_manager).force();
		api.patch(name, &params, &Patch::Apply(object)).await?;
		Ok(())
	}

	async fn delete_typed<K>(&self, namespace: &str, kind: ObjectKind, name: &str) -> Result<(), K8sError>
	where
		K: kube::Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
		<K as kube::Resource>::DynamicType: Default,
	{
		let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
		match api.delete(name, &DeleteParams::foreground()).await {
			Ok(_) => Ok(()),
			Err(kube::Error::Api(err)) if err.code == 404 => Err(K8sError::NotFound {
				kind: kind.to_string(),
				name: name.into(),
			}),
			Err(e) => Err(e.into()),
		}
	}

	async fn get_typed<K>(&self, namespace: &str, kind: ObjectKind, name: &str) -> Result<K, K8sError>
	where
		K: kube::Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
		<K as kube::Resource>::DynamicType: Default,
	{
		let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
		match api.get(name).await {
			Ok(obj) => Ok(obj),
			Err(kube::Error::Api(err)) if err.code == 404 => Err(K8sError::NotFound {
				kind: kind.to_string(),
				name: name.into(),
			}),
			Err(e) => Err(e.into()),
		}
	}
}

#[async_trait]
impl ClusterClient for KubeClient {
	#[instrument(skip(self, object), fields(kind = %object.kind(), name = %object.name()))]
	async fn apply(
		&self,
		namespace: &str,
		object: &ManifestObject,
		field_manager: &str,
	) -> Result<(), K8sError> {
		let name = object.name();
		if name.is_empty() {
			return Err(K8sError::Serialization {
				kind: object.kind().to_string(),
				name: String::new(),
				message: "metadata.name is required".into(),
			});
		}

		match object {
			ManifestObject::PersistentVolumeClaim(o) => {
				self.apply_typed(namespace, name, o, field_manager).await
			}
			ManifestObject::Deployment(o) => self.apply_typed(namespace, name, o, field_manager).await,
			ManifestObject::Service(o) => self.apply_typed(namespace, name, o, field_manager).await,
			ManifestObject::Ingress(o) => self.apply_typed(namespace, name, o, field_manager).await,
		}
	}

	#[instrument(skip(self))]
	async fn delete(&self, namespace: &str, kind: ObjectKind, name: &str) -> Result<(), K8sError> {
		match kind {
			ObjectKind::PersistentVolumeClaim => {
				self
					.delete_typed::<PersistentVolumeClaim>(namespace, kind, name)
					.await
			}
			ObjectKind::Deployment => self.delete_typed::<Deployment>(namespace, kind, name).await,
			ObjectKind::Service => self.delete_typed::<Service>(namespace, kind, name).await,
			ObjectKind::Ingress => self.delete_typed::<Ingress>(namespace, kind, name).await,
		}
	}

	async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, K8sError> {
		self.get_typed(namespace, ObjectKind::Deployment, name).await
	}

	async fn get_pvc(
		&self,
		namespace: &str,
		name: &str,
	) -> Result<PersistentVolumeClaim, K8sError> {
		self
			.get_typed(namespace, ObjectKind::PersistentVolumeClaim, name)
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[tokio::test]
	async fn missing_kubeconfig_is_a_config_error() {
		let err = KubeClient::from_kubeconfig(Some(Path::new("/nonexistent/strata/kubeconfig")))
			.await
			.err()
			.unwrap();
		assert!(matches!(err, K8sError::Config { .. }));
	}

	#[tokio::test]
	async fn malformed_kubeconfig_is_a_config_error() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(b"clusters: [not, a, map").unwrap();

		let err = KubeClient::from_kubeconfig(Some(file.path()))
			.await
			.err()
			.unwrap();
		assert!(matches!(err, K8sError::Config { .. }));
	}
}
