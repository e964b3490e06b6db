// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStatus};
pub use k8s_openapi::api::core::v1::{
	PersistentVolumeClaim, PersistentVolumeClaimSpec, Service, VolumeResourceRequirements,
};
pub use k8s_openapi::api::networking::v1::Ingress;
pub use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// The object kinds a runtime deployment is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
	PersistentVolumeClaim,
	Deployment,
	Service,
	Ingress,
}

impl ObjectKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ObjectKind::PersistentVolumeClaim => "PersistentVolumeClaim",
			ObjectKind::Deployment => "Deployment",
			ObjectKind::Service => "Service",
			ObjectKind::Ingress => "Ingress",
		}
	}
}

impl std::fmt::Display for ObjectKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A typed, namespaced object submitted with server-side apply.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestObject {
	PersistentVolumeClaim(PersistentVolumeClaim),
	Deployment(Deployment),
	Service(Service),
	Ingress(Ingress),
}

impl ManifestObject {
	pub fn kind(&self) -> ObjectKind {
		match self {
			ManifestObject::PersistentVolumeClaim(_) => ObjectKind::PersistentVolumeClaim,
			ManifestObject::Deployment(_) => ObjectKind::Deployment,
			ManifestObject::Service(_) => ObjectKind::Service,
			ManifestObject::Ingress(_) => ObjectKind::Ingress,
		}
	}

	pub fn metadata(&self) -> &ObjectMeta {
		match self {
			ManifestObject::PersistentVolumeClaim(o) => &o.metadata,
			ManifestObject::Deployment(o) => &o.metadata,
			ManifestObject::Service(o) => &o.metadata,
			ManifestObject::Ingress(o) => &o.metadata,
		}
	}

	pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
		match self {
			ManifestObject::PersistentVolumeClaim(o) => &mut o.metadata,
			ManifestObject::Deployment(o) => &mut o.metadata,
			ManifestObject::Service(o) => &mut o.metadata,
			ManifestObject::Ingress(o) => &mut o.metadata,
		}
	}

	/// The object's name, or the empty string when the manifest omitted it.
	pub fn name(&self) -> &str {
		self.metadata().name.as_deref().unwrap_or("")
	}
}
