// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strata_provisioner_core::{ProvisionerError, Result};

/// The five manifests that make up one runtime deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
	HttpIngress,
	GrpcIngress,
	Service,
	Deployment,
	Pvc,
}

impl TemplateKind {
	/// Every kind, in the order their sources are hashed into the template checksum.
	pub const ALL: [TemplateKind; 5] = [
		TemplateKind::HttpIngress,
		TemplateKind::GrpcIngress,
		TemplateKind::Service,
		TemplateKind::Deployment,
		TemplateKind::Pvc,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			TemplateKind::HttpIngress => "http_ingress",
			TemplateKind::GrpcIngress => "grpc_ingress",
			TemplateKind::Service => "service",
			TemplateKind::Deployment => "deployment",
			TemplateKind::Pvc => "pvc",
		}
	}
}

impl std::fmt::Display for TemplateKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatePaths {
	pub http_ingress: PathBuf,
	pub grpc_ingress: PathBuf,
	pub service: PathBuf,
	pub deployment: PathBuf,
	pub pvc: PathBuf,
}

impl TemplatePaths {
	pub fn path(&self, kind: TemplateKind) -> &Path {
		match kind {
			TemplateKind::HttpIngress => &self.http_ingress,
			TemplateKind::GrpcIngress => &self.grpc_ingress,
			TemplateKind::Service => &self.service,
			TemplateKind::Deployment => &self.deployment,
			TemplateKind::Pvc => &self.pvc,
		}
	}
}

/// Configuration of the Kubernetes provisioner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesSpec {
	/// Public URL of a runtime, with `*` standing in for its provision ID.
	pub host: String,
	pub image: String,
	pub namespace: String,
	#[serde(default)]
	pub timeout_seconds: u64,
	/// Empty means in-cluster configuration.
	#[serde(default)]
	pub kubeconfig_path: String,
	pub template_paths: TemplatePaths,
}

impl KubernetesSpec {
	pub fn from_value(value: serde_json::Value) -> Result<Self> {
		let spec: KubernetesSpec =
			serde_json::from_value(value).map_err(|e| ProvisionerError::InvalidSpec {
				message: format!("failed to parse kubernetes provisioner spec: {e}"),
			})?;

		for (field, value) in [
			("host", &spec.host),
			("image", &spec.image),
			("namespace", &spec.namespace),
		] {
			if value.is_empty() {
				return Err(ProvisionerError::InvalidSpec {
					message: format!("kubernetes provisioner spec: {field} is required"),
				});
			}
		}

		Ok(spec)
	}

	pub fn kubeconfig(&self) -> Option<&Path> {
		if self.kubeconfig_path.is_empty() {
			None
		} else {
			Some(Path::new(&self.kubeconfig_path))
		}
	}
}
