// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Deterministic cluster object names derived from a resource ID.

use strata_server_k8s::ObjectKind;

/// The resource ID with separators stripped.
pub fn provision_id(resource_id: &str) -> String {
	resource_id.replace('-', "")
}

/// Expand the `*` placeholder of a host template.
pub fn runtime_host(host_template: &str, provision_id: &str) -> String {
	host_template.replace('*', provision_id)
}

/// `host` without its `scheme://` prefix.
pub fn strip_scheme(host: &str) -> &str {
	host.split_once("//").map(|(_, rest)| rest).unwrap_or(host)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
	pub http_ingress: String,
	pub grpc_ingress: String,
	pub service: String,
	pub deployment: String,
	pub pvc: String,
}

impl ResourceNames {
	pub fn new(provision_id: &str) -> Self {
		let runtime = format!("runtime-{provision_id}");
		Self {
			http_ingress: format!("http-runtime-{provision_id}"),
			grpc_ingress: format!("grpc-runtime-{provision_id}"),
			service: runtime.clone(),
			deployment: runtime.clone(),
			pvc: runtime,
		}
	}

	/// Objects in teardown order: external routing first, storage last.
	pub fn delete_order(&self) -> [(ObjectKind, &str); 5] {
		[
			(ObjectKind::Ingress, &self.http_ingress),
			(ObjectKind::Ingress, &self.grpc_ingress),
			(ObjectKind::Service, &self.service),
			(ObjectKind::Deployment, &self.deployment),
			(ObjectKind::PersistentVolumeClaim, &self.pvc),
		]
	}
}
