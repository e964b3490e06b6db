// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Kubernetes runtime orchestrator.
//!
//! Each runtime is five objects (PVC, Deployment, Service, HTTP and gRPC
//! Ingress) rendered from YAML templates and converged with server-side
//! apply. A checksum of the template sources is stamped on every object so
//! that reconciliation can spot template, version and billing-plan drift.

mod names;
mod provisioner;
mod quantity;
mod spec;
mod template;

pub use names::{provision_id, runtime_host, ResourceNames};
pub use provisioner::{
	KubernetesProvisioner, CHECKSUM_ANNOTATION, FIELD_MANAGER, INSTANCE_LABEL, MANAGED_BY_LABEL,
};
pub use quantity::parse_quantity;
pub use spec::{KubernetesSpec, TemplateKind, TemplatePaths};
pub use template::{TemplateData, TemplateSet};
