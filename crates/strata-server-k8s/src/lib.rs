// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cluster API client abstraction for Strata runtime provisioning.
//!
//! This crate provides:
//! - A trait-based cluster client abstraction for testability
//! - Production implementation using the kube crate (server-side apply,
//!   foreground deletion)
//! - An in-memory cluster in [`testing`]

mod client;
mod error;
mod kube_client;
pub mod testing;
mod types;

pub use client::ClusterClient;
pub use error::{K8sError, K8sResult};
pub use kube_client::KubeClient;
pub use types::{
	Deployment, DeploymentSpec, DeploymentStatus, Ingress, ManifestObject, ObjectKind, ObjectMeta,
	PersistentVolumeClaim, PersistentVolumeClaimSpec, Quantity, Service, VolumeResourceRequirements,
};
