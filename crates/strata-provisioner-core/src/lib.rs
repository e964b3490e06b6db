// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared vocabulary for Strata runtime provisioning.
//!
//! This crate provides:
//! - The [`Resource`] model and the [`ResourceOptions`] request envelope
//! - The [`Provisioner`] trait implemented by each backend
//! - The [`CapacityStore`] seam to the capacity-accounting system of record
//! - Linear slot sizing shared by all runtime provisioners

pub mod error;
pub mod options;
pub mod provisioner;
pub mod resource;
pub mod sizing;
pub mod store;

pub use error::{BoxError, ProvisionerError, Result};
pub use options::{ResourceOptions, RuntimeArgs, BILLING_PLAN_ANNOTATION};
pub use provisioner::{ensure_supported, run_cancellable, Provisioner, ProvisionerKind};
pub use resource::{
	Resource, ResourceConfig, ResourceState, ResourceType, RuntimeConfig, RuntimeState,
};
pub use sizing::{RuntimeSizing, GB};
pub use store::{CapacityStore, InMemoryCapacityStore, SlotsUsed, StoreError};
pub use tokio_util::sync::CancellationToken;
