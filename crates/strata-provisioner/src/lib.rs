// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Provisioner registry for Strata runtimes.
//!
//! A [`Registry`] maps each [`ProvisionerKind`](strata_provisioner_core::ProvisionerKind)
//! to a constructor. [`Registry::new_set`] turns a JSON descriptor into a
//! [`ProvisionerSet`] of named provisioners sharing one capacity store.

mod error;
mod registry;
mod set;

pub use error::RegistryError;
pub use registry::{Constructor, ConstructorFuture, ProvisionerSpec, Registry};
pub use set::ProvisionerSet;
