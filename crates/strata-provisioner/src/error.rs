// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use strata_provisioner_core::{ProvisionerError, ProvisionerKind};

/// Errors raised while registering constructors or building a provisioner set.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
	/// A kind was registered twice. Surfaces at startup.
	#[error("provisioner kind {kind} is already registered")]
	DuplicateRegistration { kind: ProvisionerKind },

	#[error("invalid provisioner set descriptor: {0}")]
	Descriptor(#[from] serde_json::Error),

	/// A named entry could not be built; the whole set is rejected.
	#[error("provisioner {name:?}: {source}")]
	Build {
		name: String,
		#[source]
		source: ProvisionerError,
	},
}
