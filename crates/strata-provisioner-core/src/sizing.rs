// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Linear runtime sizing by slot count.

use crate::error::{ProvisionerError, Result};

/// One gigabyte, binary.
pub const GB: u64 = 1 << 30;

const CPU_PER_SLOT: u32 = 1;
const MEMORY_GB_PER_SLOT: u32 = 4;
const STORAGE_GB_PER_SLOT: u64 = 40;

/// Resources allocated to a runtime of a given slot count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeSizing {
	pub slots: u32,
	pub cpu: u32,
	pub memory_gb: u32,
	pub storage_bytes: u64,
}

impl RuntimeSizing {
	/// Fails with [`ProvisionerError::InvalidArgs`] when any dimension overflows.
	pub fn for_slots(slots: u32) -> Result<Self> {
		let too_large = || ProvisionerError::InvalidArgs {
			message: format!("{slots} slots exceeds the largest sizable runtime"),
		};

		Ok(Self {
			slots,
			cpu: CPU_PER_SLOT.checked_mul(slots).ok_or_else(too_large)?,
			memory_gb: MEMORY_GB_PER_SLOT.checked_mul(slots).ok_or_else(too_large)?,
			storage_bytes: (STORAGE_GB_PER_SLOT * GB)
				.checked_mul(u64::from(slots))
				.ok_or_else(too_large)?,
		})
	}
}
