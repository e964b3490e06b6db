// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Static-capacity runtime scheduler.
//!
//! Bin-packs slot-sized runtime requests onto a fixed list of hosts, picking
//! uniformly at random among hosts with enough headroom, and reports fleet
//! utilization for capacity alerting.

mod health;
mod provisioner;
mod spec;

pub use health::{
	CapacityReport, CapacityWarning, HIGH_AGGREGATE_UTILIZATION, HIGH_MINIMUM_UTILIZATION,
};
pub use provisioner::StaticProvisioner;
pub use spec::{StaticRuntimeSpec, StaticSpec};
