// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fleet capacity health for the static host pool.

use std::collections::HashMap;

use strata_provisioner_core::SlotsUsed;

use crate::spec::StaticRuntimeSpec;

/// Aggregate utilization at or above which the fleet is considered full.
pub const HIGH_AGGREGATE_UTILIZATION: f64 = 0.8;

/// Least-loaded-host utilization at or above which no host has real slack.
pub const HIGH_MINIMUM_UTILIZATION: f64 = 0.7;

#[derive(Debug, Clone, PartialEq)]
pub enum CapacityWarning {
	HighAggregateUtilization { utilization: f64 },
	HighMinimumUtilization { utilization: f64 },
}

/// Point-in-time slot usage across all configured hosts.
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityReport {
	pub total_slots: i64,
	pub used_slots: i64,
	/// Utilization of the least-loaded host. 1.0 when no host has capacity.
	pub min_host_utilization: f64,
	pub warnings: Vec<CapacityWarning>,
}

impl CapacityReport {
	pub fn utilization(&self) -> f64 {
		if self.total_slots > 0 {
			self.used_slots as f64 / self.total_slots as f64
		} else {
			0.0
		}
	}

	pub(crate) fn compute(runtimes: &[StaticRuntimeSpec], used: &[SlotsUsed]) -> Self {
		let used_by_host = used_by_host(used);

		let mut total_slots = 0i64;
		let mut used_slots = 0i64;
		let mut min_host_utilization = 1.0f64;
		for rt in runtimes {
			let capacity = i64::from(rt.slots);
			let host_used = used_by_host.get(rt.host.as_str()).copied().unwrap_or(0);
			total_slots += capacity;
			used_slots += host_used;
			if capacity > 0 {
				min_host_utilization = min_host_utilization.min(host_used as f64 / capacity as f64);
			}
		}

		let mut report = CapacityReport {
			total_slots,
			used_slots,
			min_host_utilization,
			warnings: Vec::new(),
		};

		let utilization = report.utilization();
		if utilization >= HIGH_AGGREGATE_UTILIZATION {
			report
				.warnings
				.push(CapacityWarning::HighAggregateUtilization { utilization });
		}
		if used_slots > 0 && min_host_utilization >= HIGH_MINIMUM_UTILIZATION {
			report.warnings.push(CapacityWarning::HighMinimumUtilization {
				utilization: min_host_utilization,
			});
		}

		report
	}
}

pub(crate) fn used_by_host(used: &[SlotsUsed]) -> HashMap<&str, i64> {
	let mut map = HashMap::with_capacity(used.len());
	for row in used {
		*map.entry(row.host.as_str()).or_insert(0) += row.slots;
	}
	map
}
