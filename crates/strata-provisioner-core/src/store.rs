// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Capacity-accounting store seam.
//!
//! The store is the system of record for which resource is placed on which
//! static host. Provisioners only read aggregates from it; callers record and
//! release assignments.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BoxError;

/// Slots currently assigned to one runtime host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotsUsed {
	pub host: String,
	pub slots: i64,
}

/// Errors returned by a capacity store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("Capacity store unavailable: {0}")]
	Unavailable(String),

	#[error("Capacity store query failed: {0}")]
	Query(#[source] BoxError),
}

/// Read access to per-host slot usage.
#[async_trait]
pub trait CapacityStore: Send + Sync {
	/// Current slot usage for each host that has at least one assignment.
	async fn resolve_slots_used(&self) -> Result<Vec<SlotsUsed>, StoreError>;
}

/// In-process store with the same assignment semantics as the SQL store.
///
/// Useful for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryCapacityStore {
	assignments: Mutex<BTreeMap<String, (String, i64)>>,
	unavailable: Mutex<Option<String>>,
}

impl InMemoryCapacityStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Record `slots` on `host` for a resource. Zero slots removes the assignment.
	pub fn upsert_assignment(&self, resource_id: &str, host: &str, slots: i64) {
		let mut assignments = self.lock_assignments();
		if slots == 0 {
			assignments.remove(resource_id);
		} else {
			assignments.insert(resource_id.to_string(), (host.to_string(), slots));
		}
	}

	/// Remove a resource's assignment. Missing assignments are ignored.
	pub fn delete_assignment(&self, resource_id: &str) {
		self.lock_assignments().remove(resource_id);
	}

	/// Make every subsequent query fail with `message`, or recover with `None`.
	pub fn set_unavailable(&self, message: Option<&str>) {
		let mut guard = self
			.unavailable
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner());
		*guard = message.map(str::to_string);
	}

	fn lock_assignments(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, (String, i64)>> {
		self
			.assignments
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

#[async_trait]
impl CapacityStore for InMemoryCapacityStore {
	async fn resolve_slots_used(&self) -> Result<Vec<SlotsUsed>, StoreError> {
		if let Some(message) = self
			.unavailable
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.clone()
		{
			return Err(StoreError::Unavailable(message));
		}

		let mut per_host: BTreeMap<String, i64> = BTreeMap::new();
		for (host, slots) in self.lock_assignments().values() {
			*per_host.entry(host.clone()).or_default() += slots;
		}

		Ok(
			per_host
				.into_iter()
				.map(|(host, slots)| SlotsUsed { host, slots })
				.collect(),
		)
	}
}
