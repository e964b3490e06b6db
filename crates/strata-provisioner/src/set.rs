// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;
use std::sync::Arc;

use strata_provisioner_core::{CancellationToken, Provisioner, ProvisionerError};
use tracing::{info, warn};

/// Named, long-lived provisioners built from one descriptor.
#[derive(Clone, Default)]
pub struct ProvisionerSet {
	provisioners: BTreeMap<String, Arc<dyn Provisioner>>,
}

impl ProvisionerSet {
	pub fn new(provisioners: BTreeMap<String, Arc<dyn Provisioner>>) -> Self {
		Self { provisioners }
	}

	pub fn get(&self, name: &str) -> Option<Arc<dyn Provisioner>> {
		self.provisioners.get(name).cloned()
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.provisioners.keys().map(String::as_str)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Provisioner>)> {
		self.provisioners.iter().map(|(k, v)| (k.as_str(), v))
	}

	pub fn len(&self) -> usize {
		self.provisioners.len()
	}

	pub fn is_empty(&self) -> bool {
		self.provisioners.is_empty()
	}

	/// Run the fleet health check on every provisioner.
	///
	/// Every provisioner is checked even when an earlier one fails. Failures are
	/// logged and returned by name.
	pub async fn check_all(&self, cancel: &CancellationToken) -> Vec<(String, ProvisionerError)> {
		let mut failures = Vec::new();
		for (name, provisioner) in &self.provisioners {
			match provisioner.check(cancel).await {
				Ok(()) => info!(provisioner = %name, kind = %provisioner.kind(), "check passed"),
				Err(e) => {
					warn!(provisioner = %name, kind = %provisioner.kind(), error = %e, "check failed");
					failures.push((name.clone(), e));
				}
			}
		}
		failures
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use strata_provisioner_core::{
		ProvisionerKind, Resource, ResourceOptions, ResourceType, Result,
	};

	struct CountingProvisioner {
		checks: AtomicUsize,
		fail: bool,
	}

	impl CountingProvisioner {
		fn new(fail: bool) -> Arc<Self> {
			Arc::new(Self {
				checks: AtomicUsize::new(0),
				fail,
			})
		}
	}

	#[async_trait]
	impl Provisioner for CountingProvisioner {
		fn kind(&self) -> ProvisionerKind {
			ProvisionerKind::Static
		}

		fn supports(&self, resource_type: ResourceType) -> bool {
			resource_type == ResourceType::Runtime
		}

		async fn provision(
			&self,
			_cancel: &CancellationToken,
			resource: &Resource,
			_opts: &ResourceOptions,
		) -> Result<Resource> {
			Ok(resource.clone())
		}

		async fn deprovision(&self, _cancel: &CancellationToken, _resource: &Resource) -> Result<()> {
			Ok(())
		}

		async fn await_ready(&self, _cancel: &CancellationToken, _resource: &Resource) -> Result<()> {
			Ok(())
		}

		async fn update(
			&self,
			_cancel: &CancellationToken,
			resource: &Resource,
			_opts: &ResourceOptions,
		) -> Result<Resource> {
			Ok(resource.clone())
		}

		async fn check(&self, _cancel: &CancellationToken) -> Result<()> {
			self.checks.fetch_add(1, Ordering::SeqCst);
			if self.fail {
				Err(ProvisionerError::CapacityExhausted { slots: 1 })
			} else {
				Ok(())
			}
		}

		async fn check_resource(
			&self,
			_cancel: &CancellationToken,
			resource: &Resource,
			_opts: &ResourceOptions,
		) -> Result<Resource> {
			Ok(resource.clone())
		}
	}

	#[tokio::test]
	async fn check_all_visits_every_provisioner() {
		let healthy = CountingProvisioner::new(false);
		let broken = CountingProvisioner::new(true);
		let later = CountingProvisioner::new(false);

		let mut map: BTreeMap<String, Arc<dyn Provisioner>> = BTreeMap::new();
		map.insert("a".into(), healthy.clone());
		map.insert("b".into(), broken.clone());
		map.insert("c".into(), later.clone());
		let set = ProvisionerSet::new(map);

		let failures = set.check_all(&CancellationToken::new()).await;

		assert_eq!(failures.len(), 1);
		assert_eq!(failures[0].0, "b");
		for p in [&healthy, &broken, &later] {
			assert_eq!(p.checks.load(Ordering::SeqCst), 1);
		}
	}

	#[test]
	fn iteration_is_sorted_by_name() {
		let mut map: BTreeMap<String, Arc<dyn Provisioner>> = BTreeMap::new();
		map.insert("zeta".into(), CountingProvisioner::new(false));
		map.insert("alpha".into(), CountingProvisioner::new(false));
		let set = ProvisionerSet::new(map);

		let names: Vec<_> = set.iter().map(|(name, _)| name).collect();
		assert_eq!(names, vec!["alpha", "zeta"]);
	}
}
