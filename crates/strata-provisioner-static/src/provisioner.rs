// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use strata_provisioner_core::{
	ensure_supported, run_cancellable, CancellationToken, CapacityStore, Provisioner,
	ProvisionerError, ProvisionerKind, Resource, ResourceConfig, ResourceOptions, ResourceState,
	ResourceType, Result, RuntimeConfig, RuntimeSizing,
};
use tracing::{debug, info, instrument, warn};

use crate::health::{used_by_host, CapacityReport, CapacityWarning};
use crate::spec::{StaticRuntimeSpec, StaticSpec};

/// Places runtimes on a fixed pool of hosts.
///
/// Slot usage is read from the capacity store on every call. The headroom
/// check and the caller's later assignment write are not atomic, so two
/// concurrent requests can both land on a host with room for only one.
pub struct StaticProvisioner {
	spec: StaticSpec,
	store: Arc<dyn CapacityStore>,
	rng: Mutex<fastrand::Rng>,
}

impl StaticProvisioner {
	pub fn new(spec: StaticSpec, store: Arc<dyn CapacityStore>) -> Self {
		Self {
			spec,
			store,
			rng: Mutex::new(fastrand::Rng::new()),
		}
	}

	pub fn from_spec_json(spec: serde_json::Value, store: Arc<dyn CapacityStore>) -> Result<Self> {
		Ok(Self::new(StaticSpec::from_value(spec)?, store))
	}

	/// Use a deterministic host choice.
	pub fn with_seed(mut self, seed: u64) -> Self {
		self.rng = Mutex::new(fastrand::Rng::with_seed(seed));
		self
	}

	pub fn spec(&self) -> &StaticSpec {
		&self.spec
	}

	/// Current utilization of the host pool and any warnings it triggers.
	pub async fn capacity_report(&self, cancel: &CancellationToken) -> Result<CapacityReport> {
		let used = run_cancellable(cancel, async {
			Ok(self.store.resolve_slots_used().await?)
		})
		.await?;
		Ok(CapacityReport::compute(&self.spec.runtimes, &used))
	}

	fn pick<'a>(&self, candidates: &[&'a StaticRuntimeSpec]) -> &'a StaticRuntimeSpec {
		let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		candidates[rng.usize(..candidates.len())]
	}
}

#[async_trait]
impl Provisioner for StaticProvisioner {
	fn kind(&self) -> ProvisionerKind {
		ProvisionerKind::Static
	}

	fn supports(&self, resource_type: ResourceType) -> bool {
		resource_type == ResourceType::Runtime
	}

	#[instrument(skip(self, cancel, resource, opts), fields(resource_id = %resource.id))]
	async fn provision(
		&self,
		cancel: &CancellationToken,
		resource: &Resource,
		opts: &ResourceOptions,
	) -> Result<Resource> {
		ensure_supported(self, resource)?;
		let args = opts.runtime_args()?;
		let sizing = RuntimeSizing::for_slots(args.slots)?;

		let used = run_cancellable(cancel, async {
			Ok(self.store.resolve_slots_used().await?)
		})
		.await?;
		let used_by_host = used_by_host(&used);

		let slots = i64::from(args.slots);
		let candidates: Vec<&StaticRuntimeSpec> = self
			.spec
			.runtimes
			.iter()
			.filter(|rt| {
				let host_used = used_by_host.get(rt.host.as_str()).copied().unwrap_or(0);
				i64::from(rt.slots) - host_used >= slots
			})
			.collect();

		if candidates.is_empty() {
			warn!(slots = args.slots, hosts = self.spec.runtimes.len(), "no static runtime host has capacity");
			return Err(ProvisionerError::CapacityExhausted { slots: args.slots });
		}

		let chosen = self.pick(&candidates);
		info!(
			host = %chosen.host,
			slots = args.slots,
			candidates = candidates.len(),
			"placed runtime on static host"
		);

		Ok(Resource {
			id: resource.id.clone(),
			resource_type: resource.resource_type,
			state: ResourceState::None,
			config: ResourceConfig::Runtime(RuntimeConfig {
				host: chosen.host.clone(),
				audience: chosen.audience_url.clone(),
				cpu: sizing.cpu,
				memory_gb: sizing.memory_gb,
				storage_bytes: sizing.storage_bytes,
			}),
		})
	}

	async fn deprovision(&self, _cancel: &CancellationToken, resource: &Resource) -> Result<()> {
		debug!(resource_id = %resource.id, "static deprovision is a no-op");
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

	#[instrument(skip(self, cancel))]
	async fn check(&self, cancel: &CancellationToken) -> Result<()> {
		let report = self.capacity_report(cancel).await?;
		for warning in &report.warnings {
			match warning {
				CapacityWarning::HighAggregateUtilization { utilization } => warn!(
					total_slots = report.total_slots,
					used_slots = report.used_slots,
					utilization,
					"static runtime pool is running out of slots"
				),
				CapacityWarning::HighMinimumUtilization { utilization } => warn!(
					total_slots = report.total_slots,
					used_slots = report.used_slots,
					min_host_utilization = utilization,
					"no static runtime host has meaningful slack"
				),
			}
		}
		debug!(
			total_slots = report.total_slots,
			used_slots = report.used_slots,
			"static runtime capacity checked"
		);
		Ok(())
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
