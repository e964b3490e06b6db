// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use strata_common_http::{default_probe_config, health_url, probe_health, RetryConfig, RetryError};
use strata_provisioner_core::{
	ensure_supported, run_cancellable, CancellationToken, Provisioner, ProvisionerError,
	ProvisionerKind, Resource, ResourceConfig, ResourceOptions, ResourceState, ResourceType,
	Result, RuntimeConfig, RuntimeSizing, RuntimeState, BILLING_PLAN_ANNOTATION,
};
use strata_server_k8s::{
	ClusterClient, Deployment, Ingress, K8sError, KubeClient, ManifestObject, ObjectMeta,
	PersistentVolumeClaim, Quantity, Service,
};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::names::{provision_id, runtime_host, strip_scheme, ResourceNames};
use crate::quantity::parse_quantity;
use crate::spec::{KubernetesSpec, TemplateKind};
use crate::template::{TemplateData, TemplateSet};

/// Server-side apply field manager, also used as the `managed-by` label.
pub const FIELD_MANAGER: &str = "strata-admin";

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";
pub const CHECKSUM_ANNOTATION: &str = "checksum/templates";

const DEFAULT_VERSION: &str = "latest";
const DEFAULT_ENVIRONMENT: &str = "prod";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Deploys each runtime as a PVC, Deployment, Service and two Ingresses.
pub struct KubernetesProvisioner {
	spec: KubernetesSpec,
	client: Arc<dyn ClusterClient>,
	templates: TemplateSet,
	http: reqwest::Client,
	probe: RetryConfig,
	poll_interval: Duration,
}

/// Rendered objects for one runtime, before metadata is stamped.
struct RenderedObjects {
	pvc: PersistentVolumeClaim,
	deployment: Deployment,
	service: Service,
	http_ingress: Ingress,
	grpc_ingress: Ingress,
}

impl KubernetesProvisioner {
	/// Load templates and use `client` for every cluster call.
	pub fn new(spec: KubernetesSpec, client: Arc<dyn ClusterClient>) -> Result<Self> {
		let templates = TemplateSet::load(&spec.template_paths)?;
		let http = strata_common_http::builder()
			.timeout(Duration::from_secs(10))
			.build()
			.map_err(|e| ProvisionerError::InvalidSpec {
				message: format!("failed to build health probe client: {e}"),
			})?;

		debug!(
			namespace = %spec.namespace,
			checksum = %templates.checksum(),
			"kubernetes provisioner initialized"
		);

		Ok(Self {
			spec,
			client,
			templates,
			http,
			probe: default_probe_config(),
			poll_interval: DEFAULT_POLL_INTERVAL,
		})
	}

	/// Parse `spec`, connect to the cluster it names and load its templates.
	pub async fn connect(spec: serde_json::Value) -> Result<Self> {
		let spec = KubernetesSpec::from_value(spec)?;
		let client = KubeClient::from_kubeconfig(spec.kubeconfig())
			.await
			.map_err(|e| ProvisionerError::InvalidSpec {
				message: format!("failed to connect to cluster: {e}"),
			})?;
		Self::new(spec, Arc::new(client))
	}

	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval.max(Duration::from_millis(1));
		self
	}

	pub fn with_probe_config(mut self, probe: RetryConfig) -> Self {
		self.probe = probe;
		self
	}

	pub fn spec(&self) -> &KubernetesSpec {
		&self.spec
	}

	pub fn templates_checksum(&self) -> &str {
		self.templates.checksum()
	}

	fn render(&self, data: &TemplateData) -> Result<RenderedObjects> {
		Ok(RenderedObjects {
			pvc: self.templates.render_as(TemplateKind::Pvc, data)?,
			deployment: self.templates.render_as(TemplateKind::Deployment, data)?,
			service: self.templates.render_as(TemplateKind::Service, data)?,
			http_ingress: self.templates.render_as(TemplateKind::HttpIngress, data)?,
			grpc_ingress: self.templates.render_as(TemplateKind::GrpcIngress, data)?,
		})
	}

	/// Keep the live PVC's storage request when it is larger than the rendered one.
	async fn guard_pvc_shrink(
		&self,
		cancel: &CancellationToken,
		resource_id: &str,
		name: &str,
		pvc: &mut PersistentVolumeClaim,
	) -> Result<()> {
		let live = run_cancellable(cancel, async {
			Ok(self.client.get_pvc(&self.spec.namespace, name).await)
		})
		.await?;
		let live = match live {
			Ok(live) => live,
			Err(e) if e.is_not_found() => return Ok(()),
			Err(e) => return Err(ProvisionerError::cluster("get pvc", resource_id, e)),
		};

		let Some(live_storage) = storage_request(&live).cloned() else {
			return Ok(());
		};
		let rendered = storage_request(pvc).and_then(|q| parse_quantity(&q.0));
		match (parse_quantity(&live_storage.0), rendered) {
			(Some(live_bytes), Some(rendered_bytes)) if live_bytes > rendered_bytes => {
				info!(
					pvc = name,
					live = %live_storage.0,
					rendered = rendered_bytes,
					"keeping larger live storage request"
				);
				set_storage_request(pvc, live_storage);
			}
			(None, _) => {
				warn!(pvc = name, live = %live_storage.0, "unparseable live storage request, keeping it");
				set_storage_request(pvc, live_storage);
			}
			_ => {}
		}
		Ok(())
	}

	fn stamp(&self, object: &mut ManifestObject, name: &str, pid: &str, billing_plan: &str) {
		let meta: &mut ObjectMeta = object.metadata_mut();
		meta.name = Some(name.to_string());
		meta.namespace = Some(self.spec.namespace.clone());

		let labels = meta.labels.get_or_insert_with(BTreeMap::new);
		labels.insert(MANAGED_BY_LABEL.to_string(), FIELD_MANAGER.to_string());
		labels.insert(INSTANCE_LABEL.to_string(), pid.to_string());

		let annotations = meta.annotations.get_or_insert_with(BTreeMap::new);
		annotations.insert(
			CHECKSUM_ANNOTATION.to_string(),
			self.templates.checksum().to_string(),
		);
		annotations.insert(BILLING_PLAN_ANNOTATION.to_string(), billing_plan.to_string());
	}

	/// Why a runtime needs reprovisioning, or `None` when it matches the desired state.
	fn drift_reason(
		&self,
		state: &RuntimeState,
		live: &Deployment,
		opts: &ResourceOptions,
	) -> Option<&'static str> {
		let annotation = |key: &str| {
			live
				.metadata
				.annotations
				.as_ref()
				.and_then(|a| a.get(key))
				.map(String::as_str)
				.unwrap_or("")
		};

		if state.version != opts.platform_version {
			Some("version changed")
		} else if annotation(CHECKSUM_ANNOTATION) != self.templates.checksum() {
			Some("templates changed")
		} else if annotation(BILLING_PLAN_ANNOTATION) != opts.annotation(BILLING_PLAN_ANNOTATION) {
			Some("billing plan changed")
		} else {
			None
		}
	}
}

fn resolve_version(requested: &str, platform_version: &str) -> String {
	let version = if requested.is_empty() {
		DEFAULT_VERSION
	} else {
		requested
	};
	if version == DEFAULT_VERSION && !platform_version.is_empty() {
		platform_version.to_string()
	} else {
		version.to_string()
	}
}

fn storage_request(pvc: &PersistentVolumeClaim) -> Option<&Quantity> {
	pvc
		.spec
		.as_ref()?
		.resources
		.as_ref()?
		.requests
		.as_ref()?
		.get("storage")
}

fn set_storage_request(pvc: &mut PersistentVolumeClaim, quantity: Quantity) {
	let requests = pvc
		.spec
		.get_or_insert_with(Default::default)
		.resources
		.get_or_insert_with(Default::default)
		.requests
		.get_or_insert_with(BTreeMap::new);
	requests.insert("storage".to_string(), quantity);
}

fn deployment_ready(deployment: &Deployment) -> bool {
	let Some(status) = deployment.status.as_ref() else {
		return false;
	};
	let available = status.available_replicas.unwrap_or(0);
	let replicas = status.replicas.unwrap_or(0);
	available > 0 && available == replicas && deployment.metadata.generation == status.observed_generation
}

#[async_trait]
impl Provisioner for KubernetesProvisioner {
	fn kind(&self) -> ProvisionerKind {
		ProvisionerKind::Kubernetes
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

		let version = resolve_version(&args.version, &opts.platform_version);
		let environment = if args.environment.is_empty() {
			DEFAULT_ENVIRONMENT.to_string()
		} else {
			args.environment.clone()
		};

		let pid = provision_id(&resource.id);
		let names = ResourceNames::new(&pid);
		let host = runtime_host(&self.spec.host, &pid);
		let sizing = RuntimeSizing::for_slots(args.slots)?;

		let data = TemplateData {
			image: self.spec.image.clone(),
			image_tag: version.clone(),
			provision_id: pid.clone(),
			host: strip_scheme(&host).to_string(),
			cpu: sizing.cpu,
			memory_gb: sizing.memory_gb,
			storage_bytes: sizing.storage_bytes,
			slots: sizing.slots,
			names: names.clone(),
			annotations: opts.annotations.clone(),
			environment,
		};
		let mut rendered = self.render(&data)?;

		self
			.guard_pvc_shrink(cancel, &resource.id, &names.pvc, &mut rendered.pvc)
			.await?;

		let billing_plan = opts.annotation(BILLING_PLAN_ANNOTATION);
		let objects = [
			(ManifestObject::PersistentVolumeClaim(rendered.pvc), &names.pvc),
			(ManifestObject::Deployment(rendered.deployment), &names.deployment),
			(ManifestObject::Service(rendered.service), &names.service),
			(ManifestObject::Ingress(rendered.http_ingress), &names.http_ingress),
			(ManifestObject::Ingress(rendered.grpc_ingress), &names.grpc_ingress),
		];

		for (mut object, name) in objects {
			self.stamp(&mut object, name, &pid, billing_plan);
			let kind = object.kind();
			run_cancellable(cancel, async {
				self
					.client
					.apply(&self.spec.namespace, &object, FIELD_MANAGER)
					.await
					.map_err(|e| ProvisionerError::cluster(format!("apply {kind} {name}"), &resource.id, e))
			})
			.await?;
			debug!(%kind, name = %name, "applied");
		}

		info!(
			host = %host,
			version = %version,
			slots = args.slots,
			"runtime provisioned"
		);

		Ok(Resource {
			id: resource.id.clone(),
			resource_type: resource.resource_type,
			state: ResourceState::Kubernetes(RuntimeState {
				slots: args.slots,
				version,
			}),
			config: ResourceConfig::Runtime(RuntimeConfig {
				host: host.clone(),
				audience: host,
				cpu: sizing.cpu,
				memory_gb: sizing.memory_gb,
				storage_bytes: sizing.storage_bytes,
			}),
		})
	}

	#[instrument(skip(self, cancel, resource), fields(resource_id = %resource.id))]
	async fn deprovision(&self, cancel: &CancellationToken, resource: &Resource) -> Result<()> {
		let names = ResourceNames::new(&provision_id(&resource.id));

		let mut errors = Vec::new();
		for (kind, name) in names.delete_order() {
			let outcome = run_cancellable(cancel, async {
				Ok(self.client.delete(&self.spec.namespace, kind, name).await)
			})
			.await?;

			match outcome {
				Ok(()) => debug!(%kind, name, "deleted"),
				Err(K8sError::NotFound { .. }) => debug!(%kind, name, "already deleted"),
				Err(e) => {
					warn!(%kind, name, error = %e, "delete failed");
					errors.push(ProvisionerError::cluster(
						format!("delete {kind} {name}"),
						&resource.id,
						e,
					));
				}
			}
		}

		ProvisionerError::combine(errors)
	}

	#[instrument(skip(self, cancel, resource), fields(resource_id = %resource.id))]
	async fn await_ready(&self, cancel: &CancellationToken, resource: &Resource) -> Result<()> {
		let pid = provision_id(&resource.id);
		let names = ResourceNames::new(&pid);
		let timeout = Duration::from_secs(self.spec.timeout_seconds);
		let deadline = Instant::now() + timeout;
		let timed_out = || ProvisionerError::ReadinessTimeout {
			resource_id: resource.id.clone(),
			timeout_secs: self.spec.timeout_seconds,
		};

		let mut ticker = tokio::time::interval(self.poll_interval);
		loop {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(ProvisionerError::Cancelled),
				_ = ticker.tick() => {}
			}

			let polled = tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(ProvisionerError::Cancelled),
				res = self.client.get_deployment(&self.spec.namespace, &names.deployment) => res,
				_ = tokio::time::sleep_until(deadline) => return Err(timed_out()),
			};

			match polled {
				Ok(deployment) if deployment_ready(&deployment) => break,
				Ok(_) => {}
				// The Deployment may not be visible yet right after apply.
				Err(e) => debug!(error = %e, "deployment not readable yet"),
			}

			if Instant::now() >= deadline {
				warn!(timeout_secs = self.spec.timeout_seconds, "runtime not ready before timeout");
				return Err(timed_out());
			}
		}

		let url = health_url(&runtime_host(&self.spec.host, &pid));
		match probe_health(&self.http, &url, &self.probe, cancel).await {
			Ok(()) => {
				info!(url = %url, "runtime ready");
				Ok(())
			}
			Err(RetryError::Cancelled) => Err(ProvisionerError::Cancelled),
			Err(RetryError::Failed { attempts, source }) => Err(ProvisionerError::HealthProbe {
				url,
				message: format!("{source} after {attempts} attempts"),
			}),
		}
	}

	#[instrument(skip(self, cancel, resource, opts), fields(resource_id = %resource.id))]
	async fn update(
		&self,
		cancel: &CancellationToken,
		resource: &Resource,
		opts: &ResourceOptions,
	) -> Result<Resource> {
		self.provision(cancel, resource, opts).await
	}

	async fn check(&self, _cancel: &CancellationToken) -> Result<()> {
		Ok(())
	}

	#[instrument(skip(self, cancel, resource, opts), fields(resource_id = %resource.id))]
	async fn check_resource(
		&self,
		cancel: &CancellationToken,
		resource: &Resource,
		opts: &ResourceOptions,
	) -> Result<Resource> {
		ensure_supported(self, resource)?;
		let state = match &resource.state {
			ResourceState::Kubernetes(state) => state.clone(),
			ResourceState::None => RuntimeState::default(),
		};

		let names = ResourceNames::new(&provision_id(&resource.id));
		let live = run_cancellable(cancel, async {
			Ok(
				self
					.client
					.get_deployment(&self.spec.namespace, &names.deployment)
					.await,
			)
		})
		.await?;

		let reason = match live {
			Ok(deployment) => self.drift_reason(&state, &deployment, opts),
			Err(e) if e.is_not_found() => Some("deployment missing"),
			Err(e) => return Err(ProvisionerError::cluster("get deployment", &resource.id, e)),
		};

		let Some(reason) = reason else {
			return Ok(resource.clone());
		};

		info!(reason, "reprovisioning runtime");
		let refreshed = self.provision(cancel, resource, opts).await?;
		self.await_ready(cancel, &refreshed).await?;
		Ok(refreshed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use strata_provisioner_core::GB;
	use strata_server_k8s::testing::{ClusterOp, InMemoryClusterClient};
	use strata_server_k8s::{ObjectKind, PersistentVolumeClaimSpec, VolumeResourceRequirements};
	use tempfile::TempDir;
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	use crate::spec::TemplatePaths;

	const NS: &str = "runtimes";
	const ID: &str = "6f1c9a2e-7b1d-4c3a";
	const PID: &str = "6f1c9a2e7b1d4c3a";

	const PVC: &str = r#"apiVersion: v1
kind: PersistentVolumeClaim
metadata:
  name: {{ names.pvc }}
spec:
  accessModes: ["ReadWriteOnce"]
  resources:
    requests:
      storage: "{{ storage_bytes }}"
"#;

	const DEPLOYMENT: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: {{ names.deployment }}
  annotations:
    organization_id: {{ annotations.organization_id | quote }}
spec:
  replicas: 1
  selector:
    matchLabels:
      app: {{ names.deployment }}
  template:
    metadata:
      labels:
        app: {{ names.deployment }}
    spec:
      containers:
        - name: runtime
          image: "{{ image }}:{{ image_tag }}"
          env:
            - name: STRATA_ENVIRONMENT
              value: {{ environment | quote }}
          resources:
            requests:
              cpu: "{{ cpu }}"
              memory: "{{ memory_gb }}Gi"
      volumes:
        - name: data
          persistentVolumeClaim:
            claimName: {{ names.pvc }}
"#;

	const SERVICE: &str = r#"apiVersion: v1
kind: Service
metadata:
  name: {{ names.service }}
  labels: {{ annotations }}
spec:
  selector:
    app: {{ names.deployment }}
  ports:
    - name: http
      port: 8080
    - name: grpc
      port: 9090
"#;

	const INGRESS: &str = r#"apiVersion: networking.k8s.io/v1
kind: Ingress
metadata:
  name: {{ names.NAME }}
spec:
  rules:
    - host: {{ host }}
      http:
        paths:
          - path: /
            pathType: Prefix
            backend:
              service:
                name: {{ names.service }}
                port:
                  number: PORT
"#;

	struct Fixture {
		_dir: TempDir,
		paths: TemplatePaths,
		cluster: Arc<InMemoryClusterClient>,
	}

	impl Fixture {
		fn new() -> Self {
			let dir = tempfile::tempdir().unwrap();
			let write = |file: &str, body: &str| {
				let path = dir.path().join(file);
				std::fs::write(&path, body).unwrap();
				path
			};
			let paths = TemplatePaths {
				http_ingress: write(
					"http.yaml",
					&INGRESS.replace("NAME", "http_ingress").replace("PORT", "8080"),
				),
				grpc_ingress: write(
					"grpc.yaml",
					&INGRESS.replace("NAME", "grpc_ingress").replace("PORT", "9090"),
				),
				service: write("service.yaml", SERVICE),
				deployment: write("deployment.yaml", DEPLOYMENT),
				pvc: write("pvc.yaml", PVC),
			};
			Self {
				_dir: dir,
				paths,
				cluster: Arc::new(InMemoryClusterClient::new()),
			}
		}

		fn spec(&self, host: &str, timeout_seconds: u64) -> KubernetesSpec {
			KubernetesSpec {
				host: host.to_string(),
				image: "ghcr.io/example/runtime".into(),
				namespace: NS.into(),
				timeout_seconds,
				kubeconfig_path: String::new(),
				template_paths: self.paths.clone(),
			}
		}

		fn provisioner(&self) -> KubernetesProvisioner {
			self.provisioner_for("https://*.runtime.example.com", 30)
		}

		fn provisioner_for(&self, host: &str, timeout_seconds: u64) -> KubernetesProvisioner {
			KubernetesProvisioner::new(self.spec(host, timeout_seconds), self.cluster.clone())
				.unwrap()
				.with_poll_interval(Duration::from_millis(10))
				.with_probe_config(RetryConfig {
					max_attempts: 3,
					base_delay: Duration::from_millis(5),
					max_delay: Duration::from_millis(10),
					backoff_factor: 2.0,
					jitter: false,
				})
		}

		fn deployment(&self) -> Deployment {
			self.cluster.deployment(NS, &format!("runtime-{PID}")).unwrap()
		}
	}

	fn opts(slots: u32, platform_version: &str, plan: &str) -> ResourceOptions {
		ResourceOptions {
			args: json!({ "slots": slots }),
			annotations: BTreeMap::from([
				("organization_id".to_string(), "org-1".to_string()),
				(BILLING_PLAN_ANNOTATION.to_string(), plan.to_string()),
			]),
			platform_version: platform_version.to_string(),
		}
	}

	/// Keep reporting the Deployment as rolled out, as a controller would.
	fn keep_ready(cluster: Arc<InMemoryClusterClient>) -> tokio::task::JoinHandle<()> {
		tokio::spawn(async move {
			loop {
				cluster.mark_deployment_ready(NS, &format!("runtime-{PID}"));
				tokio::time::sleep(Duration::from_millis(5)).await;
			}
		})
	}

	fn resource() -> Resource {
		Resource::new(ID, ResourceType::Runtime)
	}

	fn pvc_storage(cluster: &InMemoryClusterClient) -> String {
		storage_request(&cluster.pvc(NS, &format!("runtime-{PID}")).unwrap())
			.unwrap()
			.0
			.clone()
	}

	#[test]
	fn version_resolution() {
		assert_eq!(resolve_version("", "v0.50.0"), "v0.50.0");
		assert_eq!(resolve_version("latest", "v0.50.0"), "v0.50.0");
		assert_eq!(resolve_version("", ""), "latest");
		assert_eq!(resolve_version("v0.49.2", "v0.50.0"), "v0.49.2");
	}

	#[tokio::test]
	async fn provision_applies_five_objects_in_dependency_order() {
		let fx = Fixture::new();
		let p = fx.provisioner();

		let out = p
			.provision(&CancellationToken::new(), &resource(), &opts(2, "v1.0.0", "team"))
			.await
			.unwrap();

		let applies: Vec<ClusterOp> = fx.cluster.writes();
		assert_eq!(
			applies,
			vec![
				ClusterOp::Apply {
					kind: ObjectKind::PersistentVolumeClaim,
					name: format!("runtime-{PID}")
				},
				ClusterOp::Apply {
					kind: ObjectKind::Deployment,
					name: format!("runtime-{PID}")
				},
				ClusterOp::Apply {
					kind: ObjectKind::Service,
					name: format!("runtime-{PID}")
				},
				ClusterOp::Apply {
					kind: ObjectKind::Ingress,
					name: format!("http-runtime-{PID}")
				},
				ClusterOp::Apply {
					kind: ObjectKind::Ingress,
					name: format!("grpc-runtime-{PID}")
				},
			]
		);

		assert_eq!(
			out.state,
			ResourceState::Kubernetes(RuntimeState {
				slots: 2,
				version: "v1.0.0".into()
			})
		);
		let cfg = out.runtime_config().unwrap();
		assert_eq!(cfg.host, format!("https://{PID}.runtime.example.com"));
		assert_eq!(cfg.audience, cfg.host);
		assert_eq!(cfg.cpu, 2);
		assert_eq!(cfg.memory_gb, 8);
		assert_eq!(cfg.storage_bytes, 80 * GB);
	}

	#[tokio::test]
	async fn provision_renders_and_stamps_metadata() {
		let fx = Fixture::new();
		let p = fx.provisioner();
		p.provision(&CancellationToken::new(), &resource(), &opts(1, "v1.0.0", "team"))
			.await
			.unwrap();

		let d = fx.deployment();
		let labels = d.metadata.labels.as_ref().unwrap();
		assert_eq!(labels[MANAGED_BY_LABEL], FIELD_MANAGER);
		assert_eq!(labels[INSTANCE_LABEL], PID);
		let annotations = d.metadata.annotations.as_ref().unwrap();
		assert_eq!(annotations[CHECKSUM_ANNOTATION], p.templates_checksum());
		assert_eq!(annotations[BILLING_PLAN_ANNOTATION], "team");
		assert_eq!(annotations["organization_id"], "org-1");
		assert_eq!(d.metadata.namespace.as_deref(), Some(NS));

		let pod = d.spec.unwrap().template.spec.unwrap();
		let container = &pod.containers[0];
		assert_eq!(container.image.as_deref(), Some("ghcr.io/example/runtime:v1.0.0"));
		assert_eq!(container.env.as_ref().unwrap()[0].value.as_deref(), Some("prod"));

		let ingress = match fx
			.cluster
			.object(NS, ObjectKind::Ingress, &format!("http-runtime-{PID}"))
			.unwrap()
		{
			ManifestObject::Ingress(i) => i,
			other => panic!("unexpected object {other:?}"),
		};
		let host = ingress.spec.unwrap().rules.unwrap()[0].host.clone();
		assert_eq!(host.as_deref(), Some(format!("{PID}.runtime.example.com").as_str()));

		let service = match fx
			.cluster
			.object(NS, ObjectKind::Service, &format!("runtime-{PID}"))
			.unwrap()
		{
			ManifestObject::Service(s) => s,
			other => panic!("unexpected object {other:?}"),
		};
		let labels = service.metadata.labels.unwrap();
		assert_eq!(labels["organization_id"], "org-1");
		assert_eq!(labels[BILLING_PLAN_ANNOTATION], "team");
		assert_eq!(labels[INSTANCE_LABEL], PID);

		assert_eq!(pvc_storage(&fx.cluster), (40 * GB).to_string());
	}

	#[tokio::test]
	async fn provision_is_idempotent() {
		let fx = Fixture::new();
		let p = fx.provisioner();
		let cancel = CancellationToken::new();

		let first = p.provision(&cancel, &resource(), &opts(2, "v1", "")).await.unwrap();
		let generation = fx.deployment().metadata.generation;
		let second = p.provision(&cancel, &resource(), &opts(2, "v1", "")).await.unwrap();

		assert_eq!(first, second);
		assert_eq!(fx.cluster.object_count(), 5);
		assert_eq!(fx.deployment().metadata.generation, generation);
	}

	#[tokio::test]
	async fn pvc_is_never_shrunk() {
		let fx = Fixture::new();
		let p = fx.provisioner();
		let cancel = CancellationToken::new();

		p.provision(&cancel, &resource(), &opts(4, "v1", "")).await.unwrap();
		assert_eq!(pvc_storage(&fx.cluster), (160 * GB).to_string());

		let out = p.provision(&cancel, &resource(), &opts(1, "v1", "")).await.unwrap();
		assert_eq!(pvc_storage(&fx.cluster), (160 * GB).to_string());
		// The reported config still reflects the requested size.
		assert_eq!(out.runtime_config().unwrap().storage_bytes, 40 * GB);
	}

	fn live_pvc(storage: &str) -> ManifestObject {
		ManifestObject::PersistentVolumeClaim(PersistentVolumeClaim {
			metadata: ObjectMeta {
				name: Some(format!("runtime-{PID}")),
				..Default::default()
			},
			spec: Some(PersistentVolumeClaimSpec {
				resources: Some(VolumeResourceRequirements {
					requests: Some(BTreeMap::from([(
						"storage".to_string(),
						Quantity(storage.into()),
					)])),
					..Default::default()
				}),
				..Default::default()
			}),
			status: None,
		})
	}

	#[tokio::test]
	async fn pvc_grows_and_respects_suffixed_live_requests() {
		let fx = Fixture::new();
		fx.cluster.insert(NS, live_pvc("100Gi"));
		let p = fx.provisioner();
		let cancel = CancellationToken::new();

		p.provision(&cancel, &resource(), &opts(2, "v1", "")).await.unwrap();
		assert_eq!(pvc_storage(&fx.cluster), "100Gi");

		p.provision(&cancel, &resource(), &opts(3, "v1", "")).await.unwrap();
		assert_eq!(pvc_storage(&fx.cluster), (120 * GB).to_string());
	}

	#[tokio::test]
	async fn pvc_keeps_exponent_live_requests() {
		let fx = Fixture::new();
		fx.cluster.insert(NS, live_pvc("1e12"));
		let p = fx.provisioner();
		let cancel = CancellationToken::new();

		p.provision(&cancel, &resource(), &opts(2, "v1", "")).await.unwrap();
		assert_eq!(pvc_storage(&fx.cluster), "1e12");
	}

	#[tokio::test]
	async fn pvc_keeps_unparseable_live_requests() {
		let fx = Fixture::new();
		fx.cluster.insert(NS, live_pvc("lots"));
		let p = fx.provisioner();
		let cancel = CancellationToken::new();

		p.provision(&cancel, &resource(), &opts(1, "v1", "")).await.unwrap();
		assert_eq!(pvc_storage(&fx.cluster), "lots");
	}

	#[tokio::test]
	async fn failed_apply_aborts_without_rollback() {
		let fx = Fixture::new();
		fx.cluster.fail_apply(ObjectKind::Service, "admission webhook denied");
		let p = fx.provisioner();

		let err = p
			.provision(&CancellationToken::new(), &resource(), &opts(1, "v1", ""))
			.await
			.unwrap_err();
		match &err {
			ProvisionerError::Cluster {
				operation,
				resource_id,
				..
			} => {
				assert_eq!(operation, &format!("apply Service runtime-{PID}"));
				assert_eq!(resource_id, ID);
			}
			other => panic!("unexpected error {other}"),
		}
		assert!(err.to_string().contains("admission webhook denied"));

		// PVC and Deployment stay; nothing after the Service was attempted.
		assert_eq!(fx.cluster.object_count(), 2);
		assert_eq!(fx.cluster.writes().len(), 3);
	}

	#[tokio::test]
	async fn invalid_args_write_nothing() {
		let fx = Fixture::new();
		let p = fx.provisioner();
		let err = p
			.provision(&CancellationToken::new(), &resource(), &opts(0, "v1", ""))
			.await
			.unwrap_err();
		assert!(matches!(err, ProvisionerError::InvalidArgs { .. }));
		assert!(fx.cluster.ops().is_empty());
	}

	#[tokio::test]
	async fn oversized_slot_request_writes_nothing() {
		let fx = Fixture::new();
		let p = fx.provisioner();
		let err = p
			.provision(&CancellationToken::new(), &resource(), &opts(1_500_000_000, "v1", ""))
			.await
			.unwrap_err();
		assert!(matches!(err, ProvisionerError::InvalidArgs { .. }));
		assert!(fx.cluster.ops().is_empty());
	}

	#[tokio::test]
	async fn deprovision_deletes_in_reverse_order_and_is_idempotent() {
		let fx = Fixture::new();
		let p = fx.provisioner();
		let cancel = CancellationToken::new();
		p.provision(&cancel, &resource(), &opts(1, "v1", "")).await.unwrap();
		fx.cluster.clear_ops();

		p.deprovision(&cancel, &resource()).await.unwrap();
		let deletes: Vec<(ObjectKind, String)> = fx
			.cluster
			.writes()
			.into_iter()
			.map(|op| match op {
				ClusterOp::Delete { kind, name } => (kind, name),
				other => panic!("unexpected op {other:?}"),
			})
			.collect();
		assert_eq!(
			deletes,
			vec![
				(ObjectKind::Ingress, format!("http-runtime-{PID}")),
				(ObjectKind::Ingress, format!("grpc-runtime-{PID}")),
				(ObjectKind::Service, format!("runtime-{PID}")),
				(ObjectKind::Deployment, format!("runtime-{PID}")),
				(ObjectKind::PersistentVolumeClaim, format!("runtime-{PID}")),
			]
		);
		assert_eq!(fx.cluster.object_count(), 0);

		p.deprovision(&cancel, &resource()).await.unwrap();
	}

	#[tokio::test]
	async fn deprovision_attempts_every_delete_and_combines_errors() {
		let fx = Fixture::new();
		let p = fx.provisioner();
		let cancel = CancellationToken::new();
		p.provision(&cancel, &resource(), &opts(1, "v1", "")).await.unwrap();
		fx.cluster.clear_ops();
		fx.cluster.fail_delete(ObjectKind::Ingress, "etcd timeout");
		fx.cluster.fail_delete(ObjectKind::PersistentVolumeClaim, "finalizer stuck");

		let err = p.deprovision(&cancel, &resource()).await.unwrap_err();
		match &err {
			ProvisionerError::Multiple(errors) => assert_eq!(errors.len(), 3),
			other => panic!("unexpected error {other}"),
		}
		assert!(err.to_string().contains("finalizer stuck"));
		assert_eq!(fx.cluster.writes().len(), 5);
		assert!(fx.cluster.deployment(NS, &format!("runtime-{PID}")).is_none());
	}

	#[tokio::test(start_paused = true)]
	async fn await_ready_times_out_not_before_deadline() {
		let fx = Fixture::new();
		let p = fx
			.provisioner_for("https://*.runtime.example.com", 5)
			.with_poll_interval(Duration::from_secs(1));
		let cancel = CancellationToken::new();
		p.provision(&cancel, &resource(), &opts(1, "v1", "")).await.unwrap();
		fx.cluster
			.set_deployment_status(NS, &format!("runtime-{PID}"), 1, 0);

		let start = Instant::now();
		let err = p.await_ready(&cancel, &resource()).await.unwrap_err();
		let elapsed = start.elapsed();

		assert!(matches!(
			err,
			ProvisionerError::ReadinessTimeout {
				timeout_secs: 5,
				..
			}
		));
		assert!(err.is_retryable());
		assert!(elapsed >= Duration::from_secs(5), "{elapsed:?}");
		assert!(elapsed < Duration::from_secs(7), "{elapsed:?}");
	}

	#[tokio::test(start_paused = true)]
	async fn await_ready_requires_observed_generation() {
		let fx = Fixture::new();
		let p = fx.provisioner_for("https://*.runtime.example.com", 3);
		let cancel = CancellationToken::new();
		p.provision(&cancel, &resource(), &opts(1, "v1", "")).await.unwrap();
		fx.cluster.mark_deployment_ready(NS, &format!("runtime-{PID}"));

		// A spec change bumps the generation past the observed one.
		p.provision(&cancel, &resource(), &opts(2, "v1", "")).await.unwrap();
		let err = p.await_ready(&cancel, &resource()).await.unwrap_err();
		assert!(matches!(err, ProvisionerError::ReadinessTimeout { .. }));
	}

	#[tokio::test(start_paused = true)]
	async fn await_ready_stops_on_cancel() {
		let fx = Fixture::new();
		let p = fx.provisioner_for("https://*.runtime.example.com", 600);
		let cancel = CancellationToken::new();
		p.provision(&cancel, &resource(), &opts(1, "v1", "")).await.unwrap();

		let trigger = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_secs(2)).await;
			trigger.cancel();
		});

		let start = Instant::now();
		let err = p.await_ready(&cancel, &resource()).await.unwrap_err();
		assert!(matches!(err, ProvisionerError::Cancelled));
		assert!(start.elapsed() < Duration::from_secs(600));
	}

	#[tokio::test]
	async fn await_ready_probes_health_endpoint() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/v1/ping"))
			.respond_with(ResponseTemplate::new(502))
			.up_to_n_times(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/v1/ping"))
			.respond_with(ResponseTemplate::new(200))
			.mount(&server)
			.await;

		let fx = Fixture::new();
		let p = fx.provisioner_for(&server.uri(), 5);
		let cancel = CancellationToken::new();
		let r = p.provision(&cancel, &resource(), &opts(1, "v1", "")).await.unwrap();
		fx.cluster.mark_deployment_ready(NS, &format!("runtime-{PID}"));

		p.await_ready(&cancel, &r).await.unwrap();
	}

	#[tokio::test]
	async fn await_ready_reports_persistent_probe_failure() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/v1/ping"))
			.respond_with(ResponseTemplate::new(503))
			.mount(&server)
			.await;

		let fx = Fixture::new();
		let p = fx.provisioner_for(&server.uri(), 5);
		let cancel = CancellationToken::new();
		let r = p.provision(&cancel, &resource(), &opts(1, "v1", "")).await.unwrap();
		fx.cluster.mark_deployment_ready(NS, &format!("runtime-{PID}"));

		let err = p.await_ready(&cancel, &r).await.unwrap_err();
		match err {
			ProvisionerError::HealthProbe { url, message } => {
				assert_eq!(url, format!("{}/v1/ping", server.uri()));
				assert!(message.contains("after 3 attempts"), "{message}");
			}
			other => panic!("unexpected error {other}"),
		}
	}

	#[tokio::test]
	async fn check_resource_without_drift_writes_nothing() {
		let server = MockServer::start().await;
		let fx = Fixture::new();
		let p = fx.provisioner_for(&server.uri(), 5);
		let cancel = CancellationToken::new();
		let o = opts(1, "v1.0.0", "team");
		let r = p.provision(&cancel, &resource(), &o).await.unwrap();
		let generation = fx.deployment().metadata.generation;
		fx.cluster.clear_ops();

		let checked = p.check_resource(&cancel, &r, &o).await.unwrap();
		assert_eq!(checked, r);
		assert!(fx.cluster.writes().is_empty());
		assert_eq!(fx.deployment().metadata.generation, generation);
	}

	#[tokio::test]
	async fn pinned_version_reconciles_against_platform_release() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/v1/ping"))
			.respond_with(ResponseTemplate::new(200))
			.mount(&server)
			.await;

		let fx = Fixture::new();
		let p = fx.provisioner_for(&server.uri(), 5);
		let cancel = CancellationToken::new();
		let mut o = opts(1, "v1.0.0", "team");
		o.args = json!({ "slots": 1, "version": "v0.9.4" });
		let r = p.provision(&cancel, &resource(), &o).await.unwrap();
		let ready = keep_ready(fx.cluster.clone());
		fx.cluster.clear_ops();

		let checked = p.check_resource(&cancel, &r, &o).await.unwrap();
		assert_eq!(fx.cluster.writes().len(), 5);
		assert_eq!(
			checked.state,
			ResourceState::Kubernetes(RuntimeState {
				slots: 1,
				version: "v0.9.4".into()
			})
		);
		ready.abort();
	}

	#[tokio::test]
	async fn check_resource_reprovisions_on_drift() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/v1/ping"))
			.respond_with(ResponseTemplate::new(200))
			.mount(&server)
			.await;

		let fx = Fixture::new();
		let p = fx.provisioner_for(&server.uri(), 5);
		let cancel = CancellationToken::new();
		let r = p
			.provision(&cancel, &resource(), &opts(1, "v1.0.0", "team"))
			.await
			.unwrap();
		let ready = keep_ready(fx.cluster.clone());

		// Billing plan change.
		fx.cluster.clear_ops();
		let r = p
			.check_resource(&cancel, &r, &opts(1, "v1.0.0", "enterprise"))
			.await
			.unwrap();
		assert_eq!(fx.cluster.writes().len(), 5);
		assert_eq!(
			fx.deployment().metadata.annotations.unwrap()[BILLING_PLAN_ANNOTATION],
			"enterprise"
		);

		// Platform upgrade.
		fx.cluster.clear_ops();
		let r = p
			.check_resource(&cancel, &r, &opts(1, "v1.1.0", "enterprise"))
			.await
			.unwrap();
		assert_eq!(fx.cluster.writes().len(), 5);
		assert_eq!(
			r.state,
			ResourceState::Kubernetes(RuntimeState {
				slots: 1,
				version: "v1.1.0".into()
			})
		);
		ready.abort();
	}

	#[tokio::test]
	async fn check_resource_recreates_missing_deployment() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/v1/ping"))
			.respond_with(ResponseTemplate::new(200))
			.mount(&server)
			.await;

		let fx = Fixture::new();
		let p = fx.provisioner_for(&server.uri(), 5);
		let ready = keep_ready(fx.cluster.clone());

		let r = p
			.check_resource(&CancellationToken::new(), &resource(), &opts(2, "v1", ""))
			.await
			.unwrap();
		assert_eq!(fx.cluster.object_count(), 5);
		assert!(matches!(r.state, ResourceState::Kubernetes(RuntimeState { slots: 2, .. })));
		ready.abort();
	}

	#[tokio::test]
	async fn check_resource_detects_template_changes() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/v1/ping"))
			.respond_with(ResponseTemplate::new(200))
			.mount(&server)
			.await;

		let fx = Fixture::new();
		let cancel = CancellationToken::new();
		let o = opts(1, "v1", "");
		let r = fx
			.provisioner_for(&server.uri(), 5)
			.provision(&cancel, &resource(), &o)
			.await
			.unwrap();
		let ready = keep_ready(fx.cluster.clone());

		std::fs::write(&fx.paths.service, format!("{SERVICE}# revised\n")).unwrap();
		let updated = fx.provisioner_for(&server.uri(), 5);
		fx.cluster.clear_ops();
		updated.check_resource(&cancel, &r, &o).await.unwrap();

		assert_eq!(fx.cluster.writes().len(), 5);
		assert_eq!(
			fx.deployment().metadata.annotations.unwrap()[CHECKSUM_ANNOTATION],
			updated.templates_checksum()
		);
		ready.abort();
	}

	#[tokio::test]
	async fn check_resource_propagates_api_errors() {
		struct Broken;

		#[async_trait]
		impl ClusterClient for Broken {
			async fn apply(&self, _: &str, _: &ManifestObject, _: &str) -> std::result::Result<(), K8sError> {
				unreachable!()
			}
			async fn delete(&self, _: &str, _: ObjectKind, _: &str) -> std::result::Result<(), K8sError> {
				unreachable!()
			}
			async fn get_deployment(&self, _: &str, _: &str) -> std::result::Result<Deployment, K8sError> {
				Err(K8sError::ApiError {
					message: "forbidden".into(),
				})
			}
			async fn get_pvc(&self, _: &str, _: &str) -> std::result::Result<PersistentVolumeClaim, K8sError> {
				unreachable!()
			}
		}

		let fx = Fixture::new();
		let p = KubernetesProvisioner::new(fx.spec("https://*.example.com", 5), Arc::new(Broken)).unwrap();
		let err = p
			.check_resource(&CancellationToken::new(), &resource(), &opts(1, "v1", ""))
			.await
			.unwrap_err();
		assert!(matches!(err, ProvisionerError::Cluster { ref operation, .. } if operation == "get deployment"));
	}

	#[tokio::test]
	async fn cancelled_provision_stops_before_writing() {
		let fx = Fixture::new();
		let p = fx.provisioner();
		let cancel = CancellationToken::new();
		cancel.cancel();
		let err = p.provision(&cancel, &resource(), &opts(1, "v1", "")).await.unwrap_err();
		assert!(matches!(err, ProvisionerError::Cancelled));
		assert!(fx.cluster.writes().is_empty());
	}

	#[test]
	fn bad_template_fails_construction() {
		let fx = Fixture::new();
		std::fs::write(&fx.paths.pvc, "storage: {{ env }}").unwrap();
		let err = KubernetesProvisioner::new(fx.spec("https://*.example.com", 5), fx.cluster.clone())
			.err()
			.unwrap();
		assert!(matches!(err, ProvisionerError::Template { ref template, .. } if template == "pvc"));
	}
}
