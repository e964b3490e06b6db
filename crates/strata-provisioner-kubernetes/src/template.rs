// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Manifest templates.
//!
//! Templates are YAML with `{{ key }}` placeholders. Values come only from
//! [`TemplateData`]; a placeholder naming anything else fails when the
//! template set is loaded. `{{ key | quote }}` emits the value as a quoted
//! scalar. `{{ annotations }}` expands to every caller annotation as a flow
//! mapping, for use under `labels:` or `annotations:`.
//!
//! Unquoted values must fit on one line; multi-line values need `| quote`.

use std::collections::{BTreeMap, HashMap};

use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use strata_provisioner_core::{ProvisionerError, Result};

use crate::names::ResourceNames;
use crate::spec::{TemplateKind, TemplatePaths};

const SCALAR_KEYS: &[&str] = &[
	"image",
	"image_tag",
	"provision_id",
	"host",
	"cpu",
	"memory_gb",
	"storage_bytes",
	"slots",
	"environment",
];

const NAME_KEYS: &[&str] = &["http_ingress", "grpc_ingress", "service", "deployment", "pvc"];

const ANNOTATIONS_MAP: &str = "annotations";
const ANNOTATIONS_PREFIX: &str = "annotations.";
const NAMES_PREFIX: &str = "names.";

/// Values available to manifest templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateData {
	pub image: String,
	pub image_tag: String,
	pub provision_id: String,
	/// Public host without scheme.
	pub host: String,
	pub cpu: u32,
	pub memory_gb: u32,
	pub storage_bytes: u64,
	pub slots: u32,
	pub names: ResourceNames,
	pub annotations: BTreeMap<String, String>,
	pub environment: String,
}

impl TemplateData {
	fn lookup(&self, key: &str) -> Option<String> {
		if let Some(annotation) = key.strip_prefix(ANNOTATIONS_PREFIX) {
			return Some(self.annotations.get(annotation).cloned().unwrap_or_default());
		}
		if let Some(name) = key.strip_prefix(NAMES_PREFIX) {
			return match name {
				"http_ingress" => Some(self.names.http_ingress.clone()),
				"grpc_ingress" => Some(self.names.grpc_ingress.clone()),
				"service" => Some(self.names.service.clone()),
				"deployment" => Some(self.names.deployment.clone()),
				"pvc" => Some(self.names.pvc.clone()),
				_ => None,
			};
		}
		match key {
			"image" => Some(self.image.clone()),
			"image_tag" => Some(self.image_tag.clone()),
			"provision_id" => Some(self.provision_id.clone()),
			"host" => Some(self.host.clone()),
			"cpu" => Some(self.cpu.to_string()),
			"memory_gb" => Some(self.memory_gb.to_string()),
			"storage_bytes" => Some(self.storage_bytes.to_string()),
			"slots" => Some(self.slots.to_string()),
			"environment" => Some(self.environment.clone()),
			_ => None,
		}
	}
}

fn is_known_key(key: &str) -> bool {
	if key == ANNOTATIONS_MAP {
		return true;
	}
	if let Some(annotation) = key.strip_prefix(ANNOTATIONS_PREFIX) {
		return !annotation.is_empty();
	}
	if let Some(name) = key.strip_prefix(NAMES_PREFIX) {
		return NAME_KEYS.contains(&name);
	}
	SCALAR_KEYS.contains(&key)
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
	Text(&'a str),
	Value { key: &'a str, quote: bool },
}

fn parse(source: &str) -> std::result::Result<Vec<Segment<'_>>, String> {
	let mut segments = Vec::new();
	let mut rest = source;

	while let Some(start) = rest.find("{{") {
		if start > 0 {
			segments.push(Segment::Text(&rest[..start]));
		}
		let after = &rest[start + 2..];
		let end = after
			.find("}}")
			.ok_or_else(|| "unclosed placeholder".to_string())?;
		let inner = after[..end].trim();

		let mut parts = inner.split('|').map(str::trim);
		let key = parts.next().unwrap_or_default();
		if key.is_empty() {
			return Err("empty placeholder".to_string());
		}
		let mut quote = false;
		for filter in parts {
			match filter {
				"quote" => quote = true,
				other => return Err(format!("unknown filter {other:?} on {key:?}")),
			}
		}
		segments.push(Segment::Value { key, quote });
		rest = &after[end + 2..];
	}

	if !rest.is_empty() {
		segments.push(Segment::Text(rest));
	}
	Ok(segments)
}

/// The five manifest templates and the checksum of their sources.
#[derive(Debug, Clone)]
pub struct TemplateSet {
	sources: HashMap<TemplateKind, String>,
	checksum: String,
}

impl TemplateSet {
	/// Read every template from disk and validate its placeholders.
	pub fn load(paths: &TemplatePaths) -> Result<Self> {
		let mut sources = Vec::with_capacity(TemplateKind::ALL.len());
		for kind in TemplateKind::ALL {
			let path = paths.path(kind);
			let source = std::fs::read_to_string(path).map_err(|e| ProvisionerError::Template {
				template: kind.to_string(),
				message: format!("failed to read {}: {e}", path.display()),
			})?;
			sources.push((kind, source));
		}
		Self::from_sources(sources)
	}

	/// Build a set from in-memory sources. Every kind must be present.
	pub fn from_sources(sources: impl IntoIterator<Item = (TemplateKind, String)>) -> Result<Self> {
		let sources: HashMap<TemplateKind, String> = sources.into_iter().collect();

		let mut hasher = Sha256::new();
		for kind in TemplateKind::ALL {
			let source = sources.get(&kind).ok_or_else(|| ProvisionerError::Template {
				template: kind.to_string(),
				message: "template is missing".to_string(),
			})?;

			let segments = parse(source).map_err(|message| ProvisionerError::Template {
				template: kind.to_string(),
				message,
			})?;
			for segment in segments {
				let Segment::Value { key, quote } = segment else {
					continue;
				};
				let message = if !is_known_key(key) {
					format!("unknown placeholder {key:?}")
				} else if key == ANNOTATIONS_MAP && quote {
					format!("{key:?} expands to a mapping and cannot be quoted")
				} else {
					continue;
				};
				return Err(ProvisionerError::Template {
					template: kind.to_string(),
					message,
				});
			}

			hasher.update(source.as_bytes());
		}

		Ok(Self {
			sources,
			checksum: hex::encode(hasher.finalize()),
		})
	}

	/// Hex sha256 over all template sources.
	pub fn checksum(&self) -> &str {
		&self.checksum
	}

	pub fn render(&self, kind: TemplateKind, data: &TemplateData) -> Result<String> {
		let template_error = |message: String| ProvisionerError::Template {
			template: kind.to_string(),
			message,
		};

		let source = self
			.sources
			.get(&kind)
			.ok_or_else(|| template_error("template is missing".to_string()))?;

		let mut out = String::with_capacity(source.len());
		for segment in parse(source).map_err(template_error)? {
			match segment {
				Segment::Text(text) => out.push_str(text),
				Segment::Value {
					key: ANNOTATIONS_MAP,
					..
				} => {
					let map = serde_json::to_string(&data.annotations)
						.map_err(|e| template_error(format!("failed to expand annotations: {e}")))?;
					out.push_str(&map);
				}
				Segment::Value { key, quote } => {
					let value = data
						.lookup(key)
						.ok_or_else(|| template_error(format!("unknown placeholder {key:?}")))?;
					if quote {
						let quoted = serde_json::to_string(&value)
							.map_err(|e| template_error(format!("failed to quote {key:?}: {e}")))?;
						out.push_str(&quoted);
					} else if value.chars().any(char::is_control) {
						return Err(template_error(format!(
							"value for {key:?} contains control characters; use `| quote`"
						)));
					} else {
						out.push_str(&value);
					}
				}
			}
		}
		Ok(out)
	}

	/// Render a template and decode it into a typed object.
	pub fn render_as<T: DeserializeOwned>(&self, kind: TemplateKind, data: &TemplateData) -> Result<T> {
		let rendered = self.render(kind, data)?;
		serde_yaml::from_str(&rendered).map_err(|e| ProvisionerError::Template {
			template: kind.to_string(),
			message: format!("failed to decode rendered manifest: {e}"),
		})
	}
}
