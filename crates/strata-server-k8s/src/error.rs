// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Result type alias for cluster operations.
pub type K8sResult<T> = Result<T, K8sError>;

/// Errors that can occur during cluster operations.
#[derive(Error, Debug)]
pub enum K8sError {
	#[error("K8s API error: {message}")]
	ApiError { message: String },

	#[error("{kind} not found: {name}")]
	NotFound { kind: String, name: String },

	#[error("K8s client configuration error: {message}")]
	Config { message: String },

	#[error("Failed to encode {kind} {name}: {message}")]
	Serialization {
		kind: String,
		name: String,
		message: String,
	},
}

impl K8sError {
	pub fn is_not_found(&self) -> bool {
		matches!(self, K8sError::NotFound { .. })
	}
}

impl From<kube::Error> for K8sError {
	fn from(err: kube::Error) -> Self {
		K8sError::ApiError {
			message: err.to_string(),
		}
	}
}
