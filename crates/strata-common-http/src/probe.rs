// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Health probing for freshly started services.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::retry::{retry, RetryConfig, RetryError, RetryableError};

/// Path every runtime serves once it accepts traffic.
pub const HEALTH_PATH: &str = "/v1/ping";

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
	#[error("request failed: {0}")]
	Request(#[from] reqwest::Error),

	#[error("unhealthy status {0}")]
	Status(StatusCode),
}

/// Routing for a new service can lag behind its pods, so every failure is
/// worth another attempt.
impl RetryableError for ProbeError {
	fn is_retryable(&self) -> bool {
		true
	}
}

/// Backoff for the post-readiness probe: roughly 45 seconds end to end.
pub fn default_probe_config() -> RetryConfig {
	RetryConfig {
		max_attempts: 6,
		base_delay: Duration::from_secs(2),
		max_delay: Duration::from_secs(10),
		backoff_factor: 2.0,
		jitter: true,
	}
}

/// `<host>/v1/ping`, tolerating a trailing slash on `host`.
pub fn health_url(host: &str) -> String {
	format!("{}{}", host.trim_end_matches('/'), HEALTH_PATH)
}

/// GET `url` until it answers 2xx.
pub async fn probe_health(
	client: &Client,
	url: &str,
	cfg: &RetryConfig,
	cancel: &CancellationToken,
) -> Result<(), RetryError<ProbeError>> {
	retry(cfg, cancel, || async {
		let response = client.get(url).send().await?;
		let status = response.status();
		debug!(url, status = status.as_u16(), "health probe response");
		if status.is_success() {
			Ok(())
		} else {
			Err(ProbeError::Status(status))
		}
	})
	.await
}
