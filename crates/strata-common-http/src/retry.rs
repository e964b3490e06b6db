// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Retry logic with exponential backoff that honours cancellation.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryConfig {
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub backoff_factor: f64,
	pub jitter: bool,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_millis(200),
			max_delay: Duration::from_secs(5),
			backoff_factor: 2.0,
			jitter: true,
		}
	}
}

pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

/// Why a retried operation gave up.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E: std::error::Error + 'static> {
	#[error("cancelled")]
	Cancelled,

	#[error("{source} (after {attempts} attempts)")]
	Failed {
		attempts: u32,
		#[source]
		source: E,
	},
}

fn calculate_delay(cfg: &RetryConfig, attempt: u32) -> Duration {
	let exponential_delay = cfg.base_delay.as_secs_f64() * cfg.backoff_factor.powi(attempt as i32);
	let capped_delay = exponential_delay.min(cfg.max_delay.as_secs_f64());

	let final_delay = if cfg.jitter {
		let jitter_factor = 0.5 + fastrand::f64();
		capped_delay * jitter_factor
	} else {
		capped_delay
	};

	Duration::from_secs_f64(final_delay)
}

/// Run `f` until it succeeds, fails permanently, runs out of attempts, or
/// `cancel` fires. Both in-flight attempts and backoff sleeps observe `cancel`.
pub async fn retry<F, Fut, T, E>(
	cfg: &RetryConfig,
	cancel: &CancellationToken,
	mut f: F,
) -> Result<T, RetryError<E>>
where
	F: FnMut() -> Fut,
	Fut: std::future::Future<Output = Result<T, E>>,
	E: RetryableError + std::error::Error + 'static,
{
	let mut attempt = 0;

	loop {
		let outcome = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(RetryError::Cancelled),
			outcome = f() => outcome,
		};

		match outcome {
			Ok(result) => return Ok(result),
			Err(err) => {
				attempt += 1;

				if !err.is_retryable() {
					warn!(error = %err, attempt, "non-retryable error encountered");
					return Err(RetryError::Failed {
						attempts: attempt,
						source: err,
					});
				}

				if attempt >= cfg.max_attempts {
					warn!(
						error = %err,
						attempt,
						max_attempts = cfg.max_attempts,
						"max retry attempts exhausted"
					);
					return Err(RetryError::Failed {
						attempts: attempt,
						source: err,
					});
				}

				let delay = calculate_delay(cfg, attempt - 1);
				warn!(
					error = %err,
					attempt,
					max_attempts = cfg.max_attempts,
					delay_ms = delay.as_millis() as u64,
					"retrying after error"
				);

				tokio::select! {
					biased;
					_ = cancel.cancelled() => return Err(RetryError::Cancelled),
					_ = tokio::time::sleep(delay) => {}
				}
			}
		}
	}
}
