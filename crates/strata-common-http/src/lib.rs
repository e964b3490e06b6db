// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Common HTTP utilities for Strata.
//!
//! This crate provides:
//! - A shared HTTP client builder with a consistent User-Agent header
//! - Retry logic with exponential backoff that observes cancellation
//! - Health probing for services that have just become ready

pub mod client;
pub mod probe;
pub mod retry;

pub use client::{builder, user_agent};
pub use probe::{default_probe_config, health_url, probe_health, ProbeError, HEALTH_PATH};
pub use retry::{retry, RetryConfig, RetryError, RetryableError};
