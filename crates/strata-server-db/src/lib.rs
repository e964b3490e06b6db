// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Database layer for Strata provisioning.

pub mod capacity;
pub mod error;
pub mod pool;
pub mod testing;

pub use capacity::StaticRuntimeRepository;
pub use error::{DbError, Result};
pub use pool::create_pool;
