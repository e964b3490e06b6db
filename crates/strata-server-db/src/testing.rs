// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::capacity::StaticRuntimeRepository;

/// A single-connection in-memory pool; every connection to `:memory:` is its own database.
pub async fn create_test_pool() -> SqlitePool {
	let options = SqliteConnectOptions::from_str(":memory:").unwrap();
	SqlitePoolOptions::new()
		.max_connections(1)
		.connect_with(options)
		.await
		.expect("Failed to create test pool")
}

/// A repository over a fresh in-memory database with the schema in place.
pub async fn create_test_repository() -> StaticRuntimeRepository {
	let repo = StaticRuntimeRepository::new(create_test_pool().await);
	repo.ensure_schema().await.unwrap();
	repo
}
