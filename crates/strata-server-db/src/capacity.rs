// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Static runtime slot assignments.
//!
//! One row per resource placed on a static host. The static provisioner reads
//! per-host sums through [`CapacityStore`]; the caller writes a row after a
//! successful placement and removes it on teardown.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use strata_provisioner_core::{CapacityStore, SlotsUsed, StoreError};

use crate::error::DbError;

/// Repository for static runtime slot assignments.
#[derive(Clone)]
pub struct StaticRuntimeRepository {
	pool: SqlitePool,
}

impl StaticRuntimeRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self))]
	pub async fn ensure_schema(&self) -> Result<(), DbError> {
		sqlx::query(
			r#"
			CREATE TABLE IF NOT EXISTS static_runtime_assignments (
				resource_id TEXT PRIMARY KEY,
				host TEXT NOT NULL,
				slots INTEGER NOT NULL CHECK (slots > 0),
				created_at TEXT NOT NULL DEFAULT (datetime('now')),
				updated_at TEXT NOT NULL DEFAULT (datetime('now'))
			)
			"#,
		)
		.execute(&self.pool)
		.await?;

		sqlx::query(
			"CREATE INDEX IF NOT EXISTS idx_static_runtime_assignments_host
			 ON static_runtime_assignments (host)",
		)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	/// Record that `resource_id` uses `slots` on `host`. Zero slots removes the row.
	#[tracing::instrument(skip(self), fields(%resource_id, %host))]
	pub async fn upsert_assignment(
		&self,
		resource_id: &str,
		host: &str,
		slots: i64,
	) -> Result<(), DbError> {
		if slots < 0 {
			return Err(DbError::InvalidArgument(format!(
				"slots must not be negative, got {slots}"
			)));
		}
		if slots == 0 {
			self.delete_assignment(resource_id).await?;
			return Ok(());
		}

		sqlx::query(
			"INSERT INTO static_runtime_assignments (resource_id, host, slots)
			 VALUES (?, ?, ?)
			 ON CONFLICT (resource_id) DO UPDATE SET
			   host = excluded.host,
			   slots = excluded.slots,
			   updated_at = datetime('now')",
		)
		.bind(resource_id)
		.bind(host)
		.bind(slots)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	/// Remove a resource's assignment. Returns the number of rows removed.
	#[tracing::instrument(skip(self), fields(%resource_id))]
	pub async fn delete_assignment(&self, resource_id: &str) -> Result<u64, DbError> {
		let result = sqlx::query("DELETE FROM static_runtime_assignments WHERE resource_id = ?")
			.bind(resource_id)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	/// Sum of assigned slots per host, ordered by host.
	#[tracing::instrument(skip(self))]
	pub async fn slots_used(&self) -> Result<Vec<SlotsUsed>, DbError> {
		let rows: Vec<(String, i64)> = sqlx::query_as(
			"SELECT host, SUM(slots) FROM static_runtime_assignments GROUP BY host ORDER BY host",
		)
		.fetch_all(&self.pool)
		.await?;

		Ok(
			rows
				.into_iter()
				.map(|(host, slots)| SlotsUsed { host, slots })
				.collect(),
		)
	}
}

#[async_trait]
impl CapacityStore for StaticRuntimeRepository {
	async fn resolve_slots_used(&self) -> Result<Vec<SlotsUsed>, StoreError> {
		Ok(self.slots_used().await?)
	}
}
