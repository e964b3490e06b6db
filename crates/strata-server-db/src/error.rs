// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use strata_provisioner_core::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	#[error("Internal: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<DbError> for StoreError {
	fn from(err: DbError) -> Self {
		match err {
			DbError::Sqlx(sqlx::Error::PoolTimedOut) | DbError::Sqlx(sqlx::Error::PoolClosed) => {
				StoreError::Unavailable(err.to_string())
			}
			other => StoreError::Query(Box::new(other)),
		}
	}
}
