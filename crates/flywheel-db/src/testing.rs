// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Test pool constructors shared by this crate and the scheduler tests.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::pool::init_schema;

/// In-memory pool pinned to a single connection.
///
/// SQLite `:memory:` databases are per-connection, so the pool must not open
/// a second one.
pub async fn create_test_pool() -> SqlitePool {
	SqlitePoolOptions::new()
		.max_connections(1)
		.connect(":memory:")
		.await
		.unwrap()
}

/// In-memory pool with the full Flywheel schema applied.
pub async fn create_store_test_pool() -> SqlitePool {
	let pool = create_test_pool().await;
	init_schema(&pool).await.unwrap();
	pool
}
