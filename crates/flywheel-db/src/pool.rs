// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};
use std::str::FromStr;

use crate::error::DbError;

/// Create a SqlitePool with WAL mode and common settings.
///
/// WAL keeps readers off the writers' exclusive path, which is what lets the
/// operational query surface run concurrently with the live scheduler.
///
/// # Arguments
/// * `database_url` - SQLite connection string (e.g., "sqlite:./flywheel.db")
///
/// # Errors
/// Returns `DbError::Internal` if the URL is invalid or connection fails.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, DbError> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| DbError::Internal(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.create_if_missing(true);

	let pool = SqlitePool::connect_with(options).await?;

	tracing::debug!("database pool created");
	Ok(pool)
}

/// Ensure the Flywheel schema exists.
///
/// Idempotent; safe to run on every startup before the scheduler accepts work.
#[tracing::instrument(skip(pool))]
pub async fn init_schema(pool: &SqlitePool) -> Result<(), DbError> {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS job_runs (
			id INTEGER PRIMARY KEY AUTOINCREMENT,
			job_name TEXT NOT NULL,
			started_at TEXT NOT NULL,
			ended_at TEXT,
			outcome TEXT,
			error_detail TEXT,
			duration_ms INTEGER,
			metrics TEXT
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_runs_job_name ON job_runs(job_name)")
		.execute(pool)
		.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_runs_started_at ON job_runs(started_at)")
		.execute(pool)
		.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS health_checks (
			id INTEGER PRIMARY KEY AUTOINCREMENT,
			component TEXT NOT NULL,
			status TEXT NOT NULL,
			message TEXT,
			observed_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query("CREATE INDEX IF NOT EXISTS idx_health_checks_component ON health_checks(component)")
		.execute(pool)
		.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS metrics (
			id INTEGER PRIMARY KEY AUTOINCREMENT,
			recorded_at TEXT NOT NULL,
			name TEXT NOT NULL,
			value REAL NOT NULL,
			tags TEXT
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query("CREATE INDEX IF NOT EXISTS idx_metrics_name ON metrics(name)")
		.execute(pool)
		.await?;

	tracing::debug!("database schema ensured");
	Ok(())
}
