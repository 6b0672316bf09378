// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Job run history: one row per execution attempt, append-only except for the
//! single completion update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::error::{DbError, Result};

/// Terminal outcome of a job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
	Success,
	Failure,
	SkippedOverlap,
}

impl RunOutcome {
	pub fn as_str(&self) -> &'static str {
		match self {
			RunOutcome::Success => "success",
			RunOutcome::Failure => "failure",
			RunOutcome::SkippedOverlap => "skipped_overlap",
		}
	}
}

impl std::str::FromStr for RunOutcome {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"success" => Ok(RunOutcome::Success),
			"failure" => Ok(RunOutcome::Failure),
			"skipped_overlap" => Ok(RunOutcome::SkippedOverlap),
			_ => Err(format!("unknown run outcome: {s}")),
		}
	}
}

/// One persisted execution attempt.
///
/// `outcome` is `None` while the run is in flight; a row whose `ended_at` is
/// null after a restart is an orphan and is reconciled to `Failure`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
	pub id: i64,
	pub job_name: String,
	pub started_at: DateTime<Utc>,
	pub ended_at: Option<DateTime<Utc>>,
	pub outcome: Option<RunOutcome>,
	pub error_detail: Option<String>,
	pub duration_ms: Option<i64>,
	pub metrics: Option<serde_json::Value>,
}

type RunRow = (
	i64,
	String,
	DateTime<Utc>,
	Option<DateTime<Utc>>,
	Option<String>,
	Option<String>,
	Option<i64>,
	Option<String>,
);

fn run_from_row(row: RunRow) -> Result<JobRun> {
	let (id, job_name, started_at, ended_at, outcome, error_detail, duration_ms, metrics) = row;
	Ok(JobRun {
		id,
		job_name,
		started_at,
		ended_at,
		outcome: outcome
			.as_deref()
			.map(|s| s.parse().map_err(DbError::Internal))
			.transpose()?,
		error_detail,
		duration_ms,
		metrics: metrics.as_deref().and_then(|s| serde_json::from_str(s).ok()),
	})
}

const RUN_COLUMNS: &str =
	"id, job_name, started_at, ended_at, outcome, error_detail, duration_ms, metrics";

#[derive(Clone)]
pub struct RunRepository {
	pool: SqlitePool,
}

impl RunRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Insert the start record for a run and return its id.
	///
	/// Ids come from the autoincrement rowid, so they are strictly increasing
	/// in admission order.
	#[tracing::instrument(skip(self))]
	pub async fn record_run_start(
		&self,
		job_name: &str,
		started_at: DateTime<Utc>,
	) -> Result<i64> {
		let result = sqlx::query("INSERT INTO job_runs (job_name, started_at) VALUES (?, ?)")
			.bind(job_name)
			.bind(started_at)
			.execute(&self.pool)
			.await?;

		Ok(result.last_insert_rowid())
	}

	/// Write the terminal state of a run. Called exactly once per run.
	#[tracing::instrument(skip(self, metrics))]
	pub async fn record_run_end(
		&self,
		run_id: i64,
		outcome: RunOutcome,
		error_detail: Option<String>,
		metrics: Option<serde_json::Value>,
	) -> Result<()> {
		let now = Utc::now();
		let metrics_str = metrics.map(|m| m.to_string());

		let result = sqlx::query(
			r#"
			UPDATE job_runs
			SET ended_at = ?,
			    duration_ms = CAST((julianday(?) - julianday(started_at)) * 86400000 AS INTEGER),
			    outcome = ?,
			    error_detail = ?,
			    metrics = ?
			WHERE id = ?
			"#,
		)
		.bind(now)
		.bind(now)
		.bind(outcome.as_str())
		.bind(error_detail)
		.bind(metrics_str)
		.bind(run_id)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("run {run_id}")));
		}

		Ok(())
	}

	/// Record an attempt that was blocked by the concurrency guard.
	///
	/// The row is inserted already terminal (`ended_at = started_at`) in a
	/// single statement, so a guarded job never has two open rows at once.
	#[tracing::instrument(skip(self))]
	pub async fn record_skipped(&self, job_name: &str, at: DateTime<Utc>) -> Result<i64> {
		let result = sqlx::query(
			r#"
			INSERT INTO job_runs (job_name, started_at, ended_at, outcome, duration_ms)
			VALUES (?, ?, ?, ?, 0)
			"#,
		)
		.bind(job_name)
		.bind(at)
		.bind(at)
		.bind(RunOutcome::SkippedOverlap.as_str())
		.execute(&self.pool)
		.await?;

		Ok(result.last_insert_rowid())
	}

	/// Fetch a single run by id.
	#[tracing::instrument(skip(self))]
	pub async fn get_run(&self, run_id: i64) -> Result<Option<JobRun>> {
		let row = sqlx::query_as::<_, RunRow>(&format!(
			"SELECT {RUN_COLUMNS} FROM job_runs WHERE id = ?"
		))
		.bind(run_id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(run_from_row).transpose()
	}

	/// The most recent runs for a job, newest first.
	#[tracing::instrument(skip(self))]
	pub async fn list_recent_runs(&self, job_name: &str, limit: u32) -> Result<Vec<JobRun>> {
		let rows = sqlx::query_as::<_, RunRow>(&format!(
			"SELECT {RUN_COLUMNS} FROM job_runs WHERE job_name = ? ORDER BY id DESC LIMIT ?"
		))
		.bind(job_name)
		.bind(limit as i64)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(run_from_row).collect()
	}

	/// The latest run for every job that has ever run.
	#[tracing::instrument(skip(self))]
	pub async fn latest_run_per_job(&self) -> Result<HashMap<String, JobRun>> {
		let rows = sqlx::query_as::<_, RunRow>(&format!(
			r#"
			SELECT {RUN_COLUMNS} FROM job_runs
			WHERE id IN (SELECT MAX(id) FROM job_runs GROUP BY job_name)
			"#
		))
		.fetch_all(&self.pool)
		.await?;

		rows
			.into_iter()
			.map(|row| run_from_row(row).map(|run| (run.job_name.clone(), run)))
			.collect()
	}

	/// The latest successful run for every job that has ever succeeded.
	#[tracing::instrument(skip(self))]
	pub async fn latest_success_per_job(&self) -> Result<HashMap<String, JobRun>> {
		let rows = sqlx::query_as::<_, RunRow>(&format!(
			r#"
			SELECT {RUN_COLUMNS} FROM job_runs
			WHERE id IN (
				SELECT MAX(id) FROM job_runs WHERE outcome = 'success' GROUP BY job_name
			)
			"#
		))
		.fetch_all(&self.pool)
		.await?;

		rows
			.into_iter()
			.map(|row| run_from_row(row).map(|run| (run.job_name.clone(), run)))
			.collect()
	}

	/// Convert runs left open by an abnormal shutdown to terminal failures.
	///
	/// Must complete before the scheduler admits new work, so a resumed job
	/// cannot race its own orphaned record. Returns the number of rows
	/// reconciled. `duration_ms` is left null: the wall time of an
	/// interrupted run is unknowable.
	#[tracing::instrument(skip(self))]
	pub async fn reconcile_orphaned_runs(&self) -> Result<u64> {
		let now = Utc::now();
		let result = sqlx::query(
			r#"
			UPDATE job_runs
			SET ended_at = ?,
			    outcome = ?,
			    error_detail = ?
			WHERE ended_at IS NULL
			"#,
		)
		.bind(now)
		.bind(RunOutcome::Failure.as_str())
		.bind("interrupted by restart")
		.execute(&self.pool)
		.await?;

		let reconciled = result.rows_affected();
		if reconciled > 0 {
			tracing::warn!(reconciled, "marked orphaned runs as failed");
		}
		Ok(reconciled)
	}

	/// Delete terminal runs older than the cutoff. Open runs are never
	/// deleted.
	#[tracing::instrument(skip(self))]
	pub async fn delete_old_runs(&self, before: DateTime<Utc>) -> Result<u64> {
		let result =
			sqlx::query("DELETE FROM job_runs WHERE ended_at IS NOT NULL AND ended_at < ?")
				.bind(before)
				.execute(&self.pool)
				.await?;

		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self))]
	pub async fn cleanup_old_runs(&self, retention_days: u32) -> Result<u64> {
		let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
		self.delete_old_runs(cutoff).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_store_test_pool;

	#[tokio::test]
	async fn test_record_start_and_end() {
		let pool = create_store_test_pool().await;
		let repo = RunRepository::new(pool);

		let started = Utc::now();
		let run_id = repo.record_run_start("ingest", started).await.unwrap();

		let open = repo.get_run(run_id).await.unwrap().unwrap();
		assert_eq!(open.job_name, "ingest");
		assert!(open.ended_at.is_none());
		assert!(open.outcome.is_none());

		repo
			.record_run_end(run_id, RunOutcome::Success, None, None)
			.await
			.unwrap();

		let done = repo.get_run(run_id).await.unwrap().unwrap();
		assert_eq!(done.outcome, Some(RunOutcome::Success));
		let ended = done.ended_at.unwrap();
		assert!(ended >= done.started_at);
	}

	#[tokio::test]
	async fn test_record_end_unknown_run() {
		let pool = create_store_test_pool().await;
		let repo = RunRepository::new(pool);

		let result = repo
			.record_run_end(999, RunOutcome::Success, None, None)
			.await;
		assert!(matches!(result, Err(DbError::NotFound(_))));
	}

	#[tokio::test]
	async fn test_run_ids_strictly_increase() {
		let pool = create_store_test_pool().await;
		let repo = RunRepository::new(pool);

		let mut last = 0;
		for _ in 0..5 {
			let id = repo.record_run_start("ingest", Utc::now()).await.unwrap();
			assert!(id > last);
			last = id;
		}
	}

	#[tokio::test]
	async fn test_record_failure_with_detail_and_metrics() {
		let pool = create_store_test_pool().await;
		let repo = RunRepository::new(pool);

		let run_id = repo.record_run_start("upload", Utc::now()).await.unwrap();
		repo
			.record_run_end(
				run_id,
				RunOutcome::Failure,
				Some("platform rejected the post".to_string()),
				Some(serde_json::json!({"posts_attempted": 3.0})),
			)
			.await
			.unwrap();

		let run = repo.get_run(run_id).await.unwrap().unwrap();
		assert_eq!(run.outcome, Some(RunOutcome::Failure));
		assert_eq!(
			run.error_detail.as_deref(),
			Some("platform rejected the post")
		);
		assert_eq!(
			run.metrics,
			Some(serde_json::json!({"posts_attempted": 3.0}))
		);
	}

	#[tokio::test]
	async fn test_record_skipped_is_terminal_immediately() {
		let pool = create_store_test_pool().await;
		let repo = RunRepository::new(pool);

		let at = Utc::now();
		let id = repo.record_skipped("upload", at).await.unwrap();

		let run = repo.get_run(id).await.unwrap().unwrap();
		assert_eq!(run.outcome, Some(RunOutcome::SkippedOverlap));
		assert_eq!(run.ended_at, Some(run.started_at));
		assert_eq!(run.duration_ms, Some(0));
	}

	#[tokio::test]
	async fn test_list_recent_runs_newest_first() {
		let pool = create_store_test_pool().await;
		let repo = RunRepository::new(pool);

		for _ in 0..3 {
			let id = repo.record_run_start("ingest", Utc::now()).await.unwrap();
			repo
				.record_run_end(id, RunOutcome::Success, None, None)
				.await
				.unwrap();
		}
		repo.record_run_start("other", Utc::now()).await.unwrap();

		let runs = repo.list_recent_runs("ingest", 2).await.unwrap();
		assert_eq!(runs.len(), 2);
		assert!(runs[0].id > runs[1].id);
		assert!(runs.iter().all(|r| r.job_name == "ingest"));
	}

	#[tokio::test]
	async fn test_latest_run_per_job() {
		let pool = create_store_test_pool().await;
		let repo = RunRepository::new(pool);

		let first = repo.record_run_start("ingest", Utc::now()).await.unwrap();
		repo
			.record_run_end(first, RunOutcome::Failure, Some("boom".to_string()), None)
			.await
			.unwrap();
		let second = repo.record_run_start("ingest", Utc::now()).await.unwrap();
		let other = repo.record_run_start("analytics", Utc::now()).await.unwrap();

		let latest = repo.latest_run_per_job().await.unwrap();
		assert_eq!(latest.len(), 2);
		assert_eq!(latest["ingest"].id, second);
		assert_eq!(latest["analytics"].id, other);
	}

	#[tokio::test]
	async fn test_latest_success_per_job_skips_failures() {
		let pool = create_store_test_pool().await;
		let repo = RunRepository::new(pool);

		let ok = repo.record_run_start("ingest", Utc::now()).await.unwrap();
		repo
			.record_run_end(ok, RunOutcome::Success, None, None)
			.await
			.unwrap();
		let failed = repo.record_run_start("ingest", Utc::now()).await.unwrap();
		repo
			.record_run_end(failed, RunOutcome::Failure, Some("boom".to_string()), None)
			.await
			.unwrap();

		let latest_ok = repo.latest_success_per_job().await.unwrap();
		assert_eq!(latest_ok["ingest"].id, ok);
	}

	#[tokio::test]
	async fn test_reconcile_orphaned_runs() {
		let pool = create_store_test_pool().await;
		let repo = RunRepository::new(pool);

		let orphan = repo.record_run_start("ingest", Utc::now()).await.unwrap();
		let done = repo.record_run_start("upload", Utc::now()).await.unwrap();
		repo
			.record_run_end(done, RunOutcome::Success, None, None)
			.await
			.unwrap();

		let reconciled = repo.reconcile_orphaned_runs().await.unwrap();
		assert_eq!(reconciled, 1);

		let run = repo.get_run(orphan).await.unwrap().unwrap();
		assert_eq!(run.outcome, Some(RunOutcome::Failure));
		assert_eq!(run.error_detail.as_deref(), Some("interrupted by restart"));
		assert!(run.ended_at.unwrap() >= run.started_at);

		// The completed run is untouched.
		let run = repo.get_run(done).await.unwrap().unwrap();
		assert_eq!(run.outcome, Some(RunOutcome::Success));

		// No open rows remain.
		assert_eq!(repo.reconcile_orphaned_runs().await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_cleanup_preserves_open_runs() {
		let pool = create_store_test_pool().await;
		let repo = RunRepository::new(pool.clone());

		let old = repo
			.record_run_start("ingest", Utc::now() - chrono::Duration::days(30))
			.await
			.unwrap();
		repo
			.record_run_end(old, RunOutcome::Success, None, None)
			.await
			.unwrap();
		sqlx::query("UPDATE job_runs SET ended_at = ? WHERE id = ?")
			.bind(Utc::now() - chrono::Duration::days(30))
			.bind(old)
			.execute(&pool)
			.await
			.unwrap();

		let open = repo.record_run_start("ingest", Utc::now()).await.unwrap();

		let deleted = repo.cleanup_old_runs(7).await.unwrap();
		assert_eq!(deleted, 1);
		assert!(repo.get_run(old).await.unwrap().is_none());
		assert!(repo.get_run(open).await.unwrap().is_some());
	}
}
