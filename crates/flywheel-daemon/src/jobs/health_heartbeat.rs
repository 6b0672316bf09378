// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use flywheel_db::{HealthCheckRepository, HealthStatus, RunOutcome, RunRepository};
use flywheel_jobs::{Job, JobContext, JobError, JobOutput};

/// Publishes a scheduler liveness row into health history.
///
/// A fresh row is itself the signal: it proves the scheduler is still
/// executing work. The status summarizes the latest outcome per job so
/// dashboards reading `health_checks` see failures without joining
/// `job_runs`.
pub struct HealthHeartbeatJob {
	runs: RunRepository,
	checks: HealthCheckRepository,
}

impl HealthHeartbeatJob {
	pub fn new(runs: RunRepository, checks: HealthCheckRepository) -> Self {
		Self { runs, checks }
	}
}

#[async_trait]
impl Job for HealthHeartbeatJob {
	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		if ctx.is_cancelled() {
			return Err(JobError::Cancelled);
		}

		let latest = self.runs.latest_run_per_job().await?;
		let failing = latest
			.values()
			.filter(|run| run.outcome == Some(RunOutcome::Failure))
			.count();
		let status = if failing > 0 {
			HealthStatus::Degraded
		} else {
			HealthStatus::Ok
		};

		let message = format!("{} jobs tracked, {} failing", latest.len(), failing);
		self.checks
			.record("scheduler", status, Some(&message))
			.await?;

		Ok(JobOutput::new(message))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use flywheel_db::testing::create_store_test_pool;
	use flywheel_db::MetricRepository;
	use flywheel_jobs::CancellationToken;
	use std::sync::Arc;

	fn context(pool: &sqlx::SqlitePool) -> JobContext {
		JobContext::new(
			"health-heartbeat",
			1,
			CancellationToken::new(),
			Arc::new(MetricRepository::new(pool.clone())),
		)
	}

	#[tokio::test]
	async fn test_heartbeat_records_ok_when_nothing_fails() {
		let pool = create_store_test_pool().await;
		let runs = RunRepository::new(pool.clone());
		let checks = HealthCheckRepository::new(pool.clone());

		let id = runs.record_run_start("ingest", Utc::now()).await.unwrap();
		runs
			.record_run_end(id, RunOutcome::Success, None, None)
			.await
			.unwrap();

		let job = HealthHeartbeatJob::new(runs, checks.clone());
		let output = job.run(&context(&pool)).await.unwrap();
		assert_eq!(output.message, "1 jobs tracked, 0 failing");

		let recent = checks
			.recent_since(Utc::now() - chrono::Duration::minutes(1))
			.await
			.unwrap();
		assert_eq!(recent.len(), 1);
		assert_eq!(recent[0].component, "scheduler");
		assert_eq!(recent[0].status, HealthStatus::Ok);
	}

	#[tokio::test]
	async fn test_heartbeat_reports_failing_jobs() {
		let pool = create_store_test_pool().await;
		let runs = RunRepository::new(pool.clone());
		let checks = HealthCheckRepository::new(pool.clone());

		let id = runs.record_run_start("upload", Utc::now()).await.unwrap();
		runs
			.record_run_end(id, RunOutcome::Failure, Some("boom".to_string()), None)
			.await
			.unwrap();

		let job = HealthHeartbeatJob::new(runs, checks.clone());
		job.run(&context(&pool)).await.unwrap();

		let recent = checks
			.recent_since(Utc::now() - chrono::Duration::minutes(1))
			.await
			.unwrap();
		assert_eq!(recent[0].status, HealthStatus::Degraded);
		assert_eq!(
			recent[0].message.as_deref(),
			Some("1 jobs tracked, 1 failing")
		);
	}
}
