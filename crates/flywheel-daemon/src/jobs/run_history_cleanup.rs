// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use flywheel_db::RunRepository;
use flywheel_jobs::{Job, JobContext, JobError, JobOutput};

pub struct RunHistoryCleanupJob {
	runs: RunRepository,
	retention_days: u32,
}

impl RunHistoryCleanupJob {
	pub fn new(runs: RunRepository, retention_days: u32) -> Self {
		Self {
			runs,
			retention_days,
		}
	}
}

#[async_trait]
impl Job for RunHistoryCleanupJob {
	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		if ctx.is_cancelled() {
			return Err(JobError::Cancelled);
		}

		let deleted = self.runs.cleanup_old_runs(self.retention_days).await?;
		ctx.record_metric("runs_deleted", deleted as f64).await?;

		tracing::info!(
			deleted,
			retention_days = self.retention_days,
			"run history cleanup completed"
		);
		Ok(JobOutput::new(format!(
			"Cleaned up {deleted} old job run records"
		)))
	}
}
