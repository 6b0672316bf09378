// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Point-in-time health snapshots derived from run history and live
//! scheduler state. Pure read/compute: calling it twice with no intervening
//! runs yields identical results.

use chrono::{DateTime, Utc};
use flywheel_db::{HealthCheckRepository, HealthStatus, RunOutcome, RunRepository};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::scheduler::Scheduler;

/// Classification thresholds. Configuration values, not hardcoded constants.
#[derive(Debug, Clone)]
pub struct HealthThresholds {
	/// Persisted health checks older than this are ignored.
	pub staleness: chrono::Duration,
	/// A critical job with no success within `multiplier ×` its own nominal
	/// interval marks the system down.
	pub missed_interval_multiplier: u32,
}

impl Default for HealthThresholds {
	fn default() -> Self {
		Self {
			staleness: chrono::Duration::seconds(300),
			missed_interval_multiplier: 3,
		}
	}
}

/// Liveness summary for one registered job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobHealth {
	pub name: String,
	pub last_outcome: Option<RunOutcome>,
	pub last_run_at: Option<DateTime<Utc>>,
	pub next_run_at: Option<DateTime<Utc>>,
	pub running: bool,
}

/// Derived snapshot of per-job and overall system liveness. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
	pub status: HealthStatus,
	pub scheduler_running: bool,
	pub total_jobs: usize,
	pub jobs: Vec<JobHealth>,
}

pub struct HealthAggregator {
	runs: Arc<RunRepository>,
	checks: Arc<HealthCheckRepository>,
	scheduler: Arc<Scheduler>,
	running: Arc<AtomicBool>,
	thresholds: HealthThresholds,
	/// Stands in for "last success" for jobs that have not run yet, so a
	/// freshly started process is not instantly down.
	baseline: DateTime<Utc>,
}

impl HealthAggregator {
	pub(crate) fn new(
		runs: Arc<RunRepository>,
		checks: Arc<HealthCheckRepository>,
		scheduler: Arc<Scheduler>,
		running: Arc<AtomicBool>,
		thresholds: HealthThresholds,
	) -> Self {
		Self {
			runs,
			checks,
			scheduler,
			running,
			thresholds,
			baseline: Utc::now(),
		}
	}

	pub async fn snapshot(&self) -> Result<HealthSnapshot> {
		let latest = self.runs.latest_run_per_job().await?;
		let latest_success = self.runs.latest_success_per_job().await?;
		let now = Utc::now();
		let recent_checks = self
			.checks
			.recent_since(now - self.thresholds.staleness)
			.await?;

		let definitions: Vec<_> = {
			let registry = self.scheduler.registry().lock().await;
			registry
				.definitions()
				.map(|definition| (definition.clone(), registry.next_run(&definition.name)))
				.collect()
		};

		let mut status = HealthStatus::Ok;
		let mut jobs = Vec::with_capacity(definitions.len());
		for (definition, next_run_at) in definitions {
			let last = latest.get(&definition.name);
			let last_success = latest_success.get(&definition.name);
			let running = self.scheduler.is_running(&definition.name).await;

			if definition.critical {
				let window = definition
					.cadence
					.nominal_interval(now)
					.and_then(|interval| {
						interval.checked_mul(self.thresholds.missed_interval_multiplier)
					})
					.and_then(|window| chrono::Duration::from_std(window).ok());
				if let Some(window) = window {
					let reference = last_success
						.map(|run| run.started_at)
						.unwrap_or(self.baseline);
					if now - reference > window {
						status = status.worst(HealthStatus::Down);
					}
				}
			}

			// A job whose most recent run failed degrades the system; the
			// critical rule above escalates persistent misses to down.
			if last.and_then(|run| run.outcome) == Some(RunOutcome::Failure) {
				status = status.worst(HealthStatus::Degraded);
			}

			jobs.push(JobHealth {
				name: definition.name.clone(),
				last_outcome: last.and_then(|run| run.outcome),
				last_run_at: last.map(|run| run.started_at),
				next_run_at,
				running,
			});
		}

		// Overlay fresh externally reported checks.
		for check in recent_checks {
			status = status.worst(check.status);
		}

		Ok(HealthSnapshot {
			status,
			scheduler_running: self.running.load(Ordering::SeqCst),
			total_jobs: jobs.len(),
			jobs,
		})
	}
}
