// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The clock-driven engine: a fixed tick evaluates due jobs, each admitted
//! job runs as its own task behind a per-job exclusive guard, and every
//! attempt is recorded durably whatever its outcome.

use chrono::{DateTime, Utc};
use flywheel_db::{HealthCheckRepository, HealthStatus, MetricRepository, RunOutcome, RunRepository};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::context::{CancellationToken, JobContext, MetricRecorder};
use crate::error::JobError;
use crate::job::Job;
use crate::registry::{JobDefinition, JobRegistry};

/// Per-job execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
	Idle,
	Due,
	Running,
}

/// One slot per registered job: the concurrency guard plus its state tag.
struct JobSlot {
	guard: Arc<Mutex<()>>,
	state: Arc<Mutex<SlotState>>,
}

impl JobSlot {
	fn new() -> Self {
		Self {
			guard: Arc::new(Mutex::new(())),
			state: Arc::new(Mutex::new(SlotState::Idle)),
		}
	}
}

pub struct Scheduler {
	registry: Arc<Mutex<JobRegistry>>,
	slots: HashMap<String, JobSlot>,
	runs: Arc<RunRepository>,
	metrics: Arc<MetricRepository>,
	checks: Arc<HealthCheckRepository>,
	tick_interval: Duration,
	handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
	pub(crate) fn new(
		registry: JobRegistry,
		runs: Arc<RunRepository>,
		metrics: Arc<MetricRepository>,
		checks: Arc<HealthCheckRepository>,
		tick_interval: Duration,
	) -> Self {
		let slots = registry
			.job_names()
			.into_iter()
			.map(|name| (name, JobSlot::new()))
			.collect();

		Self {
			registry: Arc::new(Mutex::new(registry)),
			slots,
			runs,
			metrics,
			checks,
			tick_interval,
			handles: Mutex::new(Vec::new()),
		}
	}

	pub(crate) fn registry(&self) -> &Arc<Mutex<JobRegistry>> {
		&self.registry
	}

	pub(crate) async fn is_running(&self, job_name: &str) -> bool {
		match self.slots.get(job_name) {
			Some(slot) => *slot.state.lock().await == SlotState::Running,
			None => false,
		}
	}

	/// Spawn the tick loop. It evaluates due jobs every `tick_interval` until
	/// the shutdown broadcast fires.
	pub(crate) fn spawn_tick_loop(
		self: Arc<Self>,
		mut shutdown_rx: broadcast::Receiver<()>,
		cancel: CancellationToken,
	) -> JoinHandle<()> {
		let scheduler = self;
		tokio::spawn(async move {
			let mut tick = tokio::time::interval(scheduler.tick_interval);
			loop {
				tokio::select! {
					_ = tick.tick() => {
						scheduler.evaluate_due(Utc::now(), &cancel).await;
						scheduler.prune_finished().await;
					}
					_ = shutdown_rx.recv() => {
						info!("tick loop stopped");
						break;
					}
				}
			}
		})
	}

	/// One tick: admit every job the registry reports due.
	async fn evaluate_due(&self, now: DateTime<Utc>, cancel: &CancellationToken) {
		let due = {
			let mut registry = self.registry.lock().await;
			let names = registry.list_due(now);
			let mut due = Vec::with_capacity(names.len());
			for name in names {
				registry.mark_scheduled(&name, now);
				if let Some(admission) = registry.admission(&name) {
					due.push(admission);
				}
			}
			due
		};

		for (definition, runnable) in due {
			self.admit(definition, runnable, now, cancel.clone()).await;
		}
	}

	/// Admit one due job: acquire its guard or record a skipped attempt.
	async fn admit(
		&self,
		definition: JobDefinition,
		runnable: Arc<dyn Job>,
		now: DateTime<Utc>,
		cancel: CancellationToken,
	) {
		let slot = match self.slots.get(&definition.name) {
			Some(slot) => slot,
			None => return,
		};

		let permit = if definition.guarded {
			match Arc::clone(&slot.guard).try_lock_owned() {
				Ok(permit) => Some(permit),
				Err(_) => {
					// Guard held by an in-flight run: record the blocked
					// attempt without touching the guard.
					warn!(job = %definition.name, "skipped overlapping run");
					let runs = Arc::clone(&self.runs);
					let name = definition.name.clone();
					let handle = tokio::spawn(async move {
						if let Err(e) = runs.record_skipped(&name, now).await {
							error!(job = %name, error = %e, "failed to record skipped run");
						}
					});
					self.handles.lock().await.push(handle);
					return;
				}
			}
		} else {
			None
		};

		*slot.state.lock().await = SlotState::Due;

		let state = Arc::clone(&slot.state);
		let runs = Arc::clone(&self.runs);
		let metrics = Arc::clone(&self.metrics);
		let checks = Arc::clone(&self.checks);
		let handle = tokio::spawn(run_job(
			definition, runnable, permit, state, runs, metrics, checks, cancel,
		));
		self.handles.lock().await.push(handle);
	}

	async fn prune_finished(&self) {
		self.handles.lock().await.retain(|handle| !handle.is_finished());
	}

	pub(crate) async fn drain_handles(&self) -> Vec<JoinHandle<()>> {
		self.handles.lock().await.drain(..).collect()
	}
}

/// Execute one tracked run of a job.
///
/// The start record is written before the work begins, the end record exactly
/// once afterwards, and the guard (when held) is released by dropping
/// `_permit` on every exit path, including a failing store write.
async fn run_job(
	definition: JobDefinition,
	runnable: Arc<dyn Job>,
	permit: Option<OwnedMutexGuard<()>>,
	state: Arc<Mutex<SlotState>>,
	runs: Arc<RunRepository>,
	metrics: Arc<MetricRepository>,
	checks: Arc<HealthCheckRepository>,
	cancel: CancellationToken,
) {
	let _permit = permit;
	let job_name = definition.name;

	let started_at = Utc::now();
	let run_id = match runs.record_run_start(&job_name, started_at).await {
		Ok(id) => id,
		Err(e) => {
			// No run record, no execution: the run must exist before work
			// begins.
			error!(job = %job_name, error = %e, "failed to open run record, skipping execution");
			*state.lock().await = SlotState::Idle;
			return;
		}
	};

	*state.lock().await = SlotState::Running;

	let recorder = MetricRecorder::new(metrics, &job_name, run_id);
	let ctx = JobContext::with_recorder(job_name.clone(), run_id, cancel, recorder.clone());

	let (outcome, error_detail) = match runnable.run(&ctx).await {
		Ok(output) => {
			info!(job = %job_name, run_id, message = %output.message, "job completed");
			(RunOutcome::Success, None)
		}
		Err(JobError::Cancelled) => {
			info!(job = %job_name, run_id, "job cancelled by shutdown");
			(
				RunOutcome::Failure,
				Some("cancelled by shutdown".to_string()),
			)
		}
		Err(e) => {
			warn!(job = %job_name, run_id, error = %e, "job failed");
			(RunOutcome::Failure, Some(e.to_string()))
		}
	};

	if let Err(e) = runs
		.record_run_end(run_id, outcome, error_detail.clone(), recorder.collected().await)
		.await
	{
		// The guard is still released below; a store outage must not wedge
		// future runs of this job.
		error!(job = %job_name, run_id, error = %e, "failed to record run end");
	}

	// Mirror the outcome into health history, so dashboards reading
	// health_checks see per-job liveness without joining job_runs.
	let (check_status, check_message) = match &error_detail {
		None => (
			HealthStatus::Ok,
			format!("{}ms", (Utc::now() - started_at).num_milliseconds()),
		),
		Some(detail) => (HealthStatus::Degraded, detail.clone()),
	};
	if let Err(e) = checks
		.record(&format!("job:{job_name}"), check_status, Some(&check_message))
		.await
	{
		warn!(job = %job_name, run_id, error = %e, "failed to record job health");
	}

	*state.lock().await = SlotState::Idle;
}
