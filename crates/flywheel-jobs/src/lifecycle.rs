// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process-wide start/stop semantics.
//!
//! A `Lifecycle` instance owns its own state; there is no global "is the
//! scheduler running" flag. Start reconciles orphaned runs before the tick
//! loop admits work; stop ties signal-driven shutdown to in-flight run
//! completion, bounded by a grace period.

use flywheel_db::{HealthCheckRepository, HealthStatus, MetricRepository, RunRepository};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::CancellationToken;
use crate::error::{Result, SchedulerError};
use crate::health::{HealthAggregator, HealthSnapshot, HealthThresholds};
use crate::registry::JobRegistry;
use crate::scheduler::Scheduler;

enum LifecycleState {
	Idle,
	Running {
		shutdown_tx: broadcast::Sender<()>,
		cancel: CancellationToken,
		tick: JoinHandle<()>,
	},
}

pub struct Lifecycle {
	scheduler: Arc<Scheduler>,
	aggregator: HealthAggregator,
	runs: Arc<RunRepository>,
	checks: Arc<HealthCheckRepository>,
	running: Arc<AtomicBool>,
	state: Mutex<LifecycleState>,
}

impl Lifecycle {
	pub fn new(
		registry: JobRegistry,
		pool: SqlitePool,
		tick_interval: Duration,
		thresholds: HealthThresholds,
	) -> Self {
		let runs = Arc::new(RunRepository::new(pool.clone()));
		let metrics = Arc::new(MetricRepository::new(pool.clone()));
		let checks = Arc::new(HealthCheckRepository::new(pool));

		let scheduler = Arc::new(Scheduler::new(
			registry,
			Arc::clone(&runs),
			metrics,
			Arc::clone(&checks),
			tick_interval,
		));
		let running = Arc::new(AtomicBool::new(false));
		let aggregator = HealthAggregator::new(
			Arc::clone(&runs),
			Arc::clone(&checks),
			Arc::clone(&scheduler),
			Arc::clone(&running),
			thresholds,
		);

		Self {
			scheduler,
			aggregator,
			runs,
			checks,
			running,
			state: Mutex::new(LifecycleState::Idle),
		}
	}

	/// Reconcile orphaned runs, restore cadence bookkeeping from history,
	/// then start the tick loop.
	pub async fn start(&self) -> Result<()> {
		let mut state = self.state.lock().await;
		if matches!(*state, LifecycleState::Running { .. }) {
			return Err(SchedulerError::AlreadyStarted);
		}

		// Runs before any new admission, so a resumed job cannot race its
		// own orphaned record.
		self.runs.reconcile_orphaned_runs().await?;

		let latest = self.runs.latest_run_per_job().await?;
		let registry = self.scheduler.registry();
		let job_count = {
			let mut registry = registry.lock().await;
			registry.seed_last_runs(&latest);
			registry.len()
		};

		let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
		let cancel = CancellationToken::new();
		let tick = Arc::clone(&self.scheduler).spawn_tick_loop(shutdown_rx, cancel.clone());

		self.running.store(true, Ordering::SeqCst);
		*state = LifecycleState::Running {
			shutdown_tx,
			cancel,
			tick,
		};

		info!(jobs = job_count, "scheduler started");
		self
			.publish_scheduler_health(&format!("started with {job_count} jobs"))
			.await;
		Ok(())
	}

	/// Signal cancellation, halt the tick loop, and wait up to
	/// `grace_period` for in-flight runs to write their terminal records.
	///
	/// Runs still incomplete after the grace period are aborted and their
	/// open records are left for `reconcile_orphaned_runs` on the next start.
	pub async fn stop(&self, grace_period: Duration) {
		let mut state = self.state.lock().await;
		let (shutdown_tx, cancel, tick) =
			match std::mem::replace(&mut *state, LifecycleState::Idle) {
				LifecycleState::Running {
					shutdown_tx,
					cancel,
					tick,
				} => (shutdown_tx, cancel, tick),
				LifecycleState::Idle => {
					debug!("stop called while not running");
					return;
				}
			};

		cancel.cancel();
		let _ = shutdown_tx.send(());
		let _ = tick.await;

		let handles = self.scheduler.drain_handles().await;
		let in_flight = handles.len();
		let deadline = tokio::time::Instant::now() + grace_period;
		let mut abandoned = 0usize;
		for mut handle in handles {
			let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
			match tokio::time::timeout(remaining, &mut handle).await {
				Ok(_) => {}
				Err(_) => {
					handle.abort();
					abandoned += 1;
				}
			}
		}

		self.running.store(false, Ordering::SeqCst);
		if abandoned > 0 {
			info!(
				in_flight,
				abandoned, "scheduler stopped; abandoned runs await reconciliation"
			);
		} else {
			info!(in_flight, "scheduler stopped");
		}
		self.publish_scheduler_health("stopped").await;
	}

	/// Best-effort scheduler liveness row; a store hiccup here is logged, not
	/// propagated.
	async fn publish_scheduler_health(&self, message: &str) {
		if let Err(e) = self
			.checks
			.record("scheduler", HealthStatus::Ok, Some(message))
			.await
		{
			warn!(error = %e, "failed to record scheduler health");
		}
	}

	/// Side-effect-free health snapshot; callable at any time, including
	/// before `start` and after `stop`.
	pub async fn health_snapshot(&self) -> Result<HealthSnapshot> {
		self.aggregator.snapshot().await
	}
}
