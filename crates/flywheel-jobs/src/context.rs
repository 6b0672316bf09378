// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use flywheel_db::{DbError, MetricRepository};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::JobError;

/// Execution context handed to a unit of work.
pub struct JobContext {
	pub job_name: String,
	pub run_id: i64,
	pub cancellation_token: CancellationToken,
	metrics: MetricRecorder,
}

impl JobContext {
	/// Build a context for a run outside the scheduler, e.g. to exercise a
	/// job implementation directly in tests.
	pub fn new(
		job_name: impl Into<String>,
		run_id: i64,
		cancellation_token: CancellationToken,
		metrics: Arc<MetricRepository>,
	) -> Self {
		let job_name = job_name.into();
		let recorder = MetricRecorder::new(metrics, &job_name, run_id);
		Self::with_recorder(job_name, run_id, cancellation_token, recorder)
	}

	pub(crate) fn with_recorder(
		job_name: String,
		run_id: i64,
		cancellation_token: CancellationToken,
		metrics: MetricRecorder,
	) -> Self {
		Self {
			job_name,
			run_id,
			cancellation_token,
			metrics,
		}
	}

	/// Persist a numeric metric immediately.
	///
	/// Each sample is written in its own transaction, so metrics recorded
	/// before a run fails are not rolled back with it. The sample is also
	/// attached to the run record when the run completes.
	pub async fn record_metric(&self, name: &str, value: f64) -> std::result::Result<(), JobError> {
		self.metrics.record(name, value).await?;
		Ok(())
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancellation_token.is_cancelled()
	}
}

/// Broadcast cancellation signal tied to process shutdown.
#[derive(Clone)]
pub struct CancellationToken {
	cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
	pub fn new() -> Self {
		Self {
			cancelled: Arc::new(AtomicBool::new(false)),
		}
	}

	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::SeqCst)
	}
}

impl Default for CancellationToken {
	fn default() -> Self {
		Self::new()
	}
}

/// Writes metric samples tagged with the owning run and accumulates them for
/// the run's completion record.
#[derive(Clone)]
pub(crate) struct MetricRecorder {
	repository: Arc<MetricRepository>,
	job_name: String,
	run_id: i64,
	collected: Arc<Mutex<serde_json::Map<String, serde_json::Value>>>,
}

impl MetricRecorder {
	pub(crate) fn new(repository: Arc<MetricRepository>, job_name: &str, run_id: i64) -> Self {
		Self {
			repository,
			job_name: job_name.to_string(),
			run_id,
			collected: Arc::new(Mutex::new(serde_json::Map::new())),
		}
	}

	pub(crate) async fn record(&self, name: &str, value: f64) -> std::result::Result<(), DbError> {
		let tags = serde_json::json!({ "job": self.job_name, "run_id": self.run_id });
		self.repository.record(name, value, Some(&tags)).await?;

		let mut collected = self.collected.lock().await;
		collected.insert(name.to_string(), serde_json::Value::from(value));
		Ok(())
	}

	/// The accumulated name → value map, or `None` if nothing was recorded.
	pub(crate) async fn collected(&self) -> Option<serde_json::Value> {
		let collected = self.collected.lock().await;
		if collected.is_empty() {
			None
		} else {
			Some(serde_json::Value::Object(collected.clone()))
		}
	}
}
