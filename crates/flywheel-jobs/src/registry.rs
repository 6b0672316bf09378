// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The catalogue of registered jobs and their next-eligible-run bookkeeping.

use chrono::{DateTime, Utc};
use flywheel_db::JobRun;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::cadence::Cadence;
use crate::error::{Result, SchedulerError};
use crate::job::Job;

/// Static description of a recurring job. Immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct JobDefinition {
	pub name: String,
	pub description: String,
	pub cadence: Cadence,
	/// At-most-one-instance guard; overlapping triggers are recorded as
	/// skipped rather than run concurrently.
	pub guarded: bool,
	/// Critical jobs participate in the "down" health rule.
	pub critical: bool,
	/// Upper bound for random scheduling jitter, to desynchronize jobs that
	/// share a cadence.
	pub jitter: Option<Duration>,
}

impl JobDefinition {
	pub fn new(name: impl Into<String>, cadence: Cadence) -> Self {
		Self {
			name: name.into(),
			description: String::new(),
			cadence,
			guarded: true,
			critical: false,
			jitter: None,
		}
	}

	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = description.into();
		self
	}

	pub fn unguarded(mut self) -> Self {
		self.guarded = false;
		self
	}

	pub fn critical(mut self) -> Self {
		self.critical = true;
		self
	}

	pub fn with_jitter(mut self, bound: Duration) -> Self {
		self.jitter = Some(bound);
		self
	}
}

struct RegistryEntry {
	definition: JobDefinition,
	runnable: Arc<dyn Job>,
	/// `None` until the job is first scheduled or seeded: due immediately.
	next_eligible: Option<DateTime<Utc>>,
}

/// Named jobs keyed by their unique name.
///
/// Sorted storage keeps due evaluation and snapshots deterministic.
#[derive(Default)]
pub struct JobRegistry {
	entries: BTreeMap<String, RegistryEntry>,
}

impl JobRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a job. Fails if the name is already taken.
	pub fn register(&mut self, definition: JobDefinition, runnable: Arc<dyn Job>) -> Result<()> {
		let name = definition.name.clone();
		if self.entries.contains_key(&name) {
			return Err(SchedulerError::DuplicateJob(name));
		}

		tracing::info!(job = %name, cadence = ?definition.cadence, "registered job");
		self.entries.insert(
			name,
			RegistryEntry {
				definition,
				runnable,
				next_eligible: None,
			},
		);
		Ok(())
	}

	/// Names of all jobs due at `now`. A job that has never been scheduled is
	/// due immediately.
	pub fn list_due(&self, now: DateTime<Utc>) -> Vec<String> {
		self.entries
			.iter()
			.filter(|(_, entry)| entry.next_eligible.map_or(true, |at| now >= at))
			.map(|(name, _)| name.clone())
			.collect()
	}

	/// Advance a job's bookkeeping after it is admitted at `run_at`.
	pub fn mark_scheduled(&mut self, name: &str, run_at: DateTime<Utc>) {
		if let Some(entry) = self.entries.get_mut(name) {
			let mut next = entry
				.definition
				.cadence
				.next_after(run_at)
				.unwrap_or(DateTime::<Utc>::MAX_UTC);
			if let Some(bound) = entry.definition.jitter {
				let jitter_ms = fastrand::u64(0..=bound.as_millis() as u64);
				next = next + chrono::Duration::milliseconds(jitter_ms as i64);
			}
			entry.next_eligible = Some(next);
		}
	}

	/// Initialize bookkeeping from the last persisted run per job, so
	/// cadences survive a restart.
	pub fn seed_last_runs(&mut self, latest: &HashMap<String, JobRun>) {
		for (name, entry) in &mut self.entries {
			if let Some(run) = latest.get(name) {
				entry.next_eligible = entry.definition.cadence.next_after(run.started_at);
			}
		}
	}

	pub fn next_run(&self, name: &str) -> Option<DateTime<Utc>> {
		self.entries.get(name).and_then(|entry| entry.next_eligible)
	}

	/// Definition and runnable for a due job, cloned for the run task.
	pub(crate) fn admission(&self, name: &str) -> Option<(JobDefinition, Arc<dyn Job>)> {
		self.entries
			.get(name)
			.map(|entry| (entry.definition.clone(), Arc::clone(&entry.runnable)))
	}

	pub fn definitions(&self) -> impl Iterator<Item = &JobDefinition> {
		self.entries.values().map(|entry| &entry.definition)
	}

	pub fn job_names(&self) -> Vec<String> {
		self.entries.keys().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::context::JobContext;
	use crate::error::JobError;
	use crate::job::JobOutput;
	use async_trait::async_trait;
	use chrono::TimeZone;

	struct NoopJob;

	#[async_trait]
	impl Job for NoopJob {
		async fn run(&self, _ctx: &JobContext) -> std::result::Result<JobOutput, JobError> {
			Ok(JobOutput::new("noop"))
		}
	}

	fn minutes(m: u64) -> Duration {
		Duration::from_secs(m * 60)
	}

	fn at(minute: u32) -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2026, 1, 19, minute / 60, minute % 60, 0)
			.unwrap()
	}

	fn interval_definition(name: &str, every: Duration) -> JobDefinition {
		JobDefinition::new(name, Cadence::interval(every).unwrap())
	}

	#[test]
	fn test_register_duplicate_fails() {
		let mut registry = JobRegistry::new();
		registry
			.register(interval_definition("ingest", minutes(60)), Arc::new(NoopJob))
			.unwrap();

		let result = registry.register(interval_definition("ingest", minutes(5)), Arc::new(NoopJob));
		match result {
			Err(SchedulerError::DuplicateJob(name)) => assert_eq!(name, "ingest"),
			other => panic!("expected DuplicateJob, got {other:?}"),
		}
	}

	#[test]
	fn test_interval_due_computation() {
		// An hourly job admitted at t=0 is next due at t=61, not t=30,
		// regardless of how long the run itself took.
		let mut registry = JobRegistry::new();
		registry
			.register(interval_definition("ingest", minutes(60)), Arc::new(NoopJob))
			.unwrap();

		assert_eq!(registry.list_due(at(0)), vec!["ingest".to_string()]);

		registry.mark_scheduled("ingest", at(0));
		assert!(registry.list_due(at(30)).is_empty());
		assert_eq!(registry.list_due(at(61)), vec!["ingest".to_string()]);
	}

	#[test]
	fn test_cron_due_strictly_after_last_start() {
		let mut registry = JobRegistry::new();
		registry
			.register(
				JobDefinition::new("nightly-report", Cadence::cron("0 3 * * *").unwrap()),
				Arc::new(NoopJob),
			)
			.unwrap();

		let three_am = Utc.with_ymd_and_hms(2026, 1, 19, 3, 0, 0).unwrap();
		registry.mark_scheduled("nightly-report", three_am);

		assert!(registry.list_due(three_am).is_empty());
		let next_day = Utc.with_ymd_and_hms(2026, 1, 20, 3, 0, 0).unwrap();
		assert_eq!(
			registry.list_due(next_day),
			vec!["nightly-report".to_string()]
		);
	}

	#[test]
	fn test_jitter_stays_within_bound() {
		let mut registry = JobRegistry::new();
		registry
			.register(
				interval_definition("ingest", minutes(10)).with_jitter(Duration::from_secs(60)),
				Arc::new(NoopJob),
			)
			.unwrap();

		let base = at(0) + chrono::Duration::minutes(10);
		for _ in 0..50 {
			registry.mark_scheduled("ingest", at(0));
			let next = registry.next_run("ingest").unwrap();
			assert!(next >= base);
			assert!(next <= base + chrono::Duration::seconds(60));
		}
	}

	#[test]
	fn test_seed_last_runs_restores_cadence() {
		let mut registry = JobRegistry::new();
		registry
			.register(interval_definition("ingest", minutes(60)), Arc::new(NoopJob))
			.unwrap();

		let mut latest = HashMap::new();
		latest.insert(
			"ingest".to_string(),
			JobRun {
				id: 1,
				job_name: "ingest".to_string(),
				started_at: at(0),
				ended_at: Some(at(5)),
				outcome: Some(flywheel_db::RunOutcome::Success),
				error_detail: None,
				duration_ms: Some(300_000),
				metrics: None,
			},
		);
		registry.seed_last_runs(&latest);

		assert!(registry.list_due(at(30)).is_empty());
		assert_eq!(registry.list_due(at(60)), vec!["ingest".to_string()]);
	}

	#[test]
	fn test_list_due_is_sorted_by_name() {
		let mut registry = JobRegistry::new();
		for name in ["upload", "analytics", "ingest"] {
			registry
				.register(interval_definition(name, minutes(5)), Arc::new(NoopJob))
				.unwrap();
		}

		assert_eq!(
			registry.list_due(at(0)),
			vec![
				"analytics".to_string(),
				"ingest".to_string(),
				"upload".to_string()
			]
		);
	}
}
