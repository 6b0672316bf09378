// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The mergeable configuration layer produced by each source.

use serde::Deserialize;

use crate::sections::{
	DatabaseConfigLayer, HealthConfigLayer, JobsConfigLayer, LoggingConfigLayer,
	SchedulerConfigLayer,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlywheelConfigLayer {
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub scheduler: Option<SchedulerConfigLayer>,
	#[serde(default)]
	pub health: Option<HealthConfigLayer>,
	#[serde(default)]
	pub jobs: Option<JobsConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl FlywheelConfigLayer {
	/// Merge a higher-precedence layer into this one.
	pub fn merge(&mut self, other: FlywheelConfigLayer) {
		merge_section(&mut self.database, other.database, |base, overlay| {
			base.merge(overlay)
		});
		merge_section(&mut self.scheduler, other.scheduler, |base, overlay| {
			base.merge(overlay)
		});
		merge_section(&mut self.health, other.health, |base, overlay| {
			base.merge(overlay)
		});
		merge_section(&mut self.jobs, other.jobs, |base, overlay| {
			base.merge(overlay)
		});
		merge_section(&mut self.logging, other.logging, |base, overlay| {
			base.merge(overlay)
		});
	}
}

fn merge_section<T>(base: &mut Option<T>, overlay: Option<T>, merge: impl FnOnce(&mut T, T)) {
	match (base.as_mut(), overlay) {
		(Some(base), Some(overlay)) => merge(base, overlay),
		(None, Some(overlay)) => *base = Some(overlay),
		_ => {}
	}
}
