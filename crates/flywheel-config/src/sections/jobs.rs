// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Maintenance jobs configuration section.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobsConfig {
	/// How long terminal run history is retained.
	pub history_retention_days: u32,
	/// Cadence of the run-history cleanup job.
	pub history_cleanup_interval_secs: u64,
	/// Cadence of the health heartbeat job.
	pub heartbeat_interval_secs: u64,
}

impl Default for JobsConfig {
	fn default() -> Self {
		Self {
			history_retention_days: 90,
			history_cleanup_interval_secs: 86400, // 24 hours
			heartbeat_interval_secs: 300,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobsConfigLayer {
	pub history_retention_days: Option<u32>,
	pub history_cleanup_interval_secs: Option<u64>,
	pub heartbeat_interval_secs: Option<u64>,
}

impl JobsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.history_retention_days.is_some() {
			self.history_retention_days = other.history_retention_days;
		}
		if other.history_cleanup_interval_secs.is_some() {
			self.history_cleanup_interval_secs = other.history_cleanup_interval_secs;
		}
		if other.heartbeat_interval_secs.is_some() {
			self.heartbeat_interval_secs = other.heartbeat_interval_secs;
		}
	}

	pub fn finalize(self) -> JobsConfig {
		JobsConfig {
			history_retention_days: self.history_retention_days.unwrap_or(90),
			history_cleanup_interval_secs: self.history_cleanup_interval_secs.unwrap_or(86400),
			heartbeat_interval_secs: self.heartbeat_interval_secs.unwrap_or(300),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = JobsConfigLayer::default().finalize();
		assert_eq!(config.history_retention_days, 90);
		assert_eq!(config.history_cleanup_interval_secs, 86400);
		assert_eq!(config.heartbeat_interval_secs, 300);
	}

	#[test]
	fn test_merge_keeps_unset_fields() {
		let mut base = JobsConfigLayer {
			history_retention_days: Some(90),
			..Default::default()
		};
		let overlay = JobsConfigLayer {
			heartbeat_interval_secs: Some(60),
			..Default::default()
		};
		base.merge(overlay);
		assert_eq!(base.history_retention_days, Some(90));
		assert_eq!(base.heartbeat_interval_secs, Some(60));
	}

	#[test]
	fn test_deserialize_layer_empty() {
		let layer: JobsConfigLayer = toml::from_str("").unwrap();
		assert!(layer.history_retention_days.is_none());
		assert!(layer.history_cleanup_interval_secs.is_none());
		assert!(layer.heartbeat_interval_secs.is_none());
	}
}
