// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scheduler configuration section.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
	/// How often due jobs are evaluated.
	pub tick_interval_secs: u64,
	/// How long `stop` waits for in-flight runs before abandoning them.
	pub shutdown_grace_secs: u64,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			tick_interval_secs: 5,
			shutdown_grace_secs: 30,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfigLayer {
	pub tick_interval_secs: Option<u64>,
	pub shutdown_grace_secs: Option<u64>,
}

impl SchedulerConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.tick_interval_secs.is_some() {
			self.tick_interval_secs = other.tick_interval_secs;
		}
		if other.shutdown_grace_secs.is_some() {
			self.shutdown_grace_secs = other.shutdown_grace_secs;
		}
	}

	pub fn finalize(self) -> SchedulerConfig {
		SchedulerConfig {
			tick_interval_secs: self.tick_interval_secs.unwrap_or(5),
			shutdown_grace_secs: self.shutdown_grace_secs.unwrap_or(30),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = SchedulerConfigLayer::default().finalize();
		assert_eq!(config.tick_interval_secs, 5);
		assert_eq!(config.shutdown_grace_secs, 30);
	}

	#[test]
	fn test_merge_overwrites() {
		let mut base = SchedulerConfigLayer {
			tick_interval_secs: Some(5),
			shutdown_grace_secs: Some(30),
		};
		let overlay = SchedulerConfigLayer {
			tick_interval_secs: Some(2),
			shutdown_grace_secs: None,
		};
		base.merge(overlay);
		assert_eq!(base.tick_interval_secs, Some(2));
		assert_eq!(base.shutdown_grace_secs, Some(30));
	}

	#[test]
	fn test_deserialize_partial() {
		let layer: SchedulerConfigLayer = toml::from_str("tick_interval_secs = 10").unwrap();
		assert_eq!(layer.tick_interval_secs, Some(10));
		assert!(layer.shutdown_grace_secs.is_none());
	}
}
