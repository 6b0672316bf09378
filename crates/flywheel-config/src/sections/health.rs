// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Health classification configuration section.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthConfig {
	/// Persisted health checks older than this are ignored by the snapshot.
	pub staleness_secs: u64,
	/// A critical job with no success within `multiplier ×` its interval
	/// marks the system down.
	pub missed_interval_multiplier: u32,
}

impl Default for HealthConfig {
	fn default() -> Self {
		Self {
			staleness_secs: 300,
			missed_interval_multiplier: 3,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HealthConfigLayer {
	pub staleness_secs: Option<u64>,
	pub missed_interval_multiplier: Option<u32>,
}

impl HealthConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.staleness_secs.is_some() {
			self.staleness_secs = other.staleness_secs;
		}
		if other.missed_interval_multiplier.is_some() {
			self.missed_interval_multiplier = other.missed_interval_multiplier;
		}
	}

	pub fn finalize(self) -> HealthConfig {
		HealthConfig {
			staleness_secs: self.staleness_secs.unwrap_or(300),
			missed_interval_multiplier: self.missed_interval_multiplier.unwrap_or(3),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = HealthConfigLayer::default().finalize();
		assert_eq!(config.staleness_secs, 300);
		assert_eq!(config.missed_interval_multiplier, 3);
	}

	#[test]
	fn test_serde_roundtrip() {
		let config = HealthConfig {
			staleness_secs: 120,
			missed_interval_multiplier: 5,
		};
		let toml_str = toml::to_string(&config).unwrap();
		let parsed: HealthConfig = toml::from_str(&toml_str).unwrap();
		assert_eq!(config, parsed);
	}
}
