// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: defaults, TOML files, and environment variables.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::FlywheelConfigLayer;
use crate::sections::{
	DatabaseConfigLayer, HealthConfigLayer, JobsConfigLayer, LoggingConfigLayer,
	SchedulerConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<FlywheelConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<FlywheelConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(FlywheelConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/flywheel/flywheel.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<FlywheelConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(FlywheelConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: FlywheelConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: FLYWHEEL_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<FlywheelConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(FlywheelConfigLayer {
			database: Some(DatabaseConfigLayer {
				url: env_var("FLYWHEEL_DATABASE_URL"),
			}),
			scheduler: Some(SchedulerConfigLayer {
				tick_interval_secs: env_u64("FLYWHEEL_TICK_INTERVAL_SECS")?,
				shutdown_grace_secs: env_u64("FLYWHEEL_SHUTDOWN_GRACE_SECS")?,
			}),
			health: Some(HealthConfigLayer {
				staleness_secs: env_u64("FLYWHEEL_HEALTH_STALENESS_SECS")?,
				missed_interval_multiplier: env_u32("FLYWHEEL_HEALTH_MISSED_INTERVAL_MULTIPLIER")?,
			}),
			jobs: Some(JobsConfigLayer {
				history_retention_days: env_u32("FLYWHEEL_HISTORY_RETENTION_DAYS")?,
				history_cleanup_interval_secs: env_u64("FLYWHEEL_HISTORY_CLEANUP_INTERVAL_SECS")?,
				heartbeat_interval_secs: env_u64("FLYWHEEL_HEARTBEAT_INTERVAL_SECS")?,
			}),
			logging: Some(LoggingConfigLayer {
				level: env_var("FLYWHEEL_LOG_LEVEL"),
			}),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_u32(name: &str) -> Result<Option<u32>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u32 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u64 value '{v}'"),
		}),
		None => Ok(None),
	}
}
