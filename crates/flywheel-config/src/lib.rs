// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration management for Flywheel.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`FLYWHEEL_*`)
//!
//! # Usage
//!
//! ```ignore
//! use flywheel_config::load_config;
//!
//! let config = load_config()?;
//! println!("database at {}", config.database.url);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::FlywheelConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::debug;

/// Fully resolved Flywheel configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlywheelConfig {
	pub database: DatabaseConfig,
	pub scheduler: SchedulerConfig,
	pub health: HealthConfig,
	pub jobs: JobsConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`FLYWHEEL_*`)
/// 2. Config file (`/etc/flywheel/flywheel.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<FlywheelConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<FlywheelConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only (for testing or simple deployments).
pub fn load_config_from_env() -> Result<FlywheelConfig, ConfigError> {
	let mut merged = FlywheelConfigLayer::default();
	merged.merge(EnvSource.load()?);
	Ok(finalize(merged))
}

fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<FlywheelConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = FlywheelConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	Ok(finalize(merged))
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: FlywheelConfigLayer) -> FlywheelConfig {
	FlywheelConfig {
		database: layer.database.unwrap_or_default().finalize(),
		scheduler: layer.scheduler.unwrap_or_default().finalize(),
		health: layer.health.unwrap_or_default().finalize(),
		jobs: layer.jobs.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
	}
}
