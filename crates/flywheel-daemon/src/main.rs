// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Flywheel background job daemon binary.

use clap::{Parser, Subcommand};
use flywheel_jobs::{Cadence, HealthThresholds, JobDefinition, JobRegistry, Lifecycle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod jobs;

/// Flywheel daemon - runs the recurring job fleet with durable history.
#[derive(Parser, Debug)]
#[command(
	name = "flywheel-daemon",
	about = "Flywheel background job daemon",
	version
)]
struct Args {
	/// Path to a TOML config file (defaults to /etc/flywheel/flywheel.toml)
	#[arg(long)]
	config: Option<PathBuf>,

	/// Subcommands for flywheel-daemon (e.g., `version`)
	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version information
	Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	// Parse CLI arguments
	let args = Args::parse();

	// Handle subcommands that should not start the daemon
	if let Some(Command::Version) = args.command {
		println!("flywheel-daemon {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	// Load .env file if present
	dotenvy::dotenv().ok();

	// Load configuration
	let config = match &args.config {
		Some(path) => flywheel_config::load_config_with_file(path)?,
		None => flywheel_config::load_config()?,
	};

	// Setup tracing; RUST_LOG overrides the configured default level
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| config.logging.level.clone().into()),
		)
		.init();

	tracing::info!(
		database = %config.database.url,
		tick_interval_secs = config.scheduler.tick_interval_secs,
		"starting flywheel-daemon"
	);

	// Create database pool and ensure the schema exists
	let pool = flywheel_db::create_pool(&config.database.url).await?;
	flywheel_db::init_schema(&pool).await?;

	let mut registry = JobRegistry::new();

	// Register run history cleanup job
	{
		use jobs::RunHistoryCleanupJob;
		registry.register(
			JobDefinition::new(
				"run-history-cleanup",
				Cadence::interval(Duration::from_secs(
					config.jobs.history_cleanup_interval_secs,
				))?,
			)
			.with_description("Removes old job run history entries"),
			Arc::new(RunHistoryCleanupJob::new(
				flywheel_db::RunRepository::new(pool.clone()),
				config.jobs.history_retention_days,
			)),
		)?;
	}

	// Register health heartbeat job
	{
		use jobs::HealthHeartbeatJob;
		registry.register(
			JobDefinition::new(
				"health-heartbeat",
				Cadence::interval(Duration::from_secs(config.jobs.heartbeat_interval_secs))?,
			)
			.with_description("Publishes scheduler liveness into health history"),
			Arc::new(HealthHeartbeatJob::new(
				flywheel_db::RunRepository::new(pool.clone()),
				flywheel_db::HealthCheckRepository::new(pool.clone()),
			)),
		)?;
	}

	let lifecycle = Lifecycle::new(
		registry,
		pool,
		Duration::from_secs(config.scheduler.tick_interval_secs),
		HealthThresholds {
			staleness: chrono::Duration::seconds(config.health.staleness_secs as i64),
			missed_interval_multiplier: config.health.missed_interval_multiplier,
		},
	);

	// Reconciles orphaned runs, then starts the tick loop
	lifecycle.start().await?;

	wait_for_shutdown_signal().await;
	tracing::info!("received shutdown signal");

	lifecycle
		.stop(Duration::from_secs(config.scheduler.shutdown_grace_secs))
		.await;

	tracing::info!("flywheel-daemon shutdown complete");
	Ok(())
}

/// Wait for SIGINT or, on unix, SIGTERM.
async fn wait_for_shutdown_signal() {
	let ctrl_c = tokio::signal::ctrl_c();

	#[cfg(unix)]
	{
		use tokio::signal::unix::{signal, SignalKind};

		let mut sigterm = match signal(SignalKind::terminate()) {
			Ok(sigterm) => sigterm,
			Err(e) => {
				tracing::error!(error = %e, "failed to install SIGTERM handler");
				let _ = ctrl_c.await;
				return;
			}
		};

		tokio::select! {
			_ = ctrl_c => {}
			_ = sigterm.recv() => {}
		}
	}

	#[cfg(not(unix))]
	{
		let _ = ctrl_c.await;
	}
}
