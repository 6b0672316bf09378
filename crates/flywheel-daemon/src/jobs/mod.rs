// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Maintenance jobs the daemon schedules alongside the externally supplied
//! workload.

mod health_heartbeat;
mod run_history_cleanup;

pub use health_heartbeat::HealthHeartbeatJob;
pub use run_history_cleanup::RunHistoryCleanupJob;
