// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite persistence for the Flywheel scheduler.
//!
//! This crate is the single source of truth for what the scheduler has done:
//! job run history, health-check observations, and metric samples. All writes
//! go through repository types backed by a WAL-mode SQLite pool; readers never
//! take the writers' exclusive path.

pub mod error;
pub mod health_check;
pub mod metric;
pub mod pool;
pub mod run;
pub mod testing;

pub use error::{DbError, Result};
pub use health_check::{HealthCheck, HealthCheckRepository, HealthStatus};
pub use metric::{MetricRepository, MetricSample};
pub use pool::{create_pool, init_schema};
pub use run::{JobRun, RunOutcome, RunRepository};
