// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use flywheel_db::DbError;
use thiserror::Error;

/// Errors raised by a unit of work.
///
/// Always caught at the run boundary and folded into the run record; never
/// propagated to the scheduling loop.
#[derive(Debug, Error)]
pub enum JobError {
	#[error("job failed: {message}")]
	Failed { message: String },

	#[error("job cancelled")]
	Cancelled,

	#[error(transparent)]
	Store(#[from] DbError),
}

/// Errors raised by the scheduler surface itself.
#[derive(Debug, Error)]
pub enum SchedulerError {
	#[error("job already registered: {0}")]
	DuplicateJob(String),

	#[error("scheduler already started")]
	AlreadyStarted,

	#[error("invalid cadence: {0}")]
	InvalidCadence(String),

	#[error(transparent)]
	Store(#[from] DbError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
