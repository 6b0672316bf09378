// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;

use crate::context::JobContext;
use crate::error::JobError;

/// A unit of work invoked by the scheduler.
///
/// Implementations may block on I/O freely; the only obligation is to observe
/// `ctx.cancellation_token` at reasonable intervals and return
/// [`JobError::Cancelled`] when it fires.
#[async_trait]
pub trait Job: Send + Sync {
	async fn run(&self, ctx: &JobContext) -> std::result::Result<JobOutput, JobError>;
}

/// Summary returned by a successful run, logged alongside the run record.
#[derive(Debug, Clone)]
pub struct JobOutput {
	pub message: String,
}

impl JobOutput {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
		}
	}
}
