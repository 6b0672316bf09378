// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Typed job cadences: fixed intervals and cron expressions.
//!
//! Cron input is validated at registration time, not at evaluation time, so a
//! malformed expression fails startup instead of silently never firing.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::SchedulerError;

/// Convert a standard 5-field Unix cron expression to the 7-field format
/// expected by the `cron` crate.
///
/// 5-field format: minute hour day-of-month month day-of-week
/// 7-field format: second minute hour day-of-month month day-of-week year
///
/// We add "0" for seconds (run at :00 of each minute) and "*" for year (any year).
fn convert_to_cron_crate_format(expression: &str) -> String {
	let field_count = expression.split_whitespace().count();
	if field_count >= 6 {
		// Already in extended format, use as-is
		expression.to_string()
	} else if field_count == 5 {
		format!("0 {} *", expression)
	} else {
		// Invalid format, return as-is and let the parser error
		expression.to_string()
	}
}

/// The rule determining when a job becomes eligible to run again.
#[derive(Clone)]
pub enum Cadence {
	Interval(Duration),
	Cron {
		expression: String,
		schedule: cron::Schedule,
	},
}

impl Cadence {
	/// Fixed-interval cadence. Rejects a zero interval.
	pub fn interval(interval: Duration) -> Result<Self, SchedulerError> {
		if interval.is_zero() {
			return Err(SchedulerError::InvalidCadence(
				"interval must be non-zero".to_string(),
			));
		}
		Ok(Cadence::Interval(interval))
	}

	/// Cron cadence from a standard 5-field (or extended 6/7-field) Unix
	/// expression, evaluated in UTC.
	pub fn cron(expression: &str) -> Result<Self, SchedulerError> {
		let normalized = convert_to_cron_crate_format(expression);
		let schedule = cron::Schedule::from_str(&normalized).map_err(|e| {
			SchedulerError::InvalidCadence(format!("cron expression '{expression}': {e}"))
		})?;
		Ok(Cadence::Cron {
			expression: expression.to_string(),
			schedule,
		})
	}

	/// Next eligible time strictly after the given instant.
	///
	/// `None` only for a cron schedule with no future occurrence.
	pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
		match self {
			Cadence::Interval(interval) => chrono::Duration::from_std(*interval)
				.ok()
				.and_then(|d| after.checked_add_signed(d)),
			Cadence::Cron { schedule, .. } => schedule.after(&after).next(),
		}
	}

	/// The cadence's nominal spacing, used by the health rules.
	///
	/// For cron schedules this is the gap between the next two occurrences
	/// after `now`.
	pub fn nominal_interval(&self, now: DateTime<Utc>) -> Option<Duration> {
		match self {
			Cadence::Interval(interval) => Some(*interval),
			Cadence::Cron { schedule, .. } => {
				let mut upcoming = schedule.after(&now);
				let first = upcoming.next()?;
				let second = upcoming.next()?;
				(second - first).to_std().ok()
			}
		}
	}
}

impl fmt::Debug for Cadence {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Cadence::Interval(interval) => write!(f, "interval({interval:?})"),
			Cadence::Cron { expression, .. } => write!(f, "cron({expression})"),
		}
	}
}
