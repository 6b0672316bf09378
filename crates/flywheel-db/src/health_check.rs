// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Append-only health-check observations, one row per liveness signal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::{DbError, Result};

/// Health classification shared by persisted checks and the derived snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
	Ok,
	Degraded,
	Down,
}

impl HealthStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			HealthStatus::Ok => "ok",
			HealthStatus::Degraded => "degraded",
			HealthStatus::Down => "down",
		}
	}

	/// The more severe of two statuses.
	pub fn worst(self, other: HealthStatus) -> HealthStatus {
		use HealthStatus::*;
		match (self, other) {
			(Down, _) | (_, Down) => Down,
			(Degraded, _) | (_, Degraded) => Degraded,
			_ => Ok,
		}
	}
}

impl std::str::FromStr for HealthStatus {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"ok" => Ok(HealthStatus::Ok),
			"degraded" => Ok(HealthStatus::Degraded),
			"down" => Ok(HealthStatus::Down),
			_ => Err(format!("unknown health status: {s}")),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
	pub id: i64,
	pub component: String,
	pub status: HealthStatus,
	pub message: Option<String>,
	pub observed_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct HealthCheckRepository {
	pool: SqlitePool,
}

impl HealthCheckRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self))]
	pub async fn record(
		&self,
		component: &str,
		status: HealthStatus,
		message: Option<&str>,
	) -> Result<i64> {
		let result = sqlx::query(
			"INSERT INTO health_checks (component, status, message, observed_at) VALUES (?, ?, ?, ?)",
		)
		.bind(component)
		.bind(status.as_str())
		.bind(message)
		.bind(Utc::now())
		.execute(&self.pool)
		.await?;

		Ok(result.last_insert_rowid())
	}

	/// Checks observed at or after the cutoff, newest first.
	#[tracing::instrument(skip(self))]
	pub async fn recent_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<HealthCheck>> {
		let rows = sqlx::query_as::<_, (i64, String, String, Option<String>, DateTime<Utc>)>(
			r#"
			SELECT id, component, status, message, observed_at
			FROM health_checks
			WHERE observed_at >= ?
			ORDER BY id DESC
			"#,
		)
		.bind(cutoff)
		.fetch_all(&self.pool)
		.await?;

		rows
			.into_iter()
			.map(|(id, component, status, message, observed_at)| {
				Ok(HealthCheck {
					id,
					component,
					status: status.parse().map_err(DbError::Internal)?,
					message,
					observed_at,
				})
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_store_test_pool;

	#[tokio::test]
	async fn test_record_and_query_recent() {
		let pool = create_store_test_pool().await;
		let repo = HealthCheckRepository::new(pool);

		repo
			.record("scheduler", HealthStatus::Ok, Some("heartbeat"))
			.await
			.unwrap();
		repo
			.record("job:upload", HealthStatus::Degraded, None)
			.await
			.unwrap();

		let recent = repo
			.recent_since(Utc::now() - chrono::Duration::minutes(5))
			.await
			.unwrap();
		assert_eq!(recent.len(), 2);
		assert_eq!(recent[0].component, "job:upload");
		assert_eq!(recent[0].status, HealthStatus::Degraded);
		assert_eq!(recent[1].message.as_deref(), Some("heartbeat"));
	}

	#[tokio::test]
	async fn test_recent_since_excludes_stale_rows() {
		let pool = create_store_test_pool().await;
		let repo = HealthCheckRepository::new(pool.clone());

		let id = repo.record("scheduler", HealthStatus::Down, None).await.unwrap();
		sqlx::query("UPDATE health_checks SET observed_at = ? WHERE id = ?")
			.bind(Utc::now() - chrono::Duration::hours(2))
			.bind(id)
			.execute(&pool)
			.await
			.unwrap();

		let recent = repo
			.recent_since(Utc::now() - chrono::Duration::minutes(5))
			.await
			.unwrap();
		assert!(recent.is_empty());
	}

	#[test]
	fn test_worst_ordering() {
		assert_eq!(
			HealthStatus::Ok.worst(HealthStatus::Degraded),
			HealthStatus::Degraded
		);
		assert_eq!(
			HealthStatus::Degraded.worst(HealthStatus::Down),
			HealthStatus::Down
		);
		assert_eq!(HealthStatus::Ok.worst(HealthStatus::Ok), HealthStatus::Ok);
	}
}
