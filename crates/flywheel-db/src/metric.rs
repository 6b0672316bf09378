// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Metric samples written by jobs during execution.
//!
//! Each sample is its own transaction: a metric recorded before a run fails
//! stays persisted, it is not rolled back with the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
	pub id: i64,
	pub recorded_at: DateTime<Utc>,
	pub name: String,
	pub value: f64,
	pub tags: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct MetricRepository {
	pool: SqlitePool,
}

impl MetricRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, tags))]
	pub async fn record(
		&self,
		name: &str,
		value: f64,
		tags: Option<&serde_json::Value>,
	) -> Result<i64> {
		let result = sqlx::query(
			"INSERT INTO metrics (recorded_at, name, value, tags) VALUES (?, ?, ?, ?)",
		)
		.bind(Utc::now())
		.bind(name)
		.bind(value)
		.bind(tags.map(|t| t.to_string()))
		.execute(&self.pool)
		.await?;

		Ok(result.last_insert_rowid())
	}

	/// The most recent samples for a metric name, newest first.
	#[tracing::instrument(skip(self))]
	pub async fn list_recent(&self, name: &str, limit: u32) -> Result<Vec<MetricSample>> {
		let rows = sqlx::query_as::<_, (i64, DateTime<Utc>, String, f64, Option<String>)>(
			r#"
			SELECT id, recorded_at, name, value, tags
			FROM metrics
			WHERE name = ?
			ORDER BY id DESC
			LIMIT ?
			"#,
		)
		.bind(name)
		.bind(limit as i64)
		.fetch_all(&self.pool)
		.await?;

		Ok(
			rows
				.into_iter()
				.map(|(id, recorded_at, name, value, tags)| MetricSample {
					id,
					recorded_at,
					name,
					value,
					tags: tags.as_deref().and_then(|s| serde_json::from_str(s).ok()),
				})
				.collect(),
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_store_test_pool;

	#[tokio::test]
	async fn test_record_and_list() {
		let pool = create_store_test_pool().await;
		let repo = MetricRepository::new(pool);

		let tags = serde_json::json!({"job": "ingest", "run_id": 1});
		repo.record("memes_fetched", 12.0, Some(&tags)).await.unwrap();
		repo.record("memes_fetched", 7.0, None).await.unwrap();
		repo.record("uploads", 1.0, None).await.unwrap();

		let samples = repo.list_recent("memes_fetched", 10).await.unwrap();
		assert_eq!(samples.len(), 2);
		assert_eq!(samples[0].value, 7.0);
		assert_eq!(samples[1].tags, Some(tags));
	}

	#[tokio::test]
	async fn test_list_recent_respects_limit() {
		let pool = create_store_test_pool().await;
		let repo = MetricRepository::new(pool);

		for i in 0..5 {
			repo.record("engagement", i as f64, None).await.unwrap();
		}

		let samples = repo.list_recent("engagement", 3).await.unwrap();
		assert_eq!(samples.len(), 3);
		assert_eq!(samples[0].value, 4.0);
	}
}
