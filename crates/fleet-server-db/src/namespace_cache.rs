// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persisted namespace listings, one row per (cluster config, namespace).
//!
//! Writes never move `last_synced_at` backwards for a key: an upsert carrying
//! an older timestamp than the stored row is ignored.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::{DbError, Result};
use crate::time::{format_ts, parse_opt_ts, parse_ts};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceCacheEntry {
	pub cluster_config_id: String,
	pub name: String,
	pub status: String,
	pub labels: BTreeMap<String, String>,
	pub annotations: BTreeMap<String, String>,
	pub created_at: Option<DateTime<Utc>>,
	pub last_synced_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct NamespaceCacheRow {
	cluster_config_id: String,
	name: String,
	status: String,
	labels: String,
	annotations: String,
	created_at: Option<String>,
	last_synced_at: String,
}

impl TryFrom<NamespaceCacheRow> for NamespaceCacheEntry {
	type Error = DbError;

	fn try_from(row: NamespaceCacheRow) -> Result<Self> {
		Ok(NamespaceCacheEntry {
			labels: serde_json::from_str(&row.labels)?,
			annotations: serde_json::from_str(&row.annotations)?,
			created_at: parse_opt_ts("created_at", row.created_at)?,
			last_synced_at: parse_ts("last_synced_at", &row.last_synced_at)?,
			cluster_config_id: row.cluster_config_id,
			name: row.name,
			status: row.status,
		})
	}
}

const UPSERT_SQL: &str = r#"
	INSERT INTO namespace_cache (cluster_config_id, name, status, labels, annotations, created_at, last_synced_at)
	VALUES (?, ?, ?, ?, ?, ?, ?)
	ON CONFLICT(cluster_config_id, name) DO UPDATE SET
		status = excluded.status,
		labels = excluded.labels,
		annotations = excluded.annotations,
		created_at = excluded.created_at,
		last_synced_at = excluded.last_synced_at
	WHERE excluded.last_synced_at >= namespace_cache.last_synced_at
"#;

#[derive(Clone)]
pub struct NamespaceCacheRepository {
	pool: SqlitePool,
}

impl NamespaceCacheRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_for_cluster(&self, cluster_config_id: &str) -> Result<Vec<NamespaceCacheEntry>> {
		let rows = sqlx::query_as::<_, NamespaceCacheRow>(
			r#"
			SELECT cluster_config_id, name, status, labels, annotations, created_at, last_synced_at
			FROM namespace_cache
			WHERE cluster_config_id = ?
			ORDER BY name
			"#,
		)
		.bind(cluster_config_id)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(NamespaceCacheEntry::try_from).collect()
	}

	#[tracing::instrument(skip(self, entry), fields(cluster_id = %entry.cluster_config_id, name = %entry.name))]
	pub async fn upsert(&self, entry: &NamespaceCacheEntry) -> Result<()> {
		sqlx::query(UPSERT_SQL)
			.bind(&entry.cluster_config_id)
			.bind(&entry.name)
			.bind(&entry.status)
			.bind(serde_json::to_string(&entry.labels)?)
			.bind(serde_json::to_string(&entry.annotations)?)
			.bind(entry.created_at.as_ref().map(format_ts))
			.bind(format_ts(&entry.last_synced_at))
			.execute(&self.pool)
			.await?;

		Ok(())
	}

	/// Make the stored listing for a cluster equal `entries`, atomically.
	///
	/// Rows absent from `entries` are dropped unless they were synced more
	/// recently than `synced_at`.
	#[tracing::instrument(skip(self, entries), fields(count = entries.len()))]
	pub async fn replace_for_cluster(
		&self,
		cluster_config_id: &str,
		entries: &[NamespaceCacheEntry],
		synced_at: DateTime<Utc>,
	) -> Result<()> {
		let synced = format_ts(&synced_at);
		let mut tx = self.pool.begin().await?;

		for entry in entries {
			sqlx::query(UPSERT_SQL)
				.bind(cluster_config_id)
				.bind(&entry.name)
				.bind(&entry.status)
				.bind(serde_json::to_string(&entry.labels)?)
				.bind(serde_json::to_string(&entry.annotations)?)
				.bind(entry.created_at.as_ref().map(format_ts))
				.bind(&synced)
				.execute(&mut *tx)
				.await?;
		}

		let stored = sqlx::query_as::<_, (String,)>(
			"SELECT name FROM namespace_cache WHERE cluster_config_id = ? AND last_synced_at <= ?",
		)
		.bind(cluster_config_id)
		.bind(&synced)
		.fetch_all(&mut *tx)
		.await?;

		for (name,) in stored {
			if !entries.iter().any(|e| e.name == name) {
				sqlx::query("DELETE FROM namespace_cache WHERE cluster_config_id = ? AND name = ?")
					.bind(cluster_config_id)
					.bind(&name)
					.execute(&mut *tx)
					.await?;
			}
		}

		tx.commit().await?;
		tracing::debug!(cluster_id = %cluster_config_id, count = entries.len(), "namespace cache replaced");
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_for_cluster(&self, cluster_config_id: &str) -> Result<u64> {
		let result = sqlx::query("DELETE FROM namespace_cache WHERE cluster_config_id = ?")
			.bind(cluster_config_id)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}
}

#[async_trait]
pub trait NamespaceCacheStore: Send + Sync {
	async fn list_for_cluster(&self, cluster_config_id: &str) -> Result<Vec<NamespaceCacheEntry>>;
	async fn upsert(&self, entry: &NamespaceCacheEntry) -> Result<()>;
	async fn replace_for_cluster(
		&self,
		cluster_config_id: &str,
		entries: &[NamespaceCacheEntry],
		synced_at: DateTime<Utc>,
	) -> Result<()>;
	async fn delete_for_cluster(&self, cluster_config_id: &str) -> Result<u64>;
}

#[async_trait]
impl NamespaceCacheStore for NamespaceCacheRepository {
	async fn list_for_cluster(&self, cluster_config_id: &str) -> Result<Vec<NamespaceCacheEntry>> {
		self.list_for_cluster(cluster_config_id).await
	}

	async fn upsert(&self, entry: &NamespaceCacheEntry) -> Result<()> {
		self.upsert(entry).await
	}

	async fn replace_for_cluster(
		&self,
		cluster_config_id: &str,
		entries: &[NamespaceCacheEntry],
		synced_at: DateTime<Utc>,
	) -> Result<()> {
		self
			.replace_for_cluster(cluster_config_id, entries, synced_at)
			.await
	}

	async fn delete_for_cluster(&self, cluster_config_id: &str) -> Result<u64> {
		self.delete_for_cluster(cluster_config_id).await
	}
}
