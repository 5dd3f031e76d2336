// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stored cluster credential bundles.
//!
//! A cluster config holds the uploaded credential content verbatim together
//! with the context and server URL extracted from it at upload time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::{DbError, Result};
use crate::time::{format_ts, parse_ts};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
	pub id: String,
	pub name: String,
	pub description: Option<String>,
	#[serde(skip_serializing)]
	pub credential: String,
	pub current_context: String,
	pub server_url: String,
	pub is_active: bool,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl ClusterConfig {
	pub fn new(
		name: impl Into<String>,
		description: Option<String>,
		credential: impl Into<String>,
		current_context: impl Into<String>,
		server_url: impl Into<String>,
	) -> Self {
		let now = Utc::now();
		Self {
			id: uuid::Uuid::new_v4().to_string(),
			name: name.into(),
			description,
			credential: credential.into(),
			current_context: current_context.into(),
			server_url: server_url.into(),
			is_active: true,
			created_at: now,
			updated_at: now,
		}
	}
}

#[derive(sqlx::FromRow)]
struct ClusterConfigRow {
	id: String,
	name: String,
	description: Option<String>,
	credential: String,
	current_context: String,
	server_url: String,
	is_active: bool,
	created_at: String,
	updated_at: String,
}

impl TryFrom<ClusterConfigRow> for ClusterConfig {
	type Error = DbError;

	fn try_from(row: ClusterConfigRow) -> Result<Self> {
		Ok(ClusterConfig {
			created_at: parse_ts("created_at", &row.created_at)?,
			updated_at: parse_ts("updated_at", &row.updated_at)?,
			id: row.id,
			name: row.name,
			description: row.description,
			credential: row.credential,
			current_context: row.current_context,
			server_url: row.server_url,
			is_active: row.is_active,
		})
	}
}

const SELECT_COLUMNS: &str = "SELECT id, name, description, credential, current_context, server_url, is_active, created_at, updated_at FROM cluster_configs";

#[derive(Clone)]
pub struct ClusterConfigRepository {
	pool: SqlitePool,
}

impl ClusterConfigRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, config), fields(cluster_id = %config.id))]
	pub async fn create_config(&self, config: &ClusterConfig) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO cluster_configs (id, name, description, credential, current_context, server_url, is_active, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&config.id)
		.bind(&config.name)
		.bind(&config.description)
		.bind(&config.credential)
		.bind(&config.current_context)
		.bind(&config.server_url)
		.bind(config.is_active)
		.bind(format_ts(&config.created_at))
		.bind(format_ts(&config.updated_at))
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_config(&self, id: &str) -> Result<Option<ClusterConfig>> {
		let row = sqlx::query_as::<_, ClusterConfigRow>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
			.bind(id)
			.fetch_optional(&self.pool)
			.await?;

		row.map(ClusterConfig::try_from).transpose()
	}

	/// Active configs, newest first.
	#[tracing::instrument(skip(self))]
	pub async fn list_configs(&self) -> Result<Vec<ClusterConfig>> {
		let rows = sqlx::query_as::<_, ClusterConfigRow>(&format!(
			"{SELECT_COLUMNS} WHERE is_active = 1 ORDER BY created_at DESC"
		))
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(ClusterConfig::try_from).collect()
	}

	#[tracing::instrument(skip(self))]
	pub async fn update_context(&self, id: &str, context: &str) -> Result<()> {
		let now = format_ts(&Utc::now());
		let result =
			sqlx::query("UPDATE cluster_configs SET current_context = ?, updated_at = ? WHERE id = ?")
				.bind(context)
				.bind(&now)
				.bind(id)
				.execute(&self.pool)
				.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("cluster config {id}")));
		}

		Ok(())
	}

	/// Delete a config and its cached namespaces.
	///
	/// Fails with `Conflict` while live applications still target it.
	#[tracing::instrument(skip(self))]
	pub async fn delete_config(&self, id: &str) -> Result<bool> {
		let mut tx = self.pool.begin().await?;

		let (in_use,): (i64,) = sqlx::query_as(
			"SELECT COUNT(*) FROM applications WHERE cluster_config_id = ? AND status != 'deleted'",
		)
		.bind(id)
		.fetch_one(&mut *tx)
		.await?;

		if in_use > 0 {
			return Err(DbError::Conflict(format!(
				"cluster config {id} is used by {in_use} application(s)"
			)));
		}

		sqlx::query("DELETE FROM namespace_cache WHERE cluster_config_id = ?")
			.bind(id)
			.execute(&mut *tx)
			.await?;

		let result = sqlx::query("DELETE FROM cluster_configs WHERE id = ?")
			.bind(id)
			.execute(&mut *tx)
			.await?;

		tx.commit().await?;
		Ok(result.rows_affected() > 0)
	}
}

#[async_trait]
pub trait ClusterConfigStore: Send + Sync {
	async fn create_config(&self, config: &ClusterConfig) -> Result<()>;
	async fn get_config(&self, id: &str) -> Result<Option<ClusterConfig>>;
	async fn list_configs(&self) -> Result<Vec<ClusterConfig>>;
	async fn update_context(&self, id: &str, context: &str) -> Result<()>;
	async fn delete_config(&self, id: &str) -> Result<bool>;
}

#[async_trait]
impl ClusterConfigStore for ClusterConfigRepository {
	async fn create_config(&self, config: &ClusterConfig) -> Result<()> {
		self.create_config(config).await
	}

	async fn get_config(&self, id: &str) -> Result<Option<ClusterConfig>> {
		self.get_config(id).await
	}

	async fn list_configs(&self) -> Result<Vec<ClusterConfig>> {
		self.list_configs().await
	}

	async fn update_context(&self, id: &str, context: &str) -> Result<()> {
		self.update_context(id, context).await
	}

	async fn delete_config(&self, id: &str) -> Result<bool> {
		self.delete_config(id).await
	}
}
