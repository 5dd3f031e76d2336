// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application records.
//!
//! An application describes one containerized workload targeted at a cluster
//! config and namespace. Its status is only ever changed through
//! [`ApplicationRepository::update_status`], which never rewrites the rest of
//! the record; `created_at` is written once on insert.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::{DbError, Result};
use crate::time::{format_ts, parse_opt_ts, parse_ts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
	Created,
	Deploying,
	Running,
	Error,
	Stopped,
	Deleted,
}

impl ApplicationStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			ApplicationStatus::Created => "created",
			ApplicationStatus::Deploying => "deploying",
			ApplicationStatus::Running => "running",
			ApplicationStatus::Error => "error",
			ApplicationStatus::Stopped => "stopped",
			ApplicationStatus::Deleted => "deleted",
		}
	}

	/// Whether a deploy may be started from this status.
	pub fn can_start_deploy(&self) -> bool {
		matches!(
			self,
			ApplicationStatus::Created
				| ApplicationStatus::Running
				| ApplicationStatus::Error
				| ApplicationStatus::Stopped
				| ApplicationStatus::Deploying
		)
	}

	/// Transitions driven by the orchestrator. Deletion is handled separately.
	pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
		use ApplicationStatus::*;
		match (self, next) {
			(Deleted, _) => false,
			(_, Deleted) => true,
			(_, Deploying) => self.can_start_deploy(),
			(Deploying, Running | Error | Stopped) => true,
			(Running | Stopped, Running | Stopped) => true,
			(Running | Stopped, Error) => true,
			_ => false,
		}
	}
}

impl std::fmt::Display for ApplicationStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for ApplicationStatus {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"created" => Ok(ApplicationStatus::Created),
			"deploying" => Ok(ApplicationStatus::Deploying),
			"running" => Ok(ApplicationStatus::Running),
			"error" => Ok(ApplicationStatus::Error),
			"stopped" => Ok(ApplicationStatus::Stopped),
			"deleted" => Ok(ApplicationStatus::Deleted),
			_ => Err(format!("unknown application status: {s}")),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVarSpec {
	pub name: String,
	pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
	pub id: String,
	pub name: String,
	pub description: Option<String>,
	pub namespace: String,
	pub cluster_config_id: String,
	pub image: String,
	pub replicas: i32,
	pub port: i32,
	pub service_type: String,
	pub status: ApplicationStatus,
	#[serde(default)]
	pub env_vars: Vec<EnvVarSpec>,
	#[serde(default)]
	pub command: Vec<String>,
	#[serde(default)]
	pub args: Vec<String>,
	#[serde(default)]
	pub labels: BTreeMap<String, String>,
	#[serde(default)]
	pub annotations: BTreeMap<String, String>,
	#[serde(default)]
	pub node_selector: BTreeMap<String, String>,
	pub image_pull_policy: Option<String>,
	pub cpu_request: Option<String>,
	pub cpu_limit: Option<String>,
	pub memory_request: Option<String>,
	pub memory_limit: Option<String>,
	#[serde(default)]
	pub config_data: BTreeMap<String, String>,
	#[serde(default, skip_serializing)]
	pub secret_data: BTreeMap<String, String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub last_deployed_at: Option<DateTime<Utc>>,
}

impl Application {
	/// A freshly created record with status `created` and empty workload extras.
	pub fn new(
		name: impl Into<String>,
		namespace: impl Into<String>,
		cluster_config_id: impl Into<String>,
		image: impl Into<String>,
	) -> Self {
		let now = Utc::now();
		Self {
			id: uuid::Uuid::new_v4().to_string(),
			name: name.into(),
			description: None,
			namespace: namespace.into(),
			cluster_config_id: cluster_config_id.into(),
			image: image.into(),
			replicas: 1,
			port: 8080,
			service_type: "ClusterIP".to_string(),
			status: ApplicationStatus::Created,
			env_vars: Vec::new(),
			command: Vec::new(),
			args: Vec::new(),
			labels: BTreeMap::new(),
			annotations: BTreeMap::new(),
			node_selector: BTreeMap::new(),
			image_pull_policy: None,
			cpu_request: None,
			cpu_limit: None,
			memory_request: None,
			memory_limit: None,
			config_data: BTreeMap::new(),
			secret_data: BTreeMap::new(),
			created_at: now,
			updated_at: now,
			last_deployed_at: None,
		}
	}
}

/// Optional filters for [`ApplicationRepository::list_applications`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationFilter {
	pub cluster_config_id: Option<String>,
	pub namespace: Option<String>,
	pub status: Option<ApplicationStatus>,
	#[serde(default)]
	pub include_deleted: bool,
}

#[derive(sqlx::FromRow)]
struct ApplicationRow {
	id: String,
	name: String,
	description: Option<String>,
	namespace: String,
	cluster_config_id: String,
	image: String,
	replicas: i64,
	port: i64,
	service_type: String,
	status: String,
	env_vars: String,
	command: String,
	args: String,
	labels: String,
	annotations: String,
	node_selector: String,
	image_pull_policy: Option<String>,
	cpu_request: Option<String>,
	cpu_limit: Option<String>,
	memory_request: Option<String>,
	memory_limit: Option<String>,
	config_data: String,
	secret_data: String,
	created_at: String,
	updated_at: String,
	last_deployed_at: Option<String>,
}

impl TryFrom<ApplicationRow> for Application {
	type Error = DbError;

	fn try_from(row: ApplicationRow) -> Result<Self> {
		Ok(Application {
			status: row.status.parse().map_err(DbError::Internal)?,
			env_vars: serde_json::from_str(&row.env_vars)?,
			command: serde_json::from_str(&row.command)?,
			args: serde_json::from_str(&row.args)?,
			labels: serde_json::from_str(&row.labels)?,
			annotations: serde_json::from_str(&row.annotations)?,
			node_selector: serde_json::from_str(&row.node_selector)?,
			config_data: serde_json::from_str(&row.config_data)?,
			secret_data: serde_json::from_str(&row.secret_data)?,
			created_at: parse_ts("created_at", &row.created_at)?,
			updated_at: parse_ts("updated_at", &row.updated_at)?,
			last_deployed_at: parse_opt_ts("last_deployed_at", row.last_deployed_at)?,
			id: row.id,
			name: row.name,
			description: row.description,
			namespace: row.namespace,
			cluster_config_id: row.cluster_config_id,
			image: row.image,
			replicas: row.replicas as i32,
			port: row.port as i32,
			service_type: row.service_type,
			image_pull_policy: row.image_pull_policy,
			cpu_request: row.cpu_request,
			cpu_limit: row.cpu_limit,
			memory_request: row.memory_request,
			memory_limit: row.memory_limit,
		})
	}
}

const SELECT_COLUMNS: &str = r#"
	SELECT id, name, description, namespace, cluster_config_id, image, replicas, port, service_type,
	       status, env_vars, command, args, labels, annotations, node_selector, image_pull_policy,
	       cpu_request, cpu_limit, memory_request, memory_limit, config_data, secret_data,
	       created_at, updated_at, last_deployed_at
	FROM applications
"#;

#[derive(Clone)]
pub struct ApplicationRepository {
	pool: SqlitePool,
}

impl ApplicationRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, app), fields(app_id = %app.id, name = %app.name))]
	pub async fn create_application(&self, app: &Application) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO applications (
				id, name, description, namespace, cluster_config_id, image, replicas, port,
				service_type, status, env_vars, command, args, labels, annotations, node_selector,
				image_pull_policy, cpu_request, cpu_limit, memory_request, memory_limit,
				config_data, secret_data, created_at, updated_at, last_deployed_at
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&app.id)
		.bind(&app.name)
		.bind(&app.description)
		.bind(&app.namespace)
		.bind(&app.cluster_config_id)
		.bind(&app.image)
		.bind(app.replicas as i64)
		.bind(app.port as i64)
		.bind(&app.service_type)
		.bind(app.status.as_str())
		.bind(serde_json::to_string(&app.env_vars)?)
		.bind(serde_json::to_string(&app.command)?)
		.bind(serde_json::to_string(&app.args)?)
		.bind(serde_json::to_string(&app.labels)?)
		.bind(serde_json::to_string(&app.annotations)?)
		.bind(serde_json::to_string(&app.node_selector)?)
		.bind(&app.image_pull_policy)
		.bind(&app.cpu_request)
		.bind(&app.cpu_limit)
		.bind(&app.memory_request)
		.bind(&app.memory_limit)
		.bind(serde_json::to_string(&app.config_data)?)
		.bind(serde_json::to_string(&app.secret_data)?)
		.bind(format_ts(&app.created_at))
		.bind(format_ts(&app.updated_at))
		.bind(app.last_deployed_at.as_ref().map(format_ts))
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_application(&self, id: &str) -> Result<Option<Application>> {
		let row = sqlx::query_as::<_, ApplicationRow>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
			.bind(id)
			.fetch_optional(&self.pool)
			.await?;

		row.map(Application::try_from).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_applications(&self, filter: &ApplicationFilter) -> Result<Vec<Application>> {
		let mut sql = format!("{SELECT_COLUMNS} WHERE 1 = 1");
		if filter.cluster_config_id.is_some() {
			sql.push_str(" AND cluster_config_id = ?");
		}
		if filter.namespace.is_some() {
			sql.push_str(" AND namespace = ?");
		}
		if filter.status.is_some() {
			sql.push_str(" AND status = ?");
		} else if !filter.include_deleted {
			sql.push_str(" AND status != 'deleted'");
		}
		sql.push_str(" ORDER BY created_at DESC");

		let mut query = sqlx::query_as::<_, ApplicationRow>(&sql);
		if let Some(cluster_id) = &filter.cluster_config_id {
			query = query.bind(cluster_id);
		}
		if let Some(namespace) = &filter.namespace {
			query = query.bind(namespace);
		}
		if let Some(status) = filter.status {
			query = query.bind(status.as_str());
		}

		let rows = query.fetch_all(&self.pool).await?;
		rows.into_iter().map(Application::try_from).collect()
	}

	/// Look up a live application by its (name, namespace, cluster) identity.
	#[tracing::instrument(skip(self))]
	pub async fn find_by_identity(
		&self,
		name: &str,
		namespace: &str,
		cluster_config_id: &str,
	) -> Result<Option<Application>> {
		let row = sqlx::query_as::<_, ApplicationRow>(&format!(
			"{SELECT_COLUMNS} WHERE name = ? AND namespace = ? AND cluster_config_id = ? AND status != 'deleted' LIMIT 1"
		))
		.bind(name)
		.bind(namespace)
		.bind(cluster_config_id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(Application::try_from).transpose()
	}

	/// Rewrite the editable fields. Status, `created_at` and `last_deployed_at`
	/// are left untouched.
	#[tracing::instrument(skip(self, app), fields(app_id = %app.id))]
	pub async fn update_application(&self, app: &Application) -> Result<()> {
		let now = format_ts(&Utc::now());
		let result = sqlx::query(
			r#"
			UPDATE applications SET
				name = ?, description = ?, namespace = ?, cluster_config_id = ?, image = ?,
				replicas = ?, port = ?, service_type = ?, env_vars = ?, command = ?, args = ?,
				labels = ?, annotations = ?, node_selector = ?, image_pull_policy = ?,
				cpu_request = ?, cpu_limit = ?, memory_request = ?, memory_limit = ?,
				config_data = ?, secret_data = ?, updated_at = ?
			WHERE id = ?
			"#,
		)
		.bind(&app.name)
		.bind(&app.description)
		.bind(&app.namespace)
		.bind(&app.cluster_config_id)
		.bind(&app.image)
		.bind(app.replicas as i64)
		.bind(app.port as i64)
		.bind(&app.service_type)
		.bind(serde_json::to_string(&app.env_vars)?)
		.bind(serde_json::to_string(&app.command)?)
		.bind(serde_json::to_string(&app.args)?)
		.bind(serde_json::to_string(&app.labels)?)
		.bind(serde_json::to_string(&app.annotations)?)
		.bind(serde_json::to_string(&app.node_selector)?)
		.bind(&app.image_pull_policy)
		.bind(&app.cpu_request)
		.bind(&app.cpu_limit)
		.bind(&app.memory_request)
		.bind(&app.memory_limit)
		.bind(serde_json::to_string(&app.config_data)?)
		.bind(serde_json::to_string(&app.secret_data)?)
		.bind(&now)
		.bind(&app.id)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("application {}", app.id)));
		}

		Ok(())
	}

	/// Status-only update. Moving to `deploying` also stamps `last_deployed_at`.
	#[tracing::instrument(skip(self))]
	pub async fn update_status(&self, id: &str, status: ApplicationStatus) -> Result<()> {
		let now = format_ts(&Utc::now());
		let sql = if status == ApplicationStatus::Deploying {
			"UPDATE applications SET status = ?1, updated_at = ?2, last_deployed_at = ?2 WHERE id = ?3"
		} else {
			"UPDATE applications SET status = ?1, updated_at = ?2 WHERE id = ?3"
		};

		let result = sqlx::query(sql)
			.bind(status.as_str())
			.bind(&now)
			.bind(id)
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("application {id}")));
		}

		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn soft_delete(&self, id: &str) -> Result<bool> {
		let now = format_ts(&Utc::now());
		let result = sqlx::query(
			"UPDATE applications SET status = 'deleted', updated_at = ? WHERE id = ? AND status != 'deleted'",
		)
		.bind(&now)
		.bind(id)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	/// Remove the record and, by cascade, its resource bookkeeping.
	#[tracing::instrument(skip(self))]
	pub async fn hard_delete(&self, id: &str) -> Result<bool> {
		let mut tx = self.pool.begin().await?;

		sqlx::query("DELETE FROM application_resources WHERE application_id = ?")
			.bind(id)
			.execute(&mut *tx)
			.await?;

		let result = sqlx::query("DELETE FROM applications WHERE id = ?")
			.bind(id)
			.execute(&mut *tx)
			.await?;

		tx.commit().await?;
		Ok(result.rows_affected() > 0)
	}
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
	async fn create_application(&self, app: &Application) -> Result<()>;
	async fn get_application(&self, id: &str) -> Result<Option<Application>>;
	async fn list_applications(&self, filter: &ApplicationFilter) -> Result<Vec<Application>>;
	async fn find_by_identity(
		&self,
		name: &str,
		namespace: &str,
		cluster_config_id: &str,
	) -> Result<Option<Application>>;
	async fn update_application(&self, app: &Application) -> Result<()>;
	async fn update_status(&self, id: &str, status: ApplicationStatus) -> Result<()>;
	async fn soft_delete(&self, id: &str) -> Result<bool>;
	async fn hard_delete(&self, id: &str) -> Result<bool>;
}

#[async_trait]
impl ApplicationStore for ApplicationRepository {
	async fn create_application(&self, app: &Application) -> Result<()> {
		self.create_application(app).await
	}

	async fn get_application(&self, id: &str) -> Result<Option<Application>> {
		self.get_application(id).await
	}

	async fn list_applications(&self, filter: &ApplicationFilter) -> Result<Vec<Application>> {
		self.list_applications(filter).await
	}

	async fn find_by_identity(
		&self,
		name: &str,
		namespace: &str,
		cluster_config_id: &str,
	) -> Result<Option<Application>> {
		self.find_by_identity(name, namespace, cluster_config_id).await
	}

	async fn update_application(&self, app: &Application) -> Result<()> {
		self.update_application(app).await
	}

	async fn update_status(&self, id: &str, status: ApplicationStatus) -> Result<()> {
		self.update_status(id, status).await
	}

	async fn soft_delete(&self, id: &str) -> Result<bool> {
		self.soft_delete(id).await
	}

	async fn hard_delete(&self, id: &str) -> Result<bool> {
		self.hard_delete(id).await
	}
}
