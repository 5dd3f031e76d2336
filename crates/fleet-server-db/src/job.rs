// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::{DbError, Result};
use crate::time::{format_ts, parse_opt_ts, parse_ts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
	Running,
	Succeeded,
	Failed,
	Cancelled,
}

impl JobStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			JobStatus::Running => "running",
			JobStatus::Succeeded => "succeeded",
			JobStatus::Failed => "failed",
			JobStatus::Cancelled => "cancelled",
		}
	}
}

impl std::str::FromStr for JobStatus {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"running" => Ok(JobStatus::Running),
			"succeeded" => Ok(JobStatus::Succeeded),
			"failed" => Ok(JobStatus::Failed),
			"cancelled" => Ok(JobStatus::Cancelled),
			_ => Err(format!("unknown job status: {s}")),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
	Schedule,
	Manual,
	Retry,
}

impl TriggerSource {
	pub fn as_str(&self) -> &'static str {
		match self {
			TriggerSource::Schedule => "schedule",
			TriggerSource::Manual => "manual",
			TriggerSource::Retry => "retry",
		}
	}
}

impl std::str::FromStr for TriggerSource {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"schedule" => Ok(TriggerSource::Schedule),
			"manual" => Ok(TriggerSource::Manual),
			"retry" => Ok(TriggerSource::Retry),
			_ => Err(format!("unknown trigger source: {s}")),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
	pub id: String,
	pub name: String,
	pub description: String,
	pub job_type: String,
	pub interval_secs: Option<i64>,
	pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
	pub id: String,
	pub job_id: String,
	pub status: JobStatus,
	pub started_at: DateTime<Utc>,
	pub completed_at: Option<DateTime<Utc>>,
	pub duration_ms: Option<i64>,
	pub error_message: Option<String>,
	pub retry_count: u32,
	pub triggered_by: TriggerSource,
	pub metadata: Option<serde_json::Value>,
}

impl JobRun {
	/// A run that has just started.
	pub fn started(id: impl Into<String>, job_id: impl Into<String>, triggered_by: TriggerSource) -> Self {
		Self {
			id: id.into(),
			job_id: job_id.into(),
			status: JobStatus::Running,
			started_at: Utc::now(),
			completed_at: None,
			duration_ms: None,
			error_message: None,
			retry_count: 0,
			triggered_by,
			metadata: None,
		}
	}
}

#[derive(sqlx::FromRow)]
struct JobRunRow {
	id: String,
	job_id: String,
	status: String,
	started_at: String,
	completed_at: Option<String>,
	duration_ms: Option<i64>,
	error_message: Option<String>,
	retry_count: i64,
	triggered_by: String,
	metadata: Option<String>,
}

impl TryFrom<JobRunRow> for JobRun {
	type Error = DbError;

	fn try_from(row: JobRunRow) -> Result<Self> {
		Ok(JobRun {
			status: row.status.parse().map_err(DbError::Internal)?,
			started_at: parse_ts("started_at", &row.started_at)?,
			completed_at: parse_opt_ts("completed_at", row.completed_at)?,
			triggered_by: row.triggered_by.parse().map_err(DbError::Internal)?,
			metadata: row
				.metadata
				.as_deref()
				.and_then(|s| serde_json::from_str(s).ok()),
			id: row.id,
			job_id: row.job_id,
			duration_ms: row.duration_ms,
			error_message: row.error_message,
			retry_count: row.retry_count as u32,
		})
	}
}

const RUN_COLUMNS: &str = "SELECT id, job_id, status, started_at, completed_at, duration_ms, error_message, retry_count, triggered_by, metadata FROM job_runs";

#[derive(Clone)]
pub struct JobRepository {
	pool: SqlitePool,
}

impl JobRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, def), fields(job_id = %def.id))]
	pub async fn upsert_definition(&self, def: &JobDefinition) -> Result<()> {
		let now = format_ts(&Utc::now());
		sqlx::query(
			r#"
			INSERT INTO job_definitions (id, name, description, job_type, interval_secs, enabled, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			ON CONFLICT(id) DO UPDATE SET
				name = excluded.name,
				description = excluded.description,
				job_type = excluded.job_type,
				interval_secs = excluded.interval_secs,
				enabled = excluded.enabled,
				updated_at = excluded.updated_at
			"#,
		)
		.bind(&def.id)
		.bind(&def.name)
		.bind(&def.description)
		.bind(&def.job_type)
		.bind(def.interval_secs)
		.bind(def.enabled)
		.bind(&now)
		.bind(&now)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self, run), fields(run_id = %run.id, job_id = %run.job_id))]
	pub async fn record_run_start(&self, run: &JobRun) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO job_runs (id, job_id, status, started_at, retry_count, triggered_by)
			VALUES (?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&run.id)
		.bind(&run.job_id)
		.bind(run.status.as_str())
		.bind(format_ts(&run.started_at))
		.bind(run.retry_count as i64)
		.bind(run.triggered_by.as_str())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self, metadata))]
	pub async fn record_run_complete(
		&self,
		run_id: &str,
		status: JobStatus,
		retry_count: u32,
		error: Option<String>,
		metadata: Option<serde_json::Value>,
	) -> Result<()> {
		let now = format_ts(&Utc::now());
		let metadata_str = metadata.map(|m| m.to_string());

		let result = sqlx::query(
			r#"
			UPDATE job_runs
			SET status = ?1,
				completed_at = ?2,
				duration_ms = CAST((julianday(?2) - julianday(started_at)) * 86400000 AS INTEGER),
				retry_count = ?3,
				error_message = ?4,
				metadata = ?5
			WHERE id = ?6
			"#,
		)
		.bind(status.as_str())
		.bind(&now)
		.bind(retry_count as i64)
		.bind(error)
		.bind(metadata_str)
		.bind(run_id)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("job run {run_id}")));
		}

		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_run(&self, run_id: &str) -> Result<Option<JobRun>> {
		let row = sqlx::query_as::<_, JobRunRow>(&format!("{RUN_COLUMNS} WHERE id = ?"))
			.bind(run_id)
			.fetch_optional(&self.pool)
			.await?;

		row.map(JobRun::try_from).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_last_run(&self, job_id: &str) -> Result<Option<JobRun>> {
		let row = sqlx::query_as::<_, JobRunRow>(&format!(
			"{RUN_COLUMNS} WHERE job_id = ? ORDER BY started_at DESC LIMIT 1"
		))
		.bind(job_id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(JobRun::try_from).transpose()
	}

	/// Failed runs since the most recent non-failed run.
	#[tracing::instrument(skip(self))]
	pub async fn count_consecutive_failures(&self, job_id: &str) -> Result<u32> {
		let (count,): (i64,) = sqlx::query_as(
			r#"
			SELECT COUNT(*)
			FROM job_runs
			WHERE job_id = ?1
			  AND status = 'failed'
			  AND started_at > COALESCE(
				  (SELECT MAX(started_at) FROM job_runs WHERE job_id = ?1 AND status != 'failed'),
				  ''
			  )
			"#,
		)
		.bind(job_id)
		.fetch_one(&self.pool)
		.await?;

		Ok(count as u32)
	}

	/// Delete completed runs older than `retention_days`. Running rows are kept.
	#[tracing::instrument(skip(self))]
	pub async fn cleanup_old_runs(&self, retention_days: u32) -> Result<u64> {
		let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
		let result = sqlx::query("DELETE FROM job_runs WHERE completed_at < ?")
			.bind(format_ts(&cutoff))
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}
}

#[async_trait]
pub trait JobStore: Send + Sync {
	async fn upsert_definition(&self, def: &JobDefinition) -> Result<()>;
	async fn record_run_start(&self, run: &JobRun) -> Result<()>;
	async fn record_run_complete(
		&self,
		run_id: &str,
		status: JobStatus,
		retry_count: u32,
		error: Option<String>,
		metadata: Option<serde_json::Value>,
	) -> Result<()>;
	async fn get_run(&self, run_id: &str) -> Result<Option<JobRun>>;
	async fn get_last_run(&self, job_id: &str) -> Result<Option<JobRun>>;
	async fn count_consecutive_failures(&self, job_id: &str) -> Result<u32>;
	async fn cleanup_old_runs(&self, retention_days: u32) -> Result<u64>;
}

#[async_trait]
impl JobStore for JobRepository {
	async fn upsert_definition(&self, def: &JobDefinition) -> Result<()> {
		self.upsert_definition(def).await
	}

	async fn record_run_start(&self, run: &JobRun) -> Result<()> {
		self.record_run_start(run).await
	}

	async fn record_run_complete(
		&self,
		run_id: &str,
		status: JobStatus,
		retry_count: u32,
		error: Option<String>,
		metadata: Option<serde_json::Value>,
	) -> Result<()> {
		self
			.record_run_complete(run_id, status, retry_count, error, metadata)
			.await
	}

	async fn get_run(&self, run_id: &str) -> Result<Option<JobRun>> {
		self.get_run(run_id).await
	}

	async fn get_last_run(&self, job_id: &str) -> Result<Option<JobRun>> {
		self.get_last_run(job_id).await
	}

	async fn count_consecutive_failures(&self, job_id: &str) -> Result<u32> {
		self.count_consecutive_failures(job_id).await
	}

	async fn cleanup_old_runs(&self, retention_days: u32) -> Result<u64> {
		self.cleanup_old_runs(retention_days).await
	}
}
