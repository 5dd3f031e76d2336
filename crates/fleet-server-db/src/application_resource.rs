// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::{DbError, Result};
use crate::time::{format_ts, parse_ts};

/// Bookkeeping for one object applied by the last reconcile of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationResource {
	pub id: String,
	pub application_id: String,
	pub kind: String,
	pub name: String,
	pub namespace: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl ApplicationResource {
	pub fn new(
		application_id: impl Into<String>,
		kind: impl Into<String>,
		name: impl Into<String>,
		namespace: impl Into<String>,
	) -> Self {
		let now = Utc::now();
		Self {
			id: uuid::Uuid::new_v4().to_string(),
			application_id: application_id.into(),
			kind: kind.into(),
			name: name.into(),
			namespace: namespace.into(),
			created_at: now,
			updated_at: now,
		}
	}
}

#[derive(sqlx::FromRow)]
struct ApplicationResourceRow {
	id: String,
	application_id: String,
	kind: String,
	name: String,
	namespace: String,
	created_at: String,
	updated_at: String,
}

impl TryFrom<ApplicationResourceRow> for ApplicationResource {
	type Error = DbError;

	fn try_from(row: ApplicationResourceRow) -> Result<Self> {
		Ok(ApplicationResource {
			created_at: parse_ts("created_at", &row.created_at)?,
			updated_at: parse_ts("updated_at", &row.updated_at)?,
			id: row.id,
			application_id: row.application_id,
			kind: row.kind,
			name: row.name,
			namespace: row.namespace,
		})
	}
}

#[derive(Clone)]
pub struct ApplicationResourceRepository {
	pool: SqlitePool,
}

impl ApplicationResourceRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_for_application(&self, application_id: &str) -> Result<Vec<ApplicationResource>> {
		let rows = sqlx::query_as::<_, ApplicationResourceRow>(
			r#"
			SELECT id, application_id, kind, name, namespace, created_at, updated_at
			FROM application_resources
			WHERE application_id = ?
			ORDER BY kind, name
			"#,
		)
		.bind(application_id)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(ApplicationResource::try_from).collect()
	}

	/// Replace the resource set recorded for an application.
	///
	/// Rows for a (kind, name) that survives keep their original `created_at`.
	#[tracing::instrument(skip(self, resources), fields(count = resources.len()))]
	pub async fn replace_for_application(
		&self,
		application_id: &str,
		resources: &[ApplicationResource],
	) -> Result<()> {
		let now = format_ts(&Utc::now());
		let mut tx = self.pool.begin().await?;

		let mut keep = Vec::with_capacity(resources.len());
		for resource in resources {
			sqlx::query(
				r#"
				INSERT INTO application_resources (id, application_id, kind, name, namespace, created_at, updated_at)
				VALUES (?, ?, ?, ?, ?, ?, ?)
				ON CONFLICT(application_id, kind, name) DO UPDATE SET
					namespace = excluded.namespace,
					updated_at = excluded.updated_at
				"#,
			)
			.bind(&resource.id)
			.bind(application_id)
			.bind(&resource.kind)
			.bind(&resource.name)
			.bind(&resource.namespace)
			.bind(format_ts(&resource.created_at))
			.bind(&now)
			.execute(&mut *tx)
			.await?;
			keep.push(format!("{}/{}", resource.kind, resource.name));
		}

		let existing = sqlx::query_as::<_, (String, String, String)>(
			"SELECT id, kind, name FROM application_resources WHERE application_id = ?",
		)
		.bind(application_id)
		.fetch_all(&mut *tx)
		.await?;

		for (id, kind, name) in existing {
			if !keep.contains(&format!("{kind}/{name}")) {
				sqlx::query("DELETE FROM application_resources WHERE id = ?")
					.bind(&id)
					.execute(&mut *tx)
					.await?;
			}
		}

		tx.commit().await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_for_application(&self, application_id: &str) -> Result<u64> {
		let result = sqlx::query("DELETE FROM application_resources WHERE application_id = ?")
			.bind(application_id)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}
}

#[async_trait]
pub trait ApplicationResourceStore: Send + Sync {
	async fn list_for_application(&self, application_id: &str) -> Result<Vec<ApplicationResource>>;
	async fn replace_for_application(
		&self,
		application_id: &str,
		resources: &[ApplicationResource],
	) -> Result<()>;
	async fn delete_for_application(&self, application_id: &str) -> Result<u64>;
}

#[async_trait]
impl ApplicationResourceStore for ApplicationResourceRepository {
	async fn list_for_application(&self, application_id: &str) -> Result<Vec<ApplicationResource>> {
		self.list_for_application(application_id).await
	}

	async fn replace_for_application(
		&self,
		application_id: &str,
		resources: &[ApplicationResource],
	) -> Result<()> {
		self.replace_for_application(application_id, resources).await
	}

	async fn delete_for_application(&self, application_id: &str) -> Result<u64> {
		self.delete_for_application(application_id).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::application::{Application, ApplicationRepository};
	use crate::testing::create_test_pool;

	async fn setup() -> (ApplicationResourceRepository, Application) {
		let pool = create_test_pool().await;
		let app = Application::new("demo", "default", "cluster-1", "nginx");
		ApplicationRepository::new(pool.clone())
			.create_application(&app)
			.await
			.unwrap();
		(ApplicationResourceRepository::new(pool), app)
	}

	#[tokio::test]
	async fn test_replace_keeps_created_at_and_drops_stale_rows() {
		let (repo, app) = setup().await;

		let deployment = ApplicationResource::new(&app.id, "Deployment", "demo", "default");
		let config = ApplicationResource::new(&app.id, "ConfigMap", "demo-config", "default");
		repo
			.replace_for_application(&app.id, &[deployment.clone(), config])
			.await
			.unwrap();
		assert_eq!(repo.list_for_application(&app.id).await.unwrap().len(), 2);

		let again = ApplicationResource::new(&app.id, "Deployment", "demo", "default");
		let service = ApplicationResource::new(&app.id, "Service", "demo", "default");
		repo
			.replace_for_application(&app.id, &[again, service])
			.await
			.unwrap();

		let rows = repo.list_for_application(&app.id).await.unwrap();
		let kinds: Vec<_> = rows.iter().map(|r| r.kind.as_str()).collect();
		assert_eq!(kinds, vec!["Deployment", "Service"]);
		assert_eq!(rows[0].id, deployment.id);
		assert_eq!(rows[0].created_at, deployment.created_at);
	}

	#[tokio::test]
	async fn test_delete_for_application() {
		let (repo, app) = setup().await;
		repo
			.replace_for_application(
				&app.id,
				&[ApplicationResource::new(&app.id, "Deployment", "demo", "default")],
			)
			.await
			.unwrap();

		assert_eq!(repo.delete_for_application(&app.id).await.unwrap(), 1);
		assert!(repo.list_for_application(&app.id).await.unwrap().is_empty());
	}
}
