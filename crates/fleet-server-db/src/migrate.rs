// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::SqlitePool;

use crate::error::DbError;

const MIGRATIONS: &[(&str, &str)] = &[
	(
		"001_cluster_configs",
		include_str!("../migrations/001_cluster_configs.sql"),
	),
	(
		"002_applications",
		include_str!("../migrations/002_applications.sql"),
	),
	(
		"003_namespace_cache",
		include_str!("../migrations/003_namespace_cache.sql"),
	),
	("004_jobs", include_str!("../migrations/004_jobs.sql")),
];

/// Apply every schema migration. Safe to run on an already migrated database.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
	for (name, sql) in MIGRATIONS {
		for stmt in sql.split(';').filter(|s| !s.trim().is_empty()) {
			if let Err(e) = sqlx::query(stmt).execute(pool).await {
				let msg = e.to_string();
				if !msg.contains("duplicate column") && !msg.contains("already exists") {
					tracing::error!(migration = %name, error = %msg, "migration failed");
					return Err(e.into());
				}
			}
		}
		tracing::debug!(migration = %name, "migration applied");
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;

	#[tokio::test]
	async fn migrations_are_idempotent() {
		let pool = create_test_pool().await;
		run_migrations(&pool).await.unwrap();
		run_migrations(&pool).await.unwrap();

		let (count,): (i64,) = sqlx::query_as(
			"SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
			 ('cluster_configs', 'applications', 'application_resources', 'namespace_cache', \
			 'job_definitions', 'job_runs')",
		)
		.fetch_one(&pool)
		.await
		.unwrap();
		assert_eq!(count, 6);
	}
}
