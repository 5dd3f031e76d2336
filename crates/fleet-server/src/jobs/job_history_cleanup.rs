// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use fleet_server_jobs::{Job, JobContext, JobError, JobOutput, JobRepository};
use std::sync::Arc;

pub struct JobHistoryCleanupJob {
	repository: Arc<JobRepository>,
	retention_days: u32,
}

impl JobHistoryCleanupJob {
	pub fn new(repository: Arc<JobRepository>, retention_days: u32) -> Self {
		Self {
			repository,
			retention_days,
		}
	}
}

#[async_trait]
impl Job for JobHistoryCleanupJob {
	fn id(&self) -> &str {
		"job-history-cleanup"
	}

	fn name(&self) -> &str {
		"Job History Cleanup"
	}

	fn description(&self) -> &str {
		"Removes job run history older than the retention window"
	}

	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		if ctx.cancellation_token.is_cancelled() {
			return Err(JobError::Cancelled);
		}

		let count = self
			.repository
			.cleanup_old_runs(self.retention_days)
			.await
			.map_err(|e| JobError::retryable(format!("job history cleanup failed: {e}")))?;

		tracing::info!(
			deleted = count,
			retention_days = self.retention_days,
			"job history cleanup completed"
		);
		Ok(
			JobOutput::new(format!("Cleaned up {count} old job run records")).with_metadata(
				serde_json::json!({
					"deleted_count": count,
					"retention_days": self.retention_days
				}),
			),
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{SecondsFormat, Utc};
	use fleet_server_db::testing::create_test_pool;
	use fleet_server_jobs::{CancellationToken, JobDefinition, JobRun, JobStatus, TriggerSource};

	async fn finished_run(repo: &JobRepository, id: &str) {
		repo
			.record_run_start(&JobRun::started(id, "namespace-sync", TriggerSource::Schedule))
			.await
			.unwrap();
		repo
			.record_run_complete(id, JobStatus::Succeeded, 0, None, None)
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn test_cleanup_reports_deleted_runs() {
		let pool = create_test_pool().await;
		let repo = Arc::new(JobRepository::new(pool.clone()));
		repo
			.upsert_definition(&JobDefinition {
				id: "namespace-sync".to_string(),
				name: "Namespace Sync".to_string(),
				description: "Refresh cached namespace listings".to_string(),
				job_type: "periodic".to_string(),
				interval_secs: Some(3600),
				enabled: true,
			})
			.await
			.unwrap();
		finished_run(&repo, "ancient").await;
		finished_run(&repo, "recent").await;

		let long_ago =
			(Utc::now() - chrono::Duration::days(45)).to_rfc3339_opts(SecondsFormat::Nanos, true);
		sqlx::query("UPDATE job_runs SET completed_at = ? WHERE id = 'ancient'")
			.bind(long_ago)
			.execute(&pool)
			.await
			.unwrap();

		let job = JobHistoryCleanupJob::new(Arc::clone(&repo), 30);
		let ctx = JobContext {
			run_id: "cleanup-1".to_string(),
			triggered_by: TriggerSource::Manual,
			cancellation_token: CancellationToken::new(),
		};
		let output = job.run(&ctx).await.unwrap();
		let metadata = output.metadata.unwrap();
		assert_eq!(metadata["deleted_count"], 1);
		assert_eq!(metadata["retention_days"], 30);
		assert!(repo.get_run("ancient").await.unwrap().is_none());
		assert!(repo.get_run("recent").await.unwrap().is_some());

		ctx.cancellation_token.cancel();
		assert!(matches!(job.run(&ctx).await, Err(JobError::Cancelled)));
	}
}
