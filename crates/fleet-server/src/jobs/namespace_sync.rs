// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use fleet_server_clusters::NamespaceCache;
use fleet_server_jobs::{Job, JobContext, JobError, JobOutput};
use tracing::instrument;

/// Refreshes the namespace cache of every active cluster config.
///
/// One unreachable cluster is counted as failed and does not stop the others.
pub struct NamespaceSyncJob {
	namespaces: Arc<NamespaceCache>,
}

impl NamespaceSyncJob {
	pub fn new(namespaces: Arc<NamespaceCache>) -> Self {
		Self { namespaces }
	}
}

#[async_trait]
impl Job for NamespaceSyncJob {
	fn id(&self) -> &str {
		"namespace-sync"
	}

	fn name(&self) -> &str {
		"Namespace Sync"
	}

	fn description(&self) -> &str {
		"Refresh cached namespace listings for all cluster configs"
	}

	#[instrument(skip(self, ctx), fields(job_id = "namespace-sync"))]
	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		if ctx.cancellation_token.is_cancelled() {
			return Err(JobError::Cancelled);
		}

		let report = self.namespaces.sync_all().await.map_err(|e| {
			tracing::error!(error = %e, "namespace sync failed");
			JobError::retryable(e.to_string())
		})?;

		Ok(JobOutput::new(format!(
			"Synced {} cluster(s), {} skipped, {} failed",
			report.synced, report.skipped, report.failed
		))
		.with_metadata(serde_json::json!({
			"synced": report.synced,
			"skipped": report.skipped,
			"failed": report.failed,
		})))
	}
}
