// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_server_clusters::{NamespaceCache, ResourceQueries};
use fleet_server_jobs::{Job, JobContext, JobError, JobOutput};
use tracing::instrument;

/// Drops in-memory namespace snapshots and pod listings past `max_age`.
pub struct CacheJanitorJob {
	namespaces: Arc<NamespaceCache>,
	queries: Arc<ResourceQueries>,
	max_age: Duration,
}

impl CacheJanitorJob {
	pub fn new(namespaces: Arc<NamespaceCache>, queries: Arc<ResourceQueries>, max_age: Duration) -> Self {
		Self {
			namespaces,
			queries,
			max_age,
		}
	}
}

#[async_trait]
impl Job for CacheJanitorJob {
	fn id(&self) -> &str {
		"cache-janitor"
	}

	fn name(&self) -> &str {
		"Cache Janitor"
	}

	fn description(&self) -> &str {
		"Evict stale in-memory cluster query results"
	}

	#[instrument(skip(self, ctx), fields(job_id = "cache-janitor"))]
	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		if ctx.cancellation_token.is_cancelled() {
			return Err(JobError::Cancelled);
		}

		let snapshots = self.namespaces.evict_older_than(self.max_age);
		let listings = self.queries.evict_older_than(self.max_age);
		tracing::debug!(snapshots, listings, "cache janitor pass");

		Ok(
			JobOutput::new(format!("Evicted {snapshots} namespace snapshot(s) and {listings} listing(s)"))
				.with_metadata(serde_json::json!({
					"namespace_snapshots": snapshots,
					"pod_listings": listings,
				})),
		)
	}
}
