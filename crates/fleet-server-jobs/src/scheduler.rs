// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Supervised job scheduler.
//!
//! Every tick of a periodic job runs in its own task. An error or a panic in
//! that task is logged and recorded as a failed run, and the schedule carries
//! on with the next tick.

use crate::context::{CancellationToken, JobContext};
use crate::error::{JobError, Result};
use crate::health::{determine_health_state, HealthState, JobHealthStatus, JobsHealthStatus};
use crate::job::Job;
use crate::types::{JobDefinition, JobRepository, JobRun, JobStatus, JobType, TriggerSource};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

const BASE_RETRY_DELAY_SECS: u64 = 1;
const MAX_RETRY_DELAY_SECS: u64 = 60;
const RETRY_FACTOR: f64 = 2.0;
const MAX_RETRIES: u32 = 3;

struct RegisteredJob {
	job: Arc<dyn Job>,
	job_type: JobType,
	cancellation_token: CancellationToken,
}

pub struct JobScheduler {
	jobs: HashMap<String, RegisteredJob>,
	repository: Arc<JobRepository>,
	shutdown_tx: broadcast::Sender<()>,
	handles: Mutex<Vec<JoinHandle<()>>>,
}

impl JobScheduler {
	pub fn new(repository: Arc<JobRepository>) -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);
		Self {
			jobs: HashMap::new(),
			repository,
			shutdown_tx,
			handles: Mutex::new(Vec::new()),
		}
	}

	/// Run `job` every `interval`, first one `interval` after start.
	pub fn register_periodic(&mut self, job: Arc<dyn Job>, interval: Duration) {
		self.register_periodic_with_delay(job, interval, interval);
	}

	pub fn register_periodic_with_delay(
		&mut self,
		job: Arc<dyn Job>,
		interval: Duration,
		initial_delay: Duration,
	) {
		self.insert(
			job,
			JobType::Periodic {
				interval,
				initial_delay,
			},
		);
	}

	pub fn register_one_shot(&mut self, job: Arc<dyn Job>) {
		self.insert(job, JobType::OneShot);
	}

	fn insert(&mut self, job: Arc<dyn Job>, job_type: JobType) {
		let id = job.id().to_string();
		self.jobs.insert(
			id,
			RegisteredJob {
				job,
				job_type,
				cancellation_token: CancellationToken::new(),
			},
		);
	}

	#[instrument(skip(self))]
	pub async fn start(&self) -> Result<()> {
		let mut handles = self.handles.lock().await;

		for (job_id, registered) in &self.jobs {
			let def = JobDefinition {
				id: job_id.clone(),
				name: registered.job.name().to_string(),
				description: registered.job.description().to_string(),
				job_type: registered.job_type.as_str().to_string(),
				interval_secs: match &registered.job_type {
					JobType::Periodic { interval, .. } => Some(interval.as_secs() as i64),
					JobType::OneShot => None,
				},
				enabled: true,
			};
			self.repository.upsert_definition(&def).await?;

			if let JobType::Periodic {
				interval,
				initial_delay,
			} = registered.job_type
			{
				let job = Arc::clone(&registered.job);
				let repository = Arc::clone(&self.repository);
				let mut shutdown_rx = self.shutdown_tx.subscribe();
				let cancellation_token = registered.cancellation_token.clone();
				let job_id = job_id.clone();

				let handle = tokio::spawn(async move {
					let mut delay = initial_delay;
					loop {
						tokio::select! {
							_ = tokio::time::sleep(delay) => {
								delay = interval;
								if cancellation_token.is_cancelled() {
									continue;
								}
								let result = run_supervised(
									&job,
									&repository,
									TriggerSource::Schedule,
									&cancellation_token,
								).await;
								if let Err(e @ (JobError::Repository(_) | JobError::Database(_))) = result {
									error!(job_id = %job_id, error = %e, "Failed to record scheduled run");
								}
							}
							_ = shutdown_rx.recv() => {
								info!(job_id = %job_id, "Shutting down periodic job");
								break;
							}
						}
					}
				});

				handles.push(handle);
			}
		}

		info!(job_count = handles.len(), "Job scheduler started");
		Ok(())
	}

	/// Run a registered job now, outside its schedule.
	#[instrument(skip(self))]
	pub async fn trigger_job(&self, job_id: &str, triggered_by: TriggerSource) -> Result<String> {
		let registered = self
			.jobs
			.get(job_id)
			.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

		run_supervised(
			&registered.job,
			&self.repository,
			triggered_by,
			&registered.cancellation_token,
		)
		.await
	}

	#[instrument(skip(self))]
	pub async fn cancel_job(&self, job_id: &str) -> Result<()> {
		let registered = self
			.jobs
			.get(job_id)
			.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

		registered.cancellation_token.cancel();
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn shutdown(&self) {
		let _ = self.shutdown_tx.send(());

		let mut handles = self.handles.lock().await;
		for handle in handles.drain(..) {
			let _ = handle.await;
		}

		info!("Job scheduler shut down");
	}

	pub fn job_ids(&self) -> Vec<String> {
		self.jobs.keys().cloned().collect()
	}

	#[instrument(skip(self))]
	pub async fn job_status(&self, job_id: &str) -> Option<JobHealthStatus> {
		let registered = self.jobs.get(job_id)?;

		let last_run = self.repository.get_last_run(job_id).await.ok().flatten();
		let consecutive_failures = self
			.repository
			.count_consecutive_failures(job_id)
			.await
			.unwrap_or(0);

		Some(JobHealthStatus {
			job_id: job_id.to_string(),
			name: registered.job.name().to_string(),
			status: determine_health_state(last_run.as_ref(), consecutive_failures),
			last_run: last_run.map(Into::into),
			consecutive_failures,
		})
	}

	#[instrument(skip(self))]
	pub async fn health_status(&self) -> JobsHealthStatus {
		let mut jobs = Vec::new();
		let mut worst_state = HealthState::Healthy;

		for job_id in self.jobs.keys() {
			if let Some(status) = self.job_status(job_id).await {
				worst_state = worst_state.max(status.status);
				jobs.push(status);
			}
		}
		jobs.sort_by(|a, b| a.job_id.cmp(&b.job_id));

		JobsHealthStatus {
			status: worst_state,
			jobs,
		}
	}
}

/// Run one attempt chain in its own task so a panic stays at this boundary.
async fn run_supervised(
	job: &Arc<dyn Job>,
	repository: &Arc<JobRepository>,
	triggered_by: TriggerSource,
	cancellation_token: &CancellationToken,
) -> Result<String> {
	let run_id = uuid::Uuid::new_v4().to_string();
	let task = tokio::spawn(run_job_with_retry(
		Arc::clone(job),
		Arc::clone(repository),
		triggered_by,
		cancellation_token.clone(),
		run_id.clone(),
	));

	match task.await {
		Ok(result) => result,
		Err(join_err) => {
			let message = if join_err.is_panic() {
				"job panicked".to_string()
			} else {
				format!("job task aborted: {join_err}")
			};
			error!(job_id = %job.id(), run_id = %run_id, error = %message, "Job task terminated abnormally");

			if let Err(e) = repository
				.record_run_complete(&run_id, JobStatus::Failed, 0, Some(message.clone()), None)
				.await
			{
				warn!(job_id = %job.id(), run_id = %run_id, error = %e, "Failed to record terminated run");
			}
			Err(JobError::Panicked(message))
		}
	}
}

async fn run_job_with_retry(
	job: Arc<dyn Job>,
	repository: Arc<JobRepository>,
	triggered_by: TriggerSource,
	cancellation_token: CancellationToken,
	run_id: String,
) -> Result<String> {
	let mut retry_count = 0u32;

	repository
		.record_run_start(&JobRun::started(&run_id, job.id(), triggered_by))
		.await?;

	loop {
		let ctx = JobContext {
			run_id: run_id.clone(),
			triggered_by: if retry_count > 0 {
				TriggerSource::Retry
			} else {
				triggered_by
			},
			cancellation_token: cancellation_token.clone(),
		};

		match job.run(&ctx).await {
			Ok(output) => {
				repository
					.record_run_complete(
						&run_id,
						JobStatus::Succeeded,
						retry_count,
						None,
						output.metadata,
					)
					.await?;
				info!(job_id = %job.id(), run_id = %run_id, message = %output.message, "Job completed successfully");
				return Ok(run_id);
			}
			Err(JobError::Cancelled) => {
				repository
					.record_run_complete(&run_id, JobStatus::Cancelled, retry_count, None, None)
					.await?;
				info!(job_id = %job.id(), run_id = %run_id, "Job cancelled");
				return Err(JobError::Cancelled);
			}
			Err(JobError::Failed { message, retryable }) => {
				if retryable && retry_count < MAX_RETRIES && !cancellation_token.is_cancelled() {
					retry_count += 1;
					let delay_secs = calculate_backoff_delay(retry_count);
					warn!(
						job_id = %job.id(),
						run_id = %run_id,
						retry_count,
						delay_secs,
						error = %message,
						"Job failed, retrying"
					);
					tokio::time::sleep(Duration::from_secs(delay_secs)).await;
					continue;
				}

				repository
					.record_run_complete(
						&run_id,
						JobStatus::Failed,
						retry_count,
						Some(message.clone()),
						None,
					)
					.await?;
				warn!(job_id = %job.id(), run_id = %run_id, error = %message, "Job failed");
				return Err(JobError::Failed { message, retryable });
			}
			Err(e) => {
				let message = e.to_string();
				repository
					.record_run_complete(
						&run_id,
						JobStatus::Failed,
						retry_count,
						Some(message.clone()),
						None,
					)
					.await?;
				warn!(job_id = %job.id(), run_id = %run_id, error = %message, "Job failed with error");
				return Err(e);
			}
		}
	}
}

pub(crate) fn calculate_backoff_delay(retry_count: u32) -> u64 {
	let delay = BASE_RETRY_DELAY_SECS as f64 * RETRY_FACTOR.powi(retry_count as i32 - 1);
	(delay as u64).min(MAX_RETRY_DELAY_SECS)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::JobOutput;
	use async_trait::async_trait;
	use fleet_server_db::testing::create_test_pool;
	use std::sync::atomic::{AtomicU32, Ordering};

	enum Behaviour {
		Succeed,
		FailFatal,
		Panic,
	}

	struct MockJob {
		id: String,
		behaviour: Behaviour,
		runs: AtomicU32,
	}

	impl MockJob {
		fn new(id: &str, behaviour: Behaviour) -> Arc<Self> {
			Arc::new(Self {
				id: id.to_string(),
				behaviour,
				runs: AtomicU32::new(0),
			})
		}
	}

	#[async_trait]
	impl Job for MockJob {
		fn id(&self) -> &str {
			&self.id
		}

		fn name(&self) -> &str {
			"Mock job"
		}

		fn description(&self) -> &str {
			"A mock job for testing"
		}

		async fn run(&self, _ctx: &JobContext) -> std::result::Result<JobOutput, JobError> {
			self.runs.fetch_add(1, Ordering::SeqCst);
			match self.behaviour {
				Behaviour::Succeed => Ok(JobOutput::new("done")),
				Behaviour::FailFatal => Err(JobError::fatal("cluster unreachable")),
				Behaviour::Panic => panic!("job exploded"),
			}
		}
	}

	async fn scheduler_with(jobs: Vec<(Arc<MockJob>, Option<Duration>)>) -> (JobScheduler, Arc<JobRepository>) {
		let repository = Arc::new(JobRepository::new(create_test_pool().await));
		let mut scheduler = JobScheduler::new(Arc::clone(&repository));
		for (job, interval) in jobs {
			match interval {
				Some(interval) => scheduler.register_periodic_with_delay(job, interval, Duration::ZERO),
				None => scheduler.register_one_shot(job),
			}
		}
		(scheduler, repository)
	}

	#[test]
	fn test_calculate_backoff_delay() {
		assert_eq!(calculate_backoff_delay(1), BASE_RETRY_DELAY_SECS);
		assert_eq!(calculate_backoff_delay(2), 2);
		assert_eq!(calculate_backoff_delay(3), 4);
		assert_eq!(calculate_backoff_delay(10), MAX_RETRY_DELAY_SECS);
		assert_eq!(calculate_backoff_delay(100), MAX_RETRY_DELAY_SECS);
	}

	#[tokio::test]
	async fn test_register_jobs() {
		let (scheduler, _) = scheduler_with(vec![
			(MockJob::new("periodic-job", Behaviour::Succeed), Some(Duration::from_secs(60))),
			(MockJob::new("oneshot-job", Behaviour::Succeed), None),
		])
		.await;

		let mut ids = scheduler.job_ids();
		ids.sort();
		assert_eq!(ids, vec!["oneshot-job", "periodic-job"]);
	}

	#[tokio::test]
	async fn test_trigger_nonexistent_job_returns_not_found() {
		let (scheduler, _) = scheduler_with(vec![]).await;

		match scheduler.trigger_job("missing", TriggerSource::Manual).await {
			Err(JobError::NotFound(id)) => assert_eq!(id, "missing"),
			other => panic!("Expected NotFound error, got: {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_trigger_records_successful_run() {
		let job = MockJob::new("oneshot", Behaviour::Succeed);
		let (scheduler, repository) = scheduler_with(vec![(job, None)]).await;
		scheduler.start().await.unwrap();

		let run_id = scheduler
			.trigger_job("oneshot", TriggerSource::Manual)
			.await
			.unwrap();

		let run = repository.get_run(&run_id).await.unwrap().unwrap();
		assert_eq!(run.status, JobStatus::Succeeded);
		assert_eq!(run.triggered_by, TriggerSource::Manual);
	}

	#[tokio::test]
	async fn test_panicking_job_is_recorded_as_failed() {
		let job = MockJob::new("panics", Behaviour::Panic);
		let (scheduler, repository) = scheduler_with(vec![(job, None)]).await;
		scheduler.start().await.unwrap();

		let err = scheduler
			.trigger_job("panics", TriggerSource::Manual)
			.await
			.unwrap_err();
		assert!(matches!(err, JobError::Panicked(_)));

		let last = repository.get_last_run("panics").await.unwrap().unwrap();
		assert_eq!(last.status, JobStatus::Failed);
		assert_eq!(last.error_message.as_deref(), Some("job panicked"));
	}

	#[tokio::test]
	async fn test_periodic_schedule_survives_panics() {
		let job = MockJob::new("flaky", Behaviour::Panic);
		let (scheduler, repository) =
			scheduler_with(vec![(Arc::clone(&job), Some(Duration::from_millis(10)))]).await;
		scheduler.start().await.unwrap();

		tokio::time::sleep(Duration::from_millis(150)).await;
		scheduler.shutdown().await;

		assert!(job.runs.load(Ordering::SeqCst) >= 2);
		assert!(repository.count_consecutive_failures("flaky").await.unwrap() >= 2);
	}

	#[tokio::test]
	async fn test_health_degrades_with_failures() {
		let failing = MockJob::new("failing", Behaviour::FailFatal);
		let healthy = MockJob::new("healthy", Behaviour::Succeed);
		let (scheduler, _) = scheduler_with(vec![(failing, None), (healthy, None)]).await;
		scheduler.start().await.unwrap();

		scheduler.trigger_job("healthy", TriggerSource::Manual).await.unwrap();
		let _ = scheduler.trigger_job("failing", TriggerSource::Manual).await;

		let health = scheduler.health_status().await;
		assert_eq!(health.status, HealthState::Degraded);
		assert_eq!(health.jobs.len(), 2);
		assert_eq!(health.jobs[0].job_id, "failing");
		assert_eq!(health.jobs[0].consecutive_failures, 1);

		for _ in 0..2 {
			let _ = scheduler.trigger_job("failing", TriggerSource::Manual).await;
		}
		assert_eq!(scheduler.health_status().await.status, HealthState::Unhealthy);
	}

	#[tokio::test]
	async fn test_cancelled_periodic_job_skips_ticks() {
		let job = MockJob::new("cancel-me", Behaviour::Succeed);
		let (scheduler, _) =
			scheduler_with(vec![(Arc::clone(&job), Some(Duration::from_millis(10)))]).await;
		scheduler.cancel_job("cancel-me").await.unwrap();
		scheduler.start().await.unwrap();

		tokio::time::sleep(Duration::from_millis(60)).await;
		scheduler.shutdown().await;

		assert_eq!(job.runs.load(Ordering::SeqCst), 0);
	}
}
