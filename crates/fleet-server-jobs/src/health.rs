// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::types::{JobRun, JobStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct JobHealthStatus {
	pub job_id: String,
	pub name: String,
	pub status: HealthState,
	pub last_run: Option<LastRunInfo>,
	pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastRunInfo {
	pub run_id: String,
	pub status: JobStatus,
	pub started_at: DateTime<Utc>,
	pub duration_ms: Option<i64>,
	pub error: Option<String>,
}

impl From<JobRun> for LastRunInfo {
	fn from(run: JobRun) -> Self {
		Self {
			run_id: run.id,
			status: run.status,
			started_at: run.started_at,
			duration_ms: run.duration_ms,
			error: run.error_message,
		}
	}
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
	Healthy,
	Degraded,
	Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobsHealthStatus {
	pub status: HealthState,
	pub jobs: Vec<JobHealthStatus>,
}

/// Health of a single job from its most recent run and failure streak.
pub(crate) fn determine_health_state(last_run: Option<&JobRun>, consecutive_failures: u32) -> HealthState {
	match last_run {
		None => HealthState::Healthy,
		Some(run) => match run.status {
			JobStatus::Succeeded | JobStatus::Running | JobStatus::Cancelled => HealthState::Healthy,
			JobStatus::Failed => {
				if consecutive_failures >= 3 {
					HealthState::Unhealthy
				} else if consecutive_failures >= 1 {
					HealthState::Degraded
				} else {
					HealthState::Healthy
				}
			}
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::TriggerSource;

	fn run_with_status(status: JobStatus) -> JobRun {
		let mut run = JobRun::started("run-1", "job-1", TriggerSource::Schedule);
		run.status = status;
		run
	}

	#[test]
	fn test_no_last_run_is_healthy() {
		assert_eq!(determine_health_state(None, 0), HealthState::Healthy);
	}

	#[test]
	fn test_non_failed_runs_are_healthy() {
		for status in [JobStatus::Succeeded, JobStatus::Running, JobStatus::Cancelled] {
			let run = run_with_status(status);
			assert_eq!(determine_health_state(Some(&run), 0), HealthState::Healthy);
		}
	}

	#[test]
	fn test_failure_streak_thresholds() {
		let run = run_with_status(JobStatus::Failed);
		assert_eq!(determine_health_state(Some(&run), 0), HealthState::Healthy);
		assert_eq!(determine_health_state(Some(&run), 1), HealthState::Degraded);
		assert_eq!(determine_health_state(Some(&run), 2), HealthState::Degraded);
		assert_eq!(determine_health_state(Some(&run), 3), HealthState::Unhealthy);
		assert_eq!(determine_health_state(Some(&run), 7), HealthState::Unhealthy);
	}

	#[test]
	fn test_health_state_ordering() {
		assert!(HealthState::Unhealthy > HealthState::Degraded);
		assert!(HealthState::Degraded > HealthState::Healthy);
	}
}
