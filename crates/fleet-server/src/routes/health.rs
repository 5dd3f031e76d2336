// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Health HTTP handler.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use fleet_server_jobs::{HealthState, JobsHealthStatus};
use serde::Serialize;

use crate::api::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
	Healthy,
	Degraded,
	Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
	pub status: HealthStatus,
	pub latency_ms: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
	pub status: HealthStatus,
	pub timestamp: String,
	pub version: &'static str,
	pub database: DatabaseHealth,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub jobs: Option<JobsHealthStatus>,
}

async fn check_database(pool: &sqlx::SqlitePool) -> DatabaseHealth {
	let start = tokio::time::Instant::now();
	let result = sqlx::query("SELECT 1").execute(pool).await;
	let latency_ms = start.elapsed().as_millis() as u64;

	match result {
		Ok(_) => DatabaseHealth {
			status: HealthStatus::Healthy,
			latency_ms,
			error: None,
		},
		Err(e) => DatabaseHealth {
			status: HealthStatus::Unhealthy,
			latency_ms,
			error: Some(e.to_string()),
		},
	}
}

/// The database decides liveness; unhealthy jobs only degrade.
fn aggregate_status(database: &DatabaseHealth, jobs: Option<&JobsHealthStatus>) -> HealthStatus {
	if database.status == HealthStatus::Unhealthy {
		return HealthStatus::Unhealthy;
	}
	match jobs.map(|j| j.status) {
		Some(HealthState::Degraded) | Some(HealthState::Unhealthy) => HealthStatus::Degraded,
		_ => HealthStatus::Healthy,
	}
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
	let database = check_database(&state.pool).await;
	let jobs = match &state.job_scheduler {
		Some(scheduler) => Some(scheduler.health_status().await),
		None => None,
	};

	let status = aggregate_status(&database, jobs.as_ref());
	let response = HealthResponse {
		status,
		timestamp: chrono::Utc::now().to_rfc3339(),
		version: env!("CARGO_PKG_VERSION"),
		database,
		jobs,
	};

	let http_status = match status {
		HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
		HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
	};
	(http_status, Json(response))
}
