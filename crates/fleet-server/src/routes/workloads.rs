// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Workload listing and pod log handlers.
//!
//! Listings degrade to an empty array when the cluster cannot be reached.
//! An unknown cluster id is a 404, and a pod listing already in flight for the
//! same namespace answers 429 `REQUEST_IN_PROGRESS`.

use axum::{
	extract::{Path, Query, State},
	response::IntoResponse,
	Json,
};
use fleet_server_k8s::{LogOptions, ResourceKind};
use serde::Deserialize;

use crate::{api::AppState, error::ServerError};

#[derive(Debug, Default, Deserialize)]
pub struct NamespaceQuery {
	pub namespace: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
	pub namespace: Option<String>,
	pub container: Option<String>,
	pub tail_lines: Option<i64>,
	#[serde(default)]
	pub timestamps: bool,
}

impl LogsQuery {
	pub(crate) fn to_options(&self) -> Result<LogOptions, ServerError> {
		if self.tail_lines.is_some_and(|n| n < 0) {
			return Err(ServerError::BadRequest(
				"tail_lines must not be negative".to_string(),
			));
		}
		Ok(LogOptions {
			container: self.container.clone(),
			tail_lines: self.tail_lines,
			timestamps: self.timestamps,
		})
	}
}

pub(crate) fn parse_kind(kind: &str) -> Result<ResourceKind, ServerError> {
	kind.parse::<ResourceKind>()
		.map_err(|e| ServerError::BadRequest(e.to_string()))
}

/// GET /api/clusters/{id}/{kind}
pub async fn list_workloads(
	State(state): State<AppState>,
	Path((id, kind)): Path<(String, String)>,
	Query(query): Query<NamespaceQuery>,
) -> Result<impl IntoResponse, ServerError> {
	let kind = parse_kind(&kind)?;
	let listing = state
		.queries
		.list(&id, query.namespace.as_deref(), kind)
		.await?;
	Ok(Json(listing))
}

/// GET /api/clusters/{id}/pods/{name}/logs
pub async fn pod_logs(
	State(state): State<AppState>,
	Path((id, name)): Path<(String, String)>,
	Query(query): Query<LogsQuery>,
) -> Result<impl IntoResponse, ServerError> {
	let opts = query.to_options()?;
	let logs = state
		.queries
		.pod_logs(&id, query.namespace.as_deref(), &name, &opts)
		.await?;
	Ok(logs)
}
