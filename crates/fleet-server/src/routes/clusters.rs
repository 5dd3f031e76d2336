// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cluster config and namespace HTTP handlers.

use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::IntoResponse,
	Json,
};
use fleet_server_clusters::NamespaceSummary;
use serde::{Deserialize, Serialize};

use crate::{api::AppState, error::ServerError};

#[derive(Debug, Deserialize)]
pub struct UploadClusterRequest {
	pub name: String,
	pub description: Option<String>,
	/// Kubeconfig text, base64 of it, or a `data:` URL.
	pub kubeconfig: String,
}

#[derive(Debug, Deserialize)]
pub struct SetContextRequest {
	pub context: String,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
	pub deleted: bool,
}

/// POST /api/clusters
pub async fn upload_cluster(
	State(state): State<AppState>,
	Json(request): Json<UploadClusterRequest>,
) -> Result<impl IntoResponse, ServerError> {
	if request.name.trim().is_empty() {
		return Err(ServerError::BadRequest("name must not be empty".to_string()));
	}

	let config = state
		.clients
		.register(request.name.trim(), request.description, &request.kubeconfig)
		.await?;

	tracing::info!(cluster_id = %config.id, name = %config.name, "cluster config uploaded");
	Ok((StatusCode::CREATED, Json(config)))
}

/// GET /api/clusters
pub async fn list_clusters(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
	Ok(Json(state.configs.list_configs().await?))
}

/// GET /api/clusters/{id}
pub async fn get_cluster(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
	let config = state
		.configs
		.get_config(&id)
		.await?
		.ok_or_else(|| ServerError::NotFound(format!("cluster config not found: {id}")))?;
	Ok(Json(config))
}

/// DELETE /api/clusters/{id}
///
/// Refused with 409 while applications still reference the config.
pub async fn delete_cluster(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
	let deleted = state.configs.delete_config(&id).await?;
	if !deleted {
		return Err(ServerError::NotFound(format!("cluster config not found: {id}")));
	}

	state.clients.remove_client(&id);
	state.namespaces.forget(&id);
	state.queries.invalidate(&id);
	tracing::info!(cluster_id = %id, "cluster config deleted");
	Ok(Json(DeletedResponse { deleted }))
}

/// PUT /api/clusters/{id}/context
pub async fn set_context(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Json(request): Json<SetContextRequest>,
) -> Result<impl IntoResponse, ServerError> {
	let config = state.clients.set_context(&id, &request.context).await?;
	state.namespaces.forget(&id);
	state.queries.invalidate(&id);
	Ok(Json(config))
}

/// GET /api/clusters/{id}/namespaces
pub async fn list_namespaces(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
	let entries = state.namespaces.list(&id).await?;
	let now = chrono::Utc::now();
	let summaries: Vec<NamespaceSummary> = entries
		.iter()
		.map(|entry| NamespaceSummary::from_entry(entry, now))
		.collect();
	Ok(Json(summaries))
}

/// POST /api/clusters/{id}/namespaces/refresh
pub async fn refresh_namespaces(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
	let entries = state.namespaces.refresh(&id).await?;
	let now = chrono::Utc::now();
	let summaries: Vec<NamespaceSummary> = entries
		.iter()
		.map(|entry| NamespaceSummary::from_entry(entry, now))
		.collect();
	Ok(Json(summaries))
}
