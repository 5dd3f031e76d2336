// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application HTTP handlers.

use axum::{
	extract::{Path, Query, State},
	http::StatusCode,
	response::IntoResponse,
	Json,
};
use fleet_server_db::ApplicationFilter;
use fleet_server_deploy::{ApplicationUpdate, DeleteApplicationOptions, NewApplication};
use serde::{Deserialize, Serialize};

use crate::{api::AppState, error::ServerError, routes::resources::parse_propagation};

#[derive(Debug, Default, Deserialize)]
pub struct DeleteApplicationQuery {
	pub delete_resources: Option<bool>,
	pub propagation: Option<String>,
	#[serde(default)]
	pub force: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct TeardownQuery {
	pub propagation: Option<String>,
	#[serde(default)]
	pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct DeployAccepted {
	pub application_id: String,
	pub status: &'static str,
}

/// GET /api/applications
pub async fn list_applications(
	State(state): State<AppState>,
	Query(filter): Query<ApplicationFilter>,
) -> Result<impl IntoResponse, ServerError> {
	Ok(Json(state.applications.list(&filter).await?))
}

/// POST /api/applications
///
/// Answers 201 as soon as the record is stored; the first deploy runs in the
/// background.
pub async fn create_application(
	State(state): State<AppState>,
	Json(request): Json<NewApplication>,
) -> Result<impl IntoResponse, ServerError> {
	let app = state.applications.create(request).await?;
	Ok((StatusCode::CREATED, Json(app)))
}

/// GET /api/applications/{id}
pub async fn get_application(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
	Ok(Json(state.applications.get(&id).await?))
}

/// PUT /api/applications/{id}
pub async fn update_application(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Json(update): Json<ApplicationUpdate>,
) -> Result<impl IntoResponse, ServerError> {
	Ok(Json(state.applications.update(&id, update).await?))
}

/// DELETE /api/applications/{id}
pub async fn delete_application(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Query(query): Query<DeleteApplicationQuery>,
) -> Result<impl IntoResponse, ServerError> {
	let options = DeleteApplicationOptions {
		delete_resources: query.delete_resources.unwrap_or(true),
		propagation: parse_propagation(query.propagation.as_deref())?,
		force: query.force,
	};
	let outcome = state.applications.delete(&id, &options).await?;
	Ok(Json(outcome))
}

/// POST /api/applications/{id}/deploy
pub async fn deploy_application(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
	// Dropping the handle detaches the reconcile.
	let _ = state.applications.orchestrator().deploy(&id).await?;
	Ok((
		StatusCode::ACCEPTED,
		Json(DeployAccepted {
			application_id: id,
			status: "deploying",
		}),
	))
}

/// GET /api/applications/{id}/status
pub async fn deployment_status(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
	Ok(Json(state.applications.orchestrator().deployment_status(&id).await?))
}

/// DELETE /api/applications/{id}/resources
pub async fn delete_application_resources(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Query(query): Query<TeardownQuery>,
) -> Result<impl IntoResponse, ServerError> {
	let propagation = parse_propagation(query.propagation.as_deref())?;
	let report = state
		.applications
		.delete_resources(&id, propagation, query.force)
		.await?;
	Ok(Json(report))
}
