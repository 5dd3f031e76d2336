// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Generic object access by kind, name and namespace.

use axum::{
	extract::{Path, Query, State},
	http::StatusCode,
	response::IntoResponse,
	Json,
};
use fleet_server_clusters::ClusterError;
use fleet_server_k8s::{DeleteOptions, PropagationPolicy};
use serde::Deserialize;
use serde_json::Value;

use crate::{
	api::AppState,
	error::ServerError,
	routes::clusters::DeletedResponse,
	routes::workloads::{parse_kind, NamespaceQuery},
};

#[derive(Debug, Default, Deserialize)]
pub struct DeleteObjectQuery {
	pub namespace: Option<String>,
	pub propagation: Option<String>,
	#[serde(default)]
	pub force: bool,
}

pub(crate) fn parse_propagation(raw: Option<&str>) -> Result<PropagationPolicy, ServerError> {
	match raw {
		None => Ok(PropagationPolicy::default()),
		Some(s) => s.parse().map_err(ServerError::BadRequest),
	}
}

/// GET /api/clusters/{id}/resources/{kind}
pub async fn list_objects(
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

/// POST /api/clusters/{id}/resources/{kind}
pub async fn create_object(
	State(state): State<AppState>,
	Path((id, kind)): Path<(String, String)>,
	Query(query): Query<NamespaceQuery>,
	Json(body): Json<Value>,
) -> Result<impl IntoResponse, ServerError> {
	let kind = parse_kind(&kind)?;
	let created = state
		.queries
		.create_object(&id, kind, query.namespace.as_deref(), body)
		.await?;
	Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/clusters/{id}/resources/{kind}/{name}
pub async fn get_object(
	State(state): State<AppState>,
	Path((id, kind, name)): Path<(String, String, String)>,
	Query(query): Query<NamespaceQuery>,
) -> Result<impl IntoResponse, ServerError> {
	let kind = parse_kind(&kind)?;
	let object = state
		.queries
		.get_object(&id, kind, query.namespace.as_deref(), &name)
		.await?;
	Ok(Json(object))
}

/// PUT /api/clusters/{id}/resources/{kind}/{name}
pub async fn replace_object(
	State(state): State<AppState>,
	Path((id, kind, name)): Path<(String, String, String)>,
	Query(query): Query<NamespaceQuery>,
	Json(body): Json<Value>,
) -> Result<impl IntoResponse, ServerError> {
	let kind = parse_kind(&kind)?;
	let replaced = state
		.queries
		.replace_object(&id, kind, query.namespace.as_deref(), &name, body)
		.await?;
	Ok(Json(replaced))
}

/// DELETE /api/clusters/{id}/resources/{kind}/{name}
///
/// Deleting an object that is already gone succeeds with `deleted: false`.
pub async fn delete_object(
	State(state): State<AppState>,
	Path((id, kind, name)): Path<(String, String, String)>,
	Query(query): Query<DeleteObjectQuery>,
) -> Result<impl IntoResponse, ServerError> {
	let kind = parse_kind(&kind)?;
	let mut opts = DeleteOptions::with_propagation(parse_propagation(query.propagation.as_deref())?);
	if query.force {
		opts = opts.immediate();
	}

	let result = state
		.queries
		.delete_object(&id, kind, query.namespace.as_deref(), &name, &opts)
		.await;
	match result {
		Ok(()) => Ok(Json(DeletedResponse { deleted: true })),
		Err(ClusterError::Kube(e)) if e.is_not_found() => Ok(Json(DeletedResponse { deleted: false })),
		Err(e) => Err(e.into()),
	}
}
