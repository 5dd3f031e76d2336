// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Server error types and HTTP response conversions.

use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use fleet_server_clusters::ClusterError;
use fleet_server_db::DbError;
use fleet_server_deploy::DeployError;
use fleet_server_k8s::K8sError;
use serde::Serialize;

/// Error code returned when an identical request is still being served.
pub const REQUEST_IN_PROGRESS: &str = "REQUEST_IN_PROGRESS";

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
	#[error("Database error: {0}")]
	Db(DbError),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Conflict: {0}")]
	Conflict(String),

	#[error("Invalid request: {0}")]
	BadRequest(String),

	/// An identical request is already running; the client should retry.
	#[error("In progress: {0}")]
	InProgress(String),

	/// The cluster could not be reached or refused the call.
	#[error("Upstream error: {0}")]
	Upstream(String),

	#[error("Internal error: {0}")]
	Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
	pub error: String,
	pub message: String,
}

impl ErrorResponse {
	fn new(error: &str, message: impl Into<String>) -> Self {
		Self {
			error: error.to_string(),
			message: message.into(),
		}
	}
}

impl From<DbError> for ServerError {
	fn from(err: DbError) -> Self {
		match err {
			DbError::NotFound(what) => ServerError::NotFound(what),
			DbError::Conflict(what) => ServerError::Conflict(what),
			other => ServerError::Db(other),
		}
	}
}

impl From<K8sError> for ServerError {
	fn from(err: K8sError) -> Self {
		if err.is_not_found() {
			return ServerError::NotFound(err.to_string());
		}
		if err.is_already_exists() {
			return ServerError::Conflict(err.to_string());
		}
		match &err {
			K8sError::ApiError { code: 409, .. } => ServerError::Conflict(err.to_string()),
			K8sError::ApiError {
				code: 400 | 422, ..
			}
			| K8sError::UnsupportedKind { .. }
			| K8sError::InvalidObject { .. } => ServerError::BadRequest(err.to_string()),
			_ => ServerError::Upstream(err.to_string()),
		}
	}
}

impl From<ClusterError> for ServerError {
	fn from(err: ClusterError) -> Self {
		match err {
			ClusterError::ConfigNotFound(id) => {
				ServerError::NotFound(format!("cluster config not found: {id}"))
			}
			ClusterError::InvalidCredential(_)
			| ClusterError::ContextNotFound { .. }
			| ClusterError::UnsupportedKind(_) => ServerError::BadRequest(err.to_string()),
			ClusterError::Unreachable { .. } => ServerError::Upstream(err.to_string()),
			ClusterError::InProgress { .. } => ServerError::InProgress(err.to_string()),
			ClusterError::Kube(e) => e.into(),
			ClusterError::Store(e) => e.into(),
		}
	}
}

impl From<DeployError> for ServerError {
	fn from(err: DeployError) -> Self {
		match err {
			DeployError::ApplicationNotFound(_) | DeployError::ClusterConfigNotFound(_) => {
				ServerError::NotFound(err.to_string())
			}
			DeployError::Conflict { .. } | DeployError::InvalidTransition { .. } => {
				ServerError::Conflict(err.to_string())
			}
			DeployError::Validation(_) => ServerError::BadRequest(err.to_string()),
			DeployError::Cluster(e) => e.into(),
			DeployError::Kube(e) => e.into(),
			DeployError::Store(e) => e.into(),
			DeployError::Serialization(e) => ServerError::Internal(e.to_string()),
		}
	}
}

impl IntoResponse for ServerError {
	fn into_response(self) -> Response {
		let (status, body) = match self {
			ServerError::Db(e) => {
				tracing::error!(error = %e, "database error");
				(
					StatusCode::INTERNAL_SERVER_ERROR,
					ErrorResponse::new("database_error", "A database error occurred"),
				)
			}
			ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse::new("not_found", msg)),
			ServerError::Conflict(msg) => (StatusCode::CONFLICT, ErrorResponse::new("conflict", msg)),
			ServerError::BadRequest(msg) => {
				(StatusCode::BAD_REQUEST, ErrorResponse::new("bad_request", msg))
			}
			ServerError::InProgress(msg) => (
				StatusCode::TOO_MANY_REQUESTS,
				ErrorResponse::new(REQUEST_IN_PROGRESS, msg),
			),
			ServerError::Upstream(msg) => {
				tracing::warn!(error = %msg, "cluster call failed");
				(StatusCode::BAD_GATEWAY, ErrorResponse::new("upstream_error", msg))
			}
			ServerError::Internal(msg) => {
				tracing::error!(error = %msg, "internal error");
				(
					StatusCode::INTERNAL_SERVER_ERROR,
					ErrorResponse::new("internal_error", "An internal error occurred"),
				)
			}
		};

		(status, Json(body)).into_response()
	}
}
