// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use fleet_server_db::DbError;
use fleet_server_k8s::K8sError;

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
	#[error("cluster config not found: {0}")]
	ConfigNotFound(String),

	#[error("invalid cluster credential: {0}")]
	InvalidCredential(String),

	#[error("context '{context}' not found in cluster config")]
	ContextNotFound { context: String },

	#[error("cluster {cluster_id} unreachable: {message}")]
	Unreachable { cluster_id: String, message: String },

	/// An identical request for the same cluster is already being served.
	#[error("{operation} already in progress for cluster {cluster_id}")]
	InProgress {
		operation: &'static str,
		cluster_id: String,
	},

	#[error("listing {0} is not supported")]
	UnsupportedKind(String),

	#[error(transparent)]
	Kube(#[from] K8sError),

	#[error("store error: {0}")]
	Store(#[from] DbError),
}

impl ClusterError {
	pub fn unreachable(cluster_id: &str, err: impl std::fmt::Display) -> Self {
		ClusterError::Unreachable {
			cluster_id: cluster_id.to_string(),
			message: err.to_string(),
		}
	}

	pub fn is_not_found(&self) -> bool {
		match self {
			ClusterError::ConfigNotFound(_) => true,
			ClusterError::Kube(e) => e.is_not_found(),
			ClusterError::Store(e) => e.is_not_found(),
			_ => false,
		}
	}
}

pub type Result<T> = std::result::Result<T, ClusterError>;
