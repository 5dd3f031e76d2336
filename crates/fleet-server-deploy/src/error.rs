// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Deploy error types.

use fleet_server_clusters::ClusterError;
use fleet_server_db::{ApplicationStatus, DbError};
use fleet_server_k8s::K8sError;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
	#[error("application not found: {0}")]
	ApplicationNotFound(String),

	#[error("cluster config not found: {0}")]
	ClusterConfigNotFound(String),

	/// An application with the same name already lives in that namespace and cluster.
	#[error("application {name} already exists in namespace {namespace}")]
	Conflict { name: String, namespace: String },

	#[error("cannot move application from {from} to {to}")]
	InvalidTransition {
		from: ApplicationStatus,
		to: ApplicationStatus,
	},

	#[error("invalid application: {0}")]
	Validation(String),

	#[error(transparent)]
	Cluster(#[from] ClusterError),

	#[error(transparent)]
	Kube(#[from] K8sError),

	#[error("store error: {0}")]
	Store(#[from] DbError),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

impl DeployError {
	pub fn is_not_found(&self) -> bool {
		match self {
			DeployError::ApplicationNotFound(_) | DeployError::ClusterConfigNotFound(_) => true,
			DeployError::Cluster(e) => e.is_not_found(),
			DeployError::Store(e) => e.is_not_found(),
			DeployError::Kube(e) => e.is_not_found(),
			_ => false,
		}
	}
}

pub type Result<T> = std::result::Result<T, DeployError>;
