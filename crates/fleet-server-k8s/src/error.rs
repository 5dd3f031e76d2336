// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Result type alias for cluster operations.
pub type K8sResult<T> = Result<T, K8sError>;

/// Errors that can occur while talking to a cluster.
#[derive(Error, Debug, Clone)]
pub enum K8sError {
	#[error("K8s API error ({code} {reason}): {message}")]
	ApiError {
		code: u16,
		reason: String,
		message: String,
	},

	#[error("K8s transport error: {message}")]
	Transport { message: String },

	#[error("{kind} not found: {name}")]
	NotFound { kind: String, name: String },

	#[error("{kind} already exists: {name}")]
	AlreadyExists { kind: String, name: String },

	#[error("Operation timed out")]
	Timeout,

	#[error("Invalid credential: {message}")]
	InvalidCredential { message: String },

	#[error("Failed to build client: {message}")]
	ClientBuild { message: String },

	#[error("Unsupported resource kind: {kind}")]
	UnsupportedKind { kind: String },

	#[error("Invalid object: {message}")]
	InvalidObject { message: String },

	#[error("Log stream error: {message}")]
	Stream { message: String },

	#[error("Exec failed: {message}")]
	Exec { message: String },
}

impl K8sError {
	/// Whether the error means the addressed object does not exist.
	pub fn is_not_found(&self) -> bool {
		matches!(
			self,
			K8sError::NotFound { .. } | K8sError::ApiError { code: 404, .. }
		)
	}

	/// Whether the error is a create that collided with an existing object.
	pub fn is_already_exists(&self) -> bool {
		match self {
			K8sError::AlreadyExists { .. } => true,
			K8sError::ApiError { code, reason, .. } => *code == 409 && reason == "AlreadyExists",
			_ => false,
		}
	}

	/// Whether the error came from the connection rather than the API server's answer.
	pub fn is_connection_failure(&self) -> bool {
		matches!(
			self,
			K8sError::Transport { .. } | K8sError::Timeout | K8sError::ClientBuild { .. }
		)
	}
}

impl From<kube::Error> for K8sError {
	fn from(err: kube::Error) -> Self {
		match err {
			kube::Error::Api(resp) => K8sError::ApiError {
				code: resp.code,
				reason: resp.reason,
				message: resp.message,
			},
			other => K8sError::Transport {
				message: other.to_string(),
			},
		}
	}
}

impl From<serde_json::Error> for K8sError {
	fn from(err: serde_json::Error) -> Self {
		K8sError::InvalidObject {
			message: err.to_string(),
		}
	}
}
