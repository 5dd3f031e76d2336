// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Resource kinds managed by Fleet and the options used when deleting them.

use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use kube::api::ApiResource;
use serde::{Deserialize, Serialize};

use crate::error::K8sError;

/// A namespaced resource kind Fleet knows how to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
	Deployment,
	StatefulSet,
	DaemonSet,
	Service,
	Pod,
	ConfigMap,
	Secret,
	PersistentVolumeClaim,
	Ingress,
	NetworkPolicy,
	Job,
}

impl ResourceKind {
	pub const ALL: [ResourceKind; 11] = [
		ResourceKind::Deployment,
		ResourceKind::StatefulSet,
		ResourceKind::DaemonSet,
		ResourceKind::Service,
		ResourceKind::Pod,
		ResourceKind::ConfigMap,
		ResourceKind::Secret,
		ResourceKind::PersistentVolumeClaim,
		ResourceKind::Ingress,
		ResourceKind::NetworkPolicy,
		ResourceKind::Job,
	];

	/// The API kind name, as it appears in `kind:`.
	pub fn as_str(&self) -> &'static str {
		match self {
			ResourceKind::Deployment => "Deployment",
			ResourceKind::StatefulSet => "StatefulSet",
			ResourceKind::DaemonSet => "DaemonSet",
			ResourceKind::Service => "Service",
			ResourceKind::Pod => "Pod",
			ResourceKind::ConfigMap => "ConfigMap",
			ResourceKind::Secret => "Secret",
			ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
			ResourceKind::Ingress => "Ingress",
			ResourceKind::NetworkPolicy => "NetworkPolicy",
			ResourceKind::Job => "Job",
		}
	}

	/// Type information needed to address this kind through a dynamic API.
	pub fn api_resource(&self) -> ApiResource {
		match self {
			ResourceKind::Deployment => ApiResource::erase::<Deployment>(&()),
			ResourceKind::StatefulSet => ApiResource::erase::<StatefulSet>(&()),
			ResourceKind::DaemonSet => ApiResource::erase::<DaemonSet>(&()),
			ResourceKind::Service => ApiResource::erase::<Service>(&()),
			ResourceKind::Pod => ApiResource::erase::<Pod>(&()),
			ResourceKind::ConfigMap => ApiResource::erase::<ConfigMap>(&()),
			ResourceKind::Secret => ApiResource::erase::<Secret>(&()),
			ResourceKind::PersistentVolumeClaim => ApiResource::erase::<PersistentVolumeClaim>(&()),
			ResourceKind::Ingress => ApiResource::erase::<Ingress>(&()),
			ResourceKind::NetworkPolicy => ApiResource::erase::<NetworkPolicy>(&()),
			ResourceKind::Job => ApiResource::erase::<Job>(&()),
		}
	}
}

impl fmt::Display for ResourceKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ResourceKind {
	type Err = K8sError;

	/// Accepts the plural path segments used by the HTTP API as well as the kind name.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"deployment" | "deployments" => Ok(ResourceKind::Deployment),
			"statefulset" | "statefulsets" => Ok(ResourceKind::StatefulSet),
			"daemonset" | "daemonsets" => Ok(ResourceKind::DaemonSet),
			"service" | "services" | "svc" => Ok(ResourceKind::Service),
			"pod" | "pods" => Ok(ResourceKind::Pod),
			"configmap" | "configmaps" => Ok(ResourceKind::ConfigMap),
			"secret" | "secrets" => Ok(ResourceKind::Secret),
			"persistentvolumeclaim" | "persistentvolumeclaims" | "pvc" | "pvcs" => {
				Ok(ResourceKind::PersistentVolumeClaim)
			}
			"ingress" | "ingresses" => Ok(ResourceKind::Ingress),
			"networkpolicy" | "networkpolicies" => Ok(ResourceKind::NetworkPolicy),
			"job" | "jobs" => Ok(ResourceKind::Job),
			_ => Err(K8sError::UnsupportedKind {
				kind: s.to_string(),
			}),
		}
	}
}

/// How dependents of a deleted object are garbage collected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropagationPolicy {
	#[default]
	Foreground,
	Background,
	Orphan,
}

impl PropagationPolicy {
	pub fn as_str(&self) -> &'static str {
		match self {
			PropagationPolicy::Foreground => "Foreground",
			PropagationPolicy::Background => "Background",
			PropagationPolicy::Orphan => "Orphan",
		}
	}
}

impl FromStr for PropagationPolicy {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"foreground" => Ok(PropagationPolicy::Foreground),
			"background" => Ok(PropagationPolicy::Background),
			"orphan" => Ok(PropagationPolicy::Orphan),
			_ => Err(format!("unknown propagation policy: {s}")),
		}
	}
}

impl From<PropagationPolicy> for kube::api::PropagationPolicy {
	fn from(policy: PropagationPolicy) -> Self {
		match policy {
			PropagationPolicy::Foreground => kube::api::PropagationPolicy::Foreground,
			PropagationPolicy::Background => kube::api::PropagationPolicy::Background,
			PropagationPolicy::Orphan => kube::api::PropagationPolicy::Orphan,
		}
	}
}

/// Options applied to a single delete call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
	pub propagation: PropagationPolicy,
	pub grace_period_seconds: Option<u32>,
}

impl DeleteOptions {
	pub fn with_propagation(propagation: PropagationPolicy) -> Self {
		Self {
			propagation,
			grace_period_seconds: None,
		}
	}

	/// Same options with an immediate (zero second) grace period.
	pub fn immediate(self) -> Self {
		Self {
			grace_period_seconds: Some(0),
			..self
		}
	}
}

impl From<&DeleteOptions> for kube::api::DeleteParams {
	fn from(opts: &DeleteOptions) -> Self {
		kube::api::DeleteParams {
			propagation_policy: Some(opts.propagation.into()),
			grace_period_seconds: opts.grace_period_seconds,
			..Default::default()
		}
	}
}

/// Options for fetching container logs.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
	pub container: Option<String>,
	pub tail_lines: Option<i64>,
	pub timestamps: bool,
}

pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Options for running a command in a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOptions {
	/// Target container. The caller resolves a default before exec.
	pub container: Option<String>,
	pub command: Vec<String>,
	pub tty: bool,
}

impl Default for ExecOptions {
	fn default() -> Self {
		Self {
			container: None,
			command: vec![DEFAULT_SHELL.to_string()],
			tty: true,
		}
	}
}
