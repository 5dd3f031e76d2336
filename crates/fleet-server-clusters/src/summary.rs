// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Compact, display-oriented views of cluster objects.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use fleet_server_db::NamespaceCacheEntry;
use fleet_server_k8s::{DaemonSet, Deployment, IntOrString, Job, ObjectMeta, Pod, Service, StatefulSet};
use serde::Serialize;

/// Elapsed time in the short form `kubectl get` prints: `45s`, `12m`, `5h`, `3d`.
pub fn format_age(created: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
	let Some(created) = created else {
		return "<unknown>".to_string();
	};
	let secs = (now - created).num_seconds().max(0);
	match secs {
		s if s < 60 => format!("{s}s"),
		s if s < 3600 => format!("{}m", s / 60),
		s if s < 86_400 => format!("{}h", s / 3600),
		s => format!("{}d", s / 86_400),
	}
}

fn created_at(meta: &ObjectMeta) -> Option<DateTime<Utc>> {
	meta.creation_timestamp.as_ref().map(|t| t.0)
}

fn name(meta: &ObjectMeta) -> String {
	meta.name.clone().unwrap_or_default()
}

fn namespace(meta: &ObjectMeta) -> String {
	meta.namespace.clone().unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NamespaceSummary {
	pub name: String,
	pub status: String,
	pub age: String,
	pub labels: BTreeMap<String, String>,
	pub created_at: Option<DateTime<Utc>>,
	pub last_synced_at: DateTime<Utc>,
}

impl NamespaceSummary {
	pub fn from_entry(entry: &NamespaceCacheEntry, now: DateTime<Utc>) -> Self {
		Self {
			name: entry.name.clone(),
			status: entry.status.clone(),
			age: format_age(entry.created_at, now),
			labels: entry.labels.clone(),
			created_at: entry.created_at,
			last_synced_at: entry.last_synced_at,
		}
	}
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContainerPortSummary {
	pub container_port: i32,
	pub protocol: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContainerSummary {
	pub name: String,
	pub image: String,
	pub ports: Vec<ContainerPortSummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PodSummary {
	pub name: String,
	pub namespace: String,
	pub status: String,
	pub ready: String,
	pub restarts: i32,
	pub age: String,
	pub ip: Option<String>,
	pub node: Option<String>,
	pub containers: Vec<ContainerSummary>,
	pub labels: BTreeMap<String, String>,
	pub created_at: Option<DateTime<Utc>>,
}

impl PodSummary {
	pub fn from_pod(pod: &Pod, now: DateTime<Utc>) -> Self {
		let status = pod.status.as_ref();
		let spec = pod.spec.as_ref();
		let container_statuses = status
			.and_then(|s| s.container_statuses.as_deref())
			.unwrap_or_default();

		let phase = if pod.metadata.deletion_timestamp.is_some() {
			"Terminating".to_string()
		} else {
			status
				.and_then(|s| s.phase.clone())
				.unwrap_or_else(|| "Unknown".to_string())
		};

		let containers: Vec<ContainerSummary> = spec
			.map(|s| s.containers.as_slice())
			.unwrap_or_default()
			.iter()
			.map(|c| ContainerSummary {
				name: c.name.clone(),
				image: c.image.clone().unwrap_or_default(),
				ports: c
					.ports
					.as_deref()
					.unwrap_or_default()
					.iter()
					.map(|p| ContainerPortSummary {
						container_port: p.container_port,
						protocol: p.protocol.clone().unwrap_or_else(|| "TCP".to_string()),
					})
					.collect(),
			})
			.collect();

		let ready = container_statuses.iter().filter(|c| c.ready).count();

		Self {
			name: name(&pod.metadata),
			namespace: namespace(&pod.metadata),
			status: phase,
			ready: format!("{ready}/{}", containers.len()),
			restarts: container_statuses.iter().map(|c| c.restart_count).sum(),
			age: format_age(created_at(&pod.metadata), now),
			ip: status.and_then(|s| s.pod_ip.clone()),
			node: spec.and_then(|s| s.node_name.clone()),
			containers,
			labels: pod.metadata.labels.clone().unwrap_or_default(),
			created_at: created_at(&pod.metadata),
		}
	}
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeploymentSummary {
	pub name: String,
	pub namespace: String,
	pub replicas: i32,
	pub ready: i32,
	pub available: i32,
	pub updated: i32,
	pub images: Vec<String>,
	pub age: String,
	pub labels: BTreeMap<String, String>,
	pub created_at: Option<DateTime<Utc>>,
}

impl DeploymentSummary {
	pub fn from_deployment(deployment: &Deployment, now: DateTime<Utc>) -> Self {
		let status = deployment.status.as_ref();
		let images = deployment
			.spec
			.as_ref()
			.and_then(|s| s.template.spec.as_ref())
			.map(|s| {
				s.containers
					.iter()
					.filter_map(|c| c.image.clone())
					.collect()
			})
			.unwrap_or_default();

		Self {
			name: name(&deployment.metadata),
			namespace: namespace(&deployment.metadata),
			replicas: deployment
				.spec
				.as_ref()
				.and_then(|s| s.replicas)
				.unwrap_or(1),
			ready: status.and_then(|s| s.ready_replicas).unwrap_or(0),
			available: status.and_then(|s| s.available_replicas).unwrap_or(0),
			updated: status.and_then(|s| s.updated_replicas).unwrap_or(0),
			images,
			age: format_age(created_at(&deployment.metadata), now),
			labels: deployment.metadata.labels.clone().unwrap_or_default(),
			created_at: created_at(&deployment.metadata),
		}
	}
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServicePortSummary {
	pub name: Option<String>,
	pub port: i32,
	pub target_port: Option<String>,
	pub node_port: Option<i32>,
	pub protocol: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServiceSummary {
	pub name: String,
	pub namespace: String,
	#[serde(rename = "type")]
	pub service_type: String,
	pub cluster_ip: Option<String>,
	pub external_ips: Vec<String>,
	pub ports: Vec<ServicePortSummary>,
	pub selector: BTreeMap<String, String>,
	pub age: String,
	pub created_at: Option<DateTime<Utc>>,
}

impl ServiceSummary {
	pub fn from_service(service: &Service, now: DateTime<Utc>) -> Self {
		let spec = service.spec.as_ref();

		let mut external_ips: Vec<String> = spec
			.and_then(|s| s.external_ips.clone())
			.unwrap_or_default();
		let balancer_ips = service
			.status
			.as_ref()
			.and_then(|s| s.load_balancer.as_ref())
			.and_then(|lb| lb.ingress.as_ref())
			.into_iter()
			.flatten()
			.filter_map(|i| i.ip.clone().or_else(|| i.hostname.clone()));
		external_ips.extend(balancer_ips);

		let ports = spec
			.and_then(|s| s.ports.as_deref())
			.unwrap_or_default()
			.iter()
			.map(|p| ServicePortSummary {
				name: p.name.clone(),
				port: p.port,
				target_port: p.target_port.as_ref().map(|t| match t {
					IntOrString::Int(i) => i.to_string(),
					IntOrString::String(s) => s.clone(),
				}),
				node_port: p.node_port,
				protocol: p.protocol.clone().unwrap_or_else(|| "TCP".to_string()),
			})
			.collect();

		Self {
			name: name(&service.metadata),
			namespace: namespace(&service.metadata),
			service_type: spec
				.and_then(|s| s.type_.clone())
				.unwrap_or_else(|| "ClusterIP".to_string()),
			cluster_ip: spec.and_then(|s| s.cluster_ip.clone()),
			external_ips,
			ports,
			selector: spec.and_then(|s| s.selector.clone()).unwrap_or_default(),
			age: format_age(created_at(&service.metadata), now),
			created_at: created_at(&service.metadata),
		}
	}
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatefulSetSummary {
	pub name: String,
	pub namespace: String,
	pub replicas: i32,
	pub ready: i32,
	pub age: String,
	pub created_at: Option<DateTime<Utc>>,
}

impl StatefulSetSummary {
	pub fn from_stateful_set(set: &StatefulSet, now: DateTime<Utc>) -> Self {
		Self {
			name: name(&set.metadata),
			namespace: namespace(&set.metadata),
			replicas: set.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1),
			ready: set
				.status
				.as_ref()
				.and_then(|s| s.ready_replicas)
				.unwrap_or(0),
			age: format_age(created_at(&set.metadata), now),
			created_at: created_at(&set.metadata),
		}
	}
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DaemonSetSummary {
	pub name: String,
	pub namespace: String,
	pub desired: i32,
	pub current: i32,
	pub ready: i32,
	pub available: i32,
	pub age: String,
	pub created_at: Option<DateTime<Utc>>,
}

impl DaemonSetSummary {
	pub fn from_daemon_set(set: &DaemonSet, now: DateTime<Utc>) -> Self {
		let status = set.status.as_ref();
		Self {
			name: name(&set.metadata),
			namespace: namespace(&set.metadata),
			desired: status.map(|s| s.desired_number_scheduled).unwrap_or(0),
			current: status.map(|s| s.current_number_scheduled).unwrap_or(0),
			ready: status.map(|s| s.number_ready).unwrap_or(0),
			available: status.and_then(|s| s.number_available).unwrap_or(0),
			age: format_age(created_at(&set.metadata), now),
			created_at: created_at(&set.metadata),
		}
	}
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobSummary {
	pub name: String,
	pub namespace: String,
	pub completions: String,
	pub active: i32,
	pub failed: i32,
	pub age: String,
	pub created_at: Option<DateTime<Utc>>,
	pub completed_at: Option<DateTime<Utc>>,
}

impl JobSummary {
	pub fn from_job(job: &Job, now: DateTime<Utc>) -> Self {
		let status = job.status.as_ref();
		let wanted = job.spec.as_ref().and_then(|s| s.completions).unwrap_or(1);
		let succeeded = status.and_then(|s| s.succeeded).unwrap_or(0);

		Self {
			name: name(&job.metadata),
			namespace: namespace(&job.metadata),
			completions: format!("{succeeded}/{wanted}"),
			active: status.and_then(|s| s.active).unwrap_or(0),
			failed: status.and_then(|s| s.failed).unwrap_or(0),
			age: format_age(created_at(&job.metadata), now),
			created_at: created_at(&job.metadata),
			completed_at: status.and_then(|s| s.completion_time.as_ref()).map(|t| t.0),
		}
	}
}
