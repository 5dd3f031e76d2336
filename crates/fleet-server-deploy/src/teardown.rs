// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Parallel removal of everything an application may have left in a cluster.
//!
//! Every kind is deleted in its own branch and every branch runs to
//! completion. A missing object counts as deleted, so running a teardown
//! again is always safe. Network policies and ingresses are optional extras;
//! their failures are reported separately and never count against the result.

use std::sync::Arc;

use fleet_server_clusters::ClusterClientCache;
use fleet_server_jobs::fan_out;
use fleet_server_k8s::{ClusterApi, DeleteOptions, K8sError, PropagationPolicy, ResourceKind};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::resource_set::{app_selector, config_map_name, secret_name};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeardownRequest {
	pub cluster_id: String,
	pub namespace: String,
	pub name: String,
	#[serde(default)]
	pub propagation: PropagationPolicy,
	/// Zero grace period for every delete.
	#[serde(default)]
	pub force: bool,
}

impl TeardownRequest {
	pub fn new(
		cluster_id: impl Into<String>,
		namespace: impl Into<String>,
		name: impl Into<String>,
	) -> Self {
		Self {
			cluster_id: cluster_id.into(),
			namespace: namespace.into(),
			name: name.into(),
			propagation: PropagationPolicy::default(),
			force: false,
		}
	}

	pub fn with_propagation(mut self, propagation: PropagationPolicy) -> Self {
		self.propagation = propagation;
		self
	}

	pub fn forced(mut self, force: bool) -> Self {
		self.force = force;
		self
	}

	fn delete_options(&self) -> DeleteOptions {
		let opts = DeleteOptions::with_propagation(self.propagation);
		if self.force {
			opts.immediate()
		} else {
			opts
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindFailure {
	pub kind: ResourceKind,
	pub name: String,
	pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TeardownReport {
	/// `Kind/name` of every object actually removed.
	pub deleted: Vec<String>,
	/// `Kind/name` of objects that were already gone.
	pub absent: Vec<String>,
	pub errors: Vec<KindFailure>,
	/// Failures of optional kinds.
	pub ignored: Vec<KindFailure>,
}

impl TeardownReport {
	pub fn is_complete(&self) -> bool {
		self.errors.is_empty()
	}
}

#[derive(Debug)]
enum Outcome {
	Deleted,
	Absent,
	Failed(K8sError),
}

#[derive(Debug)]
struct Deletion {
	kind: ResourceKind,
	name: String,
	outcome: Outcome,
}

fn is_optional(kind: ResourceKind) -> bool {
	matches!(kind, ResourceKind::NetworkPolicy | ResourceKind::Ingress)
}

pub struct TeardownCoordinator {
	clients: Arc<ClusterClientCache>,
}

impl TeardownCoordinator {
	pub fn new(clients: Arc<ClusterClientCache>) -> Self {
		Self { clients }
	}

	/// Delete every kind an application may own. Fails only when no client
	/// can be had for the cluster; per-kind failures land in the report.
	#[instrument(skip(self, request), fields(cluster_id = %request.cluster_id, namespace = %request.namespace, name = %request.name))]
	pub async fn teardown(&self, request: &TeardownRequest) -> Result<TeardownReport> {
		let api = self.clients.get_client(&request.cluster_id).await?;
		let opts = request.delete_options();
		let ns = request.namespace.as_str();
		let name = request.name.as_str();

		let named = [
			(ResourceKind::Deployment, name.to_string()),
			(ResourceKind::StatefulSet, name.to_string()),
			(ResourceKind::DaemonSet, name.to_string()),
			(ResourceKind::Service, name.to_string()),
			(ResourceKind::ConfigMap, config_map_name(name)),
			(ResourceKind::Secret, secret_name(name)),
			(ResourceKind::PersistentVolumeClaim, name.to_string()),
			(ResourceKind::NetworkPolicy, name.to_string()),
			(ResourceKind::Ingress, name.to_string()),
		];

		let mut branches: Vec<(String, BoxFuture<'_, Vec<Deletion>>)> = named
			.into_iter()
			.map(|(kind, object)| {
				let api = Arc::clone(&api);
				let label = format!("{kind}/{object}");
				let branch = async move { vec![delete_one(api.as_ref(), kind, ns, object, &opts).await] };
				(label, branch.boxed())
			})
			.collect();
		branches.push((
			format!("Pod/{}", app_selector(name)),
			delete_pods(Arc::clone(&api), ns, name, opts).boxed(),
		));

		let mut report = TeardownReport::default();
		for branch in fan_out(branches).await {
			for deletion in branch.result {
				self.tally(&request.cluster_id, deletion, &mut report);
			}
		}

		if report.is_complete() {
			info!(deleted = report.deleted.len(), absent = report.absent.len(), "teardown complete");
		} else {
			warn!(
				deleted = report.deleted.len(),
				failed = report.errors.len(),
				"teardown finished with failures"
			);
		}
		Ok(report)
	}

	fn tally(&self, cluster_id: &str, deletion: Deletion, report: &mut TeardownReport) {
		let key = format!("{}/{}", deletion.kind, deletion.name);
		match deletion.outcome {
			Outcome::Deleted => report.deleted.push(key),
			Outcome::Absent => report.absent.push(key),
			Outcome::Failed(err) => {
				self.clients.note_failure(cluster_id, &err);
				let failure = KindFailure {
					kind: deletion.kind,
					name: deletion.name,
					message: err.to_string(),
				};
				if is_optional(deletion.kind) {
					debug!(object = %key, error = %err, "optional delete failed, ignoring");
					report.ignored.push(failure);
				} else {
					warn!(object = %key, error = %err, "delete failed");
					report.errors.push(failure);
				}
			}
		}
	}
}

async fn delete_one(
	api: &dyn ClusterApi,
	kind: ResourceKind,
	namespace: &str,
	name: String,
	opts: &DeleteOptions,
) -> Deletion {
	let outcome = match api.delete(kind, namespace, &name, opts).await {
		Ok(()) => Outcome::Deleted,
		Err(e) if e.is_not_found() => Outcome::Absent,
		Err(e) => Outcome::Failed(e),
	};
	Deletion {
		kind,
		name,
		outcome,
	}
}

/// Delete each pod labelled `app=<name>` individually with no grace period.
async fn delete_pods(
	api: Arc<dyn ClusterApi>,
	namespace: &str,
	name: &str,
	opts: DeleteOptions,
) -> Vec<Deletion> {
	let selector = app_selector(name);
	let pods = match api.list_pods(namespace, Some(&selector)).await {
		Ok(pods) => pods,
		Err(e) => {
			return vec![Deletion {
				kind: ResourceKind::Pod,
				name: selector,
				outcome: Outcome::Failed(e),
			}]
		}
	};

	let opts = opts.immediate();
	let deletes = pods
		.into_iter()
		.filter_map(|pod| pod.metadata.name)
		.map(|pod| {
			let api = Arc::clone(&api);
			async move { delete_one(api.as_ref(), ResourceKind::Pod, namespace, pod, &opts).await }
		});
	futures::future::join_all(deletes).await
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::fixture;
	use serde_json::json;

	fn seed_app_objects(api: &fleet_server_k8s::MockClusterApi) {
		for (kind, name) in [
			(ResourceKind::Deployment, "demo"),
			(ResourceKind::Service, "demo"),
			(ResourceKind::ConfigMap, "demo-config"),
			(ResourceKind::Secret, "demo-secret"),
		] {
			api.seed(kind, "default", json!({ "metadata": { "name": name } }));
		}
		api.seed_pod("default", "demo-abc", &[("app", "demo")]);
		api.seed_pod("default", "demo-def", &[("app", "demo")]);
		api.seed_pod("default", "other-1", &[("app", "other")]);
	}

	#[tokio::test]
	async fn test_teardown_removes_everything_and_is_idempotent() {
		let f = fixture().await;
		seed_app_objects(&f.api);
		let request = TeardownRequest::new(&f.cluster_id, "default", "demo");

		let first = f.teardown.teardown(&request).await.unwrap();
		assert!(first.is_complete());
		assert!(first.deleted.contains(&"Deployment/demo".to_string()));
		assert!(first.deleted.contains(&"ConfigMap/demo-config".to_string()));
		assert!(first.deleted.contains(&"Pod/demo-abc".to_string()));
		assert!(first.deleted.contains(&"Pod/demo-def".to_string()));
		assert!(f.api.contains(ResourceKind::Pod, "default", "other-1"));

		let second = f.teardown.teardown(&request).await.unwrap();
		assert!(second.is_complete());
		assert!(second.errors.is_empty());
		assert!(second.deleted.is_empty());
	}

	#[tokio::test]
	async fn test_already_torn_down_twice_yields_no_errors() {
		let f = fixture().await;
		let request = TeardownRequest::new(&f.cluster_id, "default", "ghost");

		for _ in 0..2 {
			let report = f.teardown.teardown(&request).await.unwrap();
			assert!(report.errors.is_empty());
			assert!(report.ignored.is_empty());
		}
	}

	#[tokio::test]
	async fn test_service_failure_is_isolated() {
		let f = fixture().await;
		seed_app_objects(&f.api);
		f.api.fail_deletes_for(ResourceKind::Service);

		let report = f
			.teardown
			.teardown(&TeardownRequest::new(&f.cluster_id, "default", "demo"))
			.await
			.unwrap();

		assert_eq!(report.errors.len(), 1);
		assert_eq!(report.errors[0].kind, ResourceKind::Service);
		assert!(report.deleted.contains(&"Deployment/demo".to_string()));
		assert!(!f.api.contains(ResourceKind::Deployment, "default", "demo"));
		assert!(!f.api.contains(ResourceKind::ConfigMap, "default", "demo-config"));
		assert!(!f.api.contains(ResourceKind::Pod, "default", "demo-abc"));
		assert!(f.api.contains(ResourceKind::Service, "default", "demo"));
	}

	#[tokio::test]
	async fn test_optional_kind_failures_are_ignored() {
		let f = fixture().await;
		f.api.fail_deletes_for(ResourceKind::Ingress);
		f.api.fail_deletes_for(ResourceKind::NetworkPolicy);

		let report = f
			.teardown
			.teardown(&TeardownRequest::new(&f.cluster_id, "default", "demo"))
			.await
			.unwrap();

		assert!(report.is_complete());
		assert_eq!(report.ignored.len(), 2);
	}

	#[tokio::test]
	async fn test_propagation_and_force_apply_to_every_delete() {
		let f = fixture().await;
		seed_app_objects(&f.api);
		let request = TeardownRequest::new(&f.cluster_id, "default", "demo")
			.with_propagation(PropagationPolicy::Foreground)
			.forced(true);

		f.teardown.teardown(&request).await.unwrap();

		let calls = f.api.delete_calls();
		assert_eq!(calls.len(), 11);
		for call in calls {
			assert_eq!(call.options.propagation, PropagationPolicy::Foreground);
			assert_eq!(call.options.grace_period_seconds, Some(0));
		}
	}

	#[tokio::test]
	async fn test_pods_always_deleted_immediately() {
		let f = fixture().await;
		seed_app_objects(&f.api);

		f.teardown
			.teardown(&TeardownRequest::new(&f.cluster_id, "default", "demo"))
			.await
			.unwrap();

		for call in f.api.delete_calls() {
			let expected = (call.kind == ResourceKind::Pod).then_some(0);
			assert_eq!(call.options.grace_period_seconds, expected, "{:?}", call.kind);
		}
	}
}
