// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Read and passthrough operations against a cluster's workload objects.
//!
//! Listings degrade to an empty result when the cluster cannot be reached.
//! Pod listings are additionally cached for a short while and coalesced, so a
//! burst of identical requests costs one upstream call. Generic object
//! operations are uncached and surface their errors.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleet_server_config::QueriesConfig;
use fleet_server_k8s::{
	AttachedProcess, ClusterApi, DeleteOptions, ExecOptions, K8sError, K8sResult, LogOptions,
	LogStream, ResourceKind,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::client_cache::ClusterClientCache;
use crate::error::{ClusterError, Result};
use crate::inflight::InFlight;
use crate::summary::{
	DaemonSetSummary, DeploymentSummary, JobSummary, PodSummary, ServiceSummary, StatefulSetSummary,
};
use crate::ttl_cache::TtlCache;

pub const DEFAULT_NAMESPACE: &str = "default";

type PodKey = (String, String);

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResourceList {
	Pods(Vec<PodSummary>),
	Deployments(Vec<DeploymentSummary>),
	Services(Vec<ServiceSummary>),
	StatefulSets(Vec<StatefulSetSummary>),
	DaemonSets(Vec<DaemonSetSummary>),
	Jobs(Vec<JobSummary>),
}

impl ResourceList {
	pub fn len(&self) -> usize {
		match self {
			ResourceList::Pods(v) => v.len(),
			ResourceList::Deployments(v) => v.len(),
			ResourceList::Services(v) => v.len(),
			ResourceList::StatefulSets(v) => v.len(),
			ResourceList::DaemonSets(v) => v.len(),
			ResourceList::Jobs(v) => v.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

pub struct ResourceQueries {
	clients: Arc<ClusterClientCache>,
	pods: TtlCache<PodKey, Vec<PodSummary>>,
	in_flight: InFlight<(&'static str, String, String)>,
}

fn resolve_namespace(namespace: Option<&str>) -> &str {
	namespace.filter(|ns| !ns.is_empty()).unwrap_or(DEFAULT_NAMESPACE)
}

fn first_container(pod: &Value, name: &str) -> Result<String> {
	pod["spec"]["containers"][0]["name"]
		.as_str()
		.map(str::to_string)
		.ok_or_else(|| {
			ClusterError::Kube(K8sError::InvalidObject {
				message: format!("pod {name} has no containers"),
			})
		})
}

impl ResourceQueries {
	pub fn new(clients: Arc<ClusterClientCache>, config: &QueriesConfig) -> Self {
		Self {
			clients,
			pods: TtlCache::new(config.result_ttl()),
			in_flight: InFlight::new(),
		}
	}

	/// List one of the workload kinds that have a summary view.
	pub async fn list(
		&self,
		cluster_id: &str,
		namespace: Option<&str>,
		kind: ResourceKind,
	) -> Result<ResourceList> {
		Ok(match kind {
			ResourceKind::Pod => ResourceList::Pods(self.list_pods(cluster_id, namespace).await?),
			ResourceKind::Deployment => {
				ResourceList::Deployments(self.list_deployments(cluster_id, namespace).await?)
			}
			ResourceKind::Service => {
				ResourceList::Services(self.list_services(cluster_id, namespace).await?)
			}
			ResourceKind::StatefulSet => {
				ResourceList::StatefulSets(self.list_stateful_sets(cluster_id, namespace).await?)
			}
			ResourceKind::DaemonSet => {
				ResourceList::DaemonSets(self.list_daemon_sets(cluster_id, namespace).await?)
			}
			ResourceKind::Job => ResourceList::Jobs(self.list_jobs(cluster_id, namespace).await?),
			other => return Err(ClusterError::UnsupportedKind(other.to_string())),
		})
	}

	/// Pods in a namespace, served from a short-lived cache.
	///
	/// While an identical listing is running the call fails with
	/// [`ClusterError::InProgress`] instead of issuing a second upstream call.
	#[instrument(skip(self))]
	pub async fn list_pods(&self, cluster_id: &str, namespace: Option<&str>) -> Result<Vec<PodSummary>> {
		let namespace = resolve_namespace(namespace);
		let key = (cluster_id.to_string(), namespace.to_string());
		if let Some(hit) = self.pods.get_fresh(&key) {
			debug!(cluster_id, namespace, "pod listing served from cache");
			return Ok(hit);
		}

		let _claim = self
			.in_flight
			.try_claim(("pods", key.0.clone(), key.1.clone()))
			.ok_or_else(|| ClusterError::InProgress {
				operation: "list_pods",
				cluster_id: cluster_id.to_string(),
			})?;

		let Some(api) = self.client(cluster_id).await? else {
			return Ok(Vec::new());
		};

		match api.list_pods(namespace, None).await {
			Ok(pods) => {
				let now = Utc::now();
				let summaries: Vec<_> = pods.iter().map(|p| PodSummary::from_pod(p, now)).collect();
				self.pods.insert(key, summaries.clone());
				Ok(summaries)
			}
			Err(e) => {
				self.degrade(cluster_id, "pods", &e);
				Ok(Vec::new())
			}
		}
	}

	#[instrument(skip(self))]
	pub async fn list_deployments(
		&self,
		cluster_id: &str,
		namespace: Option<&str>,
	) -> Result<Vec<DeploymentSummary>> {
		let namespace = resolve_namespace(namespace);
		let Some(api) = self.client(cluster_id).await? else {
			return Ok(Vec::new());
		};
		let listed = api.list_deployments(namespace).await;
		Ok(self.summarize(cluster_id, "deployments", listed, DeploymentSummary::from_deployment))
	}

	#[instrument(skip(self))]
	pub async fn list_services(
		&self,
		cluster_id: &str,
		namespace: Option<&str>,
	) -> Result<Vec<ServiceSummary>> {
		let namespace = resolve_namespace(namespace);
		let Some(api) = self.client(cluster_id).await? else {
			return Ok(Vec::new());
		};
		let listed = api.list_services(namespace).await;
		Ok(self.summarize(cluster_id, "services", listed, ServiceSummary::from_service))
	}

	#[instrument(skip(self))]
	pub async fn list_stateful_sets(
		&self,
		cluster_id: &str,
		namespace: Option<&str>,
	) -> Result<Vec<StatefulSetSummary>> {
		let namespace = resolve_namespace(namespace);
		let Some(api) = self.client(cluster_id).await? else {
			return Ok(Vec::new());
		};
		let listed = api.list_stateful_sets(namespace).await;
		Ok(self.summarize(
			cluster_id,
			"statefulsets",
			listed,
			StatefulSetSummary::from_stateful_set,
		))
	}

	#[instrument(skip(self))]
	pub async fn list_daemon_sets(
		&self,
		cluster_id: &str,
		namespace: Option<&str>,
	) -> Result<Vec<DaemonSetSummary>> {
		let namespace = resolve_namespace(namespace);
		let Some(api) = self.client(cluster_id).await? else {
			return Ok(Vec::new());
		};
		let listed = api.list_daemon_sets(namespace).await;
		Ok(self.summarize(cluster_id, "daemonsets", listed, DaemonSetSummary::from_daemon_set))
	}

	#[instrument(skip(self))]
	pub async fn list_jobs(&self, cluster_id: &str, namespace: Option<&str>) -> Result<Vec<JobSummary>> {
		let namespace = resolve_namespace(namespace);
		let Some(api) = self.client(cluster_id).await? else {
			return Ok(Vec::new());
		};
		let listed = api.list_jobs(namespace).await;
		Ok(self.summarize(cluster_id, "jobs", listed, JobSummary::from_job))
	}

	#[instrument(skip(self, opts))]
	pub async fn pod_logs(
		&self,
		cluster_id: &str,
		namespace: Option<&str>,
		pod: &str,
		opts: &LogOptions,
	) -> Result<String> {
		let namespace = resolve_namespace(namespace);
		let api = self.clients.get_client(cluster_id).await?;
		let logs = api.pod_logs(namespace, pod, opts).await;
		self.surface(cluster_id, logs)
	}

	/// Follow a pod's logs until the caller drops the stream.
	#[instrument(skip(self, opts))]
	pub async fn stream_pod_logs(
		&self,
		cluster_id: &str,
		namespace: Option<&str>,
		pod: &str,
		opts: &LogOptions,
	) -> Result<LogStream> {
		let namespace = resolve_namespace(namespace);
		let api = self.clients.get_client(cluster_id).await?;
		let stream = api.stream_pod_logs(namespace, pod, opts).await;
		self.surface(cluster_id, stream)
	}

	/// Start an interactive session in a pod.
	///
	/// Without an explicit container the pod's first container is used.
	#[instrument(skip(self, opts), fields(command = ?opts.command))]
	pub async fn exec_pod(
		&self,
		cluster_id: &str,
		namespace: Option<&str>,
		pod: &str,
		mut opts: ExecOptions,
	) -> Result<AttachedProcess> {
		let namespace = resolve_namespace(namespace);
		let api = self.clients.get_client(cluster_id).await?;
		if opts.container.is_none() {
			let object = api.get_object(ResourceKind::Pod, namespace, pod).await;
			let object = self.surface(cluster_id, object)?;
			opts.container = Some(first_container(&object, pod)?);
		}
		let process = api.exec_attach(namespace, pod, &opts).await;
		self.surface(cluster_id, process)
	}

	#[instrument(skip(self))]
	pub async fn get_object(
		&self,
		cluster_id: &str,
		kind: ResourceKind,
		namespace: Option<&str>,
		name: &str,
	) -> Result<Value> {
		let namespace = resolve_namespace(namespace);
		let api = self.clients.get_client(cluster_id).await?;
		let object = api.get_object(kind, namespace, name).await;
		self.surface(cluster_id, object)
	}

	#[instrument(skip(self, body))]
	pub async fn create_object(
		&self,
		cluster_id: &str,
		kind: ResourceKind,
		namespace: Option<&str>,
		body: Value,
	) -> Result<Value> {
		let namespace = resolve_namespace(namespace);
		let api = self.clients.get_client(cluster_id).await?;
		let created = api.create_object(kind, namespace, body).await;
		self.written(cluster_id, kind, namespace);
		self.surface(cluster_id, created)
	}

	#[instrument(skip(self, body))]
	pub async fn replace_object(
		&self,
		cluster_id: &str,
		kind: ResourceKind,
		namespace: Option<&str>,
		name: &str,
		body: Value,
	) -> Result<Value> {
		let namespace = resolve_namespace(namespace);
		let api = self.clients.get_client(cluster_id).await?;
		let replaced = api.replace_object(kind, namespace, name, body).await;
		self.written(cluster_id, kind, namespace);
		self.surface(cluster_id, replaced)
	}

	#[instrument(skip(self, opts))]
	pub async fn delete_object(
		&self,
		cluster_id: &str,
		kind: ResourceKind,
		namespace: Option<&str>,
		name: &str,
		opts: &DeleteOptions,
	) -> Result<()> {
		let namespace = resolve_namespace(namespace);
		let api = self.clients.get_client(cluster_id).await?;
		let deleted = api.delete(kind, namespace, name, opts).await;
		self.written(cluster_id, kind, namespace);
		self.surface(cluster_id, deleted)
	}

	/// Forget every cached listing for a cluster.
	pub fn invalidate(&self, cluster_id: &str) {
		self.pods.retain(|(cluster, _)| cluster != cluster_id);
	}

	pub fn evict_older_than(&self, max_age: Duration) -> usize {
		self.pods.evict_older_than(max_age)
	}

	/// Client for a read path. `None` means degrade to an empty result.
	async fn client(&self, cluster_id: &str) -> Result<Option<Arc<dyn ClusterApi>>> {
		match self.clients.get_client(cluster_id).await {
			Ok(api) => Ok(Some(api)),
			Err(e @ ClusterError::ConfigNotFound(_)) => Err(e),
			Err(e) => {
				warn!(cluster_id, error = %e, "cluster unavailable, returning empty listing");
				Ok(None)
			}
		}
	}

	fn summarize<T, S>(
		&self,
		cluster_id: &str,
		what: &str,
		listed: K8sResult<Vec<T>>,
		convert: impl Fn(&T, DateTime<Utc>) -> S,
	) -> Vec<S> {
		match listed {
			Ok(items) => {
				let now = Utc::now();
				items.iter().map(|item| convert(item, now)).collect()
			}
			Err(e) => {
				self.degrade(cluster_id, what, &e);
				Vec::new()
			}
		}
	}

	fn degrade(&self, cluster_id: &str, what: &str, err: &K8sError) {
		warn!(cluster_id, what, error = %err, "listing failed, returning empty result");
		self.clients.note_failure(cluster_id, err);
	}

	fn surface<T>(&self, cluster_id: &str, result: K8sResult<T>) -> Result<T> {
		result.map_err(|e| {
			self.clients.note_failure(cluster_id, &e);
			ClusterError::from(e)
		})
	}

	fn written(&self, cluster_id: &str, kind: ResourceKind, namespace: &str) {
		if kind == ResourceKind::Pod {
			self
				.pods
				.remove(&(cluster_id.to_string(), namespace.to_string()));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::client_cache::tests::{fixture, registered, Fixture};
	use fleet_server_k8s::MockClusterApi;
	use serde_json::json;

	fn queries(f: &Fixture) -> ResourceQueries {
		ResourceQueries::new(Arc::clone(&f.cache), &QueriesConfig::default())
	}

	fn pod_names(pods: &[PodSummary]) -> Vec<&str> {
		pods.iter().map(|p| p.name.as_str()).collect()
	}

	#[tokio::test]
	async fn test_pod_listing_is_cached() {
		let f = fixture(MockClusterApi::new()).await;
		let config = registered(&f).await;
		f.api.seed_pod("default", "web-1", &[("app", "web")]);
		let q = queries(&f);

		let first = q.list_pods(&config.id, None).await.unwrap();
		assert_eq!(pod_names(&first), vec!["web-1"]);

		f.api.seed_pod("default", "web-2", &[("app", "web")]);
		let second = q.list_pods(&config.id, Some("default")).await.unwrap();
		assert_eq!(pod_names(&second), vec!["web-1"]);
		assert_eq!(f.api.call_count("list_pods"), 1);

		q.invalidate(&config.id);
		assert_eq!(q.list_pods(&config.id, None).await.unwrap().len(), 2);
	}

	#[tokio::test]
	async fn test_duplicate_pod_listing_gets_retry_signal() {
		let f = fixture(MockClusterApi::new()).await;
		let config = registered(&f).await;
		f.api.seed_pod("default", "web-1", &[]);
		f.api.set_list_delay(Duration::from_millis(200));
		let q = queries(&f);

		let (a, b) = tokio::join!(
			q.list_pods(&config.id, None),
			q.list_pods(&config.id, None)
		);
		let (ok, busy) = if a.is_ok() { (a, b) } else { (b, a) };

		assert_eq!(ok.unwrap().len(), 1);
		assert!(matches!(
			busy.unwrap_err(),
			ClusterError::InProgress {
				operation: "list_pods",
				..
			}
		));
		assert_eq!(f.api.call_count("list_pods"), 1);
	}

	#[tokio::test]
	async fn test_upstream_failure_degrades_and_is_not_cached() {
		let f = fixture(MockClusterApi::new()).await;
		let config = registered(&f).await;
		f.api.seed_pod("default", "web-1", &[]);
		let q = queries(&f);

		f.api.set_fail_lists(true);
		assert!(q.list_pods(&config.id, None).await.unwrap().is_empty());
		assert!(q.list_deployments(&config.id, None).await.unwrap().is_empty());

		f.api.set_fail_lists(false);
		assert_eq!(q.list_pods(&config.id, None).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_unknown_cluster_surfaces_not_found() {
		let f = fixture(MockClusterApi::new()).await;
		let q = queries(&f);

		let err = q.list_pods("missing", None).await.unwrap_err();
		assert!(err.is_not_found());
	}

	#[tokio::test]
	async fn test_list_dispatches_by_kind() {
		let f = fixture(MockClusterApi::new()).await;
		let config = registered(&f).await;
		f.api.seed(
			ResourceKind::Deployment,
			"apps",
			json!({
				"metadata": { "name": "api", "namespace": "apps" },
				"spec": {
					"replicas": 2,
					"selector": { "matchLabels": { "app": "api" } },
					"template": { "spec": { "containers": [{ "name": "api", "image": "api:1" }] } }
				},
				"status": { "readyReplicas": 2, "availableReplicas": 2 }
			}),
		);
		let q = queries(&f);

		match q
			.list(&config.id, Some("apps"), ResourceKind::Deployment)
			.await
			.unwrap()
		{
			ResourceList::Deployments(deployments) => {
				assert_eq!(deployments.len(), 1);
				assert_eq!(deployments[0].images, vec!["api:1"]);
				assert_eq!(deployments[0].available, 2);
			}
			other => panic!("unexpected listing: {other:?}"),
		}

		let err = q
			.list(&config.id, None, ResourceKind::Secret)
			.await
			.unwrap_err();
		assert!(matches!(err, ClusterError::UnsupportedKind(_)));
	}

	#[tokio::test]
	async fn test_passthrough_errors_surface() {
		let f = fixture(MockClusterApi::new()).await;
		let config = registered(&f).await;
		let q = queries(&f);

		let err = q
			.get_object(&config.id, ResourceKind::ConfigMap, None, "missing")
			.await
			.unwrap_err();
		assert!(err.is_not_found());

		let err = q
			.delete_object(
				&config.id,
				ResourceKind::Secret,
				None,
				"missing",
				&DeleteOptions::default(),
			)
			.await
			.unwrap_err();
		assert!(err.is_not_found());
	}

	#[tokio::test]
	async fn test_exec_defaults_to_first_container() {
		let f = fixture(MockClusterApi::new()).await;
		let config = registered(&f).await;
		f.api.seed(
			ResourceKind::Pod,
			"default",
			json!({
				"metadata": { "name": "web-1" },
				"spec": { "containers": [
					{ "name": "app", "image": "nginx" },
					{ "name": "proxy", "image": "envoy" },
				] },
			}),
		);
		let q = queries(&f);

		q.exec_pod(&config.id, None, "web-1", ExecOptions::default())
			.await
			.unwrap();
		let explicit = ExecOptions {
			container: Some("proxy".to_string()),
			..Default::default()
		};
		q.exec_pod(&config.id, None, "web-1", explicit).await.unwrap();

		let calls = f.api.exec_calls();
		assert_eq!(calls[0].options.container.as_deref(), Some("app"));
		assert_eq!(calls[1].options.container.as_deref(), Some("proxy"));
		assert_eq!(f.api.call_count("get_object"), 1);
	}

	#[tokio::test]
	async fn test_exec_rejects_pod_without_containers() {
		let f = fixture(MockClusterApi::new()).await;
		let config = registered(&f).await;
		f.api.seed_pod("default", "bare", &[]);
		let q = queries(&f);

		let err = q
			.exec_pod(&config.id, None, "bare", ExecOptions::default())
			.await
			.err()
			.unwrap();
		assert!(matches!(
			err,
			ClusterError::Kube(K8sError::InvalidObject { .. })
		));
		assert!(f.api.exec_calls().is_empty());
	}

	#[tokio::test]
	async fn test_log_stream_surfaces_missing_pod() {
		use futures::StreamExt;

		let f = fixture(MockClusterApi::new()).await;
		let config = registered(&f).await;
		f.api.seed_pod("default", "web-1", &[]);
		f.api.seed_logs("default", "web-1", &["started"]);
		let q = queries(&f);

		let stream = q
			.stream_pod_logs(&config.id, None, "web-1", &LogOptions::default())
			.await
			.unwrap();
		let chunks: Vec<_> = stream.collect().await;
		assert_eq!(chunks.len(), 1);

		let err = q
			.stream_pod_logs(&config.id, None, "gone", &LogOptions::default())
			.await
			.err()
			.unwrap();
		assert!(err.is_not_found());
	}

	#[tokio::test]
	async fn test_pod_write_invalidates_namespace_listing() {
		let f = fixture(MockClusterApi::new()).await;
		let config = registered(&f).await;
		let q = queries(&f);
		assert!(q.list_pods(&config.id, None).await.unwrap().is_empty());

		q.create_object(
			&config.id,
			ResourceKind::Pod,
			None,
			json!({ "apiVersion": "v1", "kind": "Pod", "metadata": { "name": "debug" } }),
		)
		.await
		.unwrap();

		assert_eq!(
			pod_names(&q.list_pods(&config.id, None).await.unwrap()),
			vec!["debug"]
		);
	}

	#[tokio::test]
	async fn test_evict_older_than() {
		let f = fixture(MockClusterApi::new()).await;
		let config = registered(&f).await;
		let q = queries(&f);
		q.list_pods(&config.id, None).await.unwrap();
		q.list_pods(&config.id, Some("apps")).await.unwrap();

		tokio::time::sleep(Duration::from_millis(20)).await;
		assert_eq!(q.evict_older_than(Duration::from_secs(600)), 0);
		assert_eq!(q.evict_older_than(Duration::from_millis(10)), 2);
	}
}
