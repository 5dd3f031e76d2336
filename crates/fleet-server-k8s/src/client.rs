// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;

use crate::credential::ClusterCredential;
use crate::error::K8sResult;
use crate::kind::{DeleteOptions, ExecOptions, LogOptions, ResourceKind};
use crate::types::{
	AttachedProcess, DaemonSet, Deployment, Job, LogStream, Namespace, Pod, Service, StatefulSet,
};

/// Operations Fleet issues against a single cluster.
///
/// This abstraction allows for easy mocking in tests while providing a clean
/// interface for the cluster calls needed by the caches, the orchestrator and
/// the teardown coordinator. Every implementation must bound each call in time.
#[async_trait]
pub trait ClusterApi: Send + Sync {
	/// Cheap liveness check: list at most one namespace.
	async fn ping(&self) -> K8sResult<()>;

	async fn list_namespaces(&self) -> K8sResult<Vec<Namespace>>;

	/// List pods in a namespace, optionally filtered by a label selector.
	async fn list_pods(&self, namespace: &str, label_selector: Option<&str>) -> K8sResult<Vec<Pod>>;

	async fn list_deployments(&self, namespace: &str) -> K8sResult<Vec<Deployment>>;

	async fn list_services(&self, namespace: &str) -> K8sResult<Vec<Service>>;

	async fn list_stateful_sets(&self, namespace: &str) -> K8sResult<Vec<StatefulSet>>;

	async fn list_daemon_sets(&self, namespace: &str) -> K8sResult<Vec<DaemonSet>>;

	async fn list_jobs(&self, namespace: &str) -> K8sResult<Vec<Job>>;

	/// Fetch (not follow) the logs of a pod's container.
	async fn pod_logs(&self, namespace: &str, name: &str, opts: &LogOptions) -> K8sResult<String>;

	/// Follow the logs of a pod's container.
	///
	/// Only opening the stream is bounded in time; the stream itself runs until
	/// the container stops or the caller drops it.
	async fn stream_pod_logs(
		&self,
		namespace: &str,
		name: &str,
		opts: &LogOptions,
	) -> K8sResult<LogStream>;

	/// Run a command in a pod's container with interactive stdio.
	async fn exec_attach(
		&self,
		namespace: &str,
		name: &str,
		opts: &ExecOptions,
	) -> K8sResult<AttachedProcess>;

	async fn get_deployment(&self, namespace: &str, name: &str) -> K8sResult<Deployment>;

	/// Create a deployment. Fails with `AlreadyExists` when the name is taken.
	async fn create_deployment(&self, namespace: &str, deployment: &Deployment)
		-> K8sResult<Deployment>;

	/// Replace an existing deployment. The caller supplies the resource version.
	async fn replace_deployment(
		&self,
		namespace: &str,
		deployment: &Deployment,
	) -> K8sResult<Deployment>;

	async fn get_service(&self, namespace: &str, name: &str) -> K8sResult<Service>;

	async fn create_service(&self, namespace: &str, service: &Service) -> K8sResult<Service>;

	async fn replace_service(&self, namespace: &str, service: &Service) -> K8sResult<Service>;

	/// Get any supported kind as raw JSON.
	async fn get_object(
		&self,
		kind: ResourceKind,
		namespace: &str,
		name: &str,
	) -> K8sResult<serde_json::Value>;

	/// Create any supported kind from raw JSON.
	async fn create_object(
		&self,
		kind: ResourceKind,
		namespace: &str,
		body: serde_json::Value,
	) -> K8sResult<serde_json::Value>;

	/// Replace any supported kind from raw JSON.
	async fn replace_object(
		&self,
		kind: ResourceKind,
		namespace: &str,
		name: &str,
		body: serde_json::Value,
	) -> K8sResult<serde_json::Value>;

	/// Delete a named object. A missing object yields `NotFound`.
	async fn delete(
		&self,
		kind: ResourceKind,
		namespace: &str,
		name: &str,
		opts: &DeleteOptions,
	) -> K8sResult<()>;
}

/// Builds live clients from decoded credentials.
#[async_trait]
pub trait ClientFactory: Send + Sync {
	async fn connect(&self, credential: &ClusterCredential) -> K8sResult<Arc<dyn ClusterApi>>;
}
