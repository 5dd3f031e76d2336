// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! In-memory cluster used by tests across the workspace.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::client::{ClientFactory, ClusterApi};
use crate::credential::ClusterCredential;
use crate::error::{K8sError, K8sResult};
use crate::kind::{DeleteOptions, ExecOptions, LogOptions, ResourceKind};
use crate::types::{
	AttachedProcess, DaemonSet, Deployment, Job, LogStream, Namespace, ObjectMeta, Pod, Service,
	StatefulSet, TerminalSize,
};

type ObjectKey = (ResourceKind, String, String);

/// A recorded delete call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteCall {
	pub kind: ResourceKind,
	pub namespace: String,
	pub name: String,
	pub options: DeleteOptions,
}

/// A recorded exec call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCall {
	pub namespace: String,
	pub pod: String,
	pub options: ExecOptions,
}

/// Mock cluster storing objects as JSON keyed by kind, namespace and name.
///
/// Creates assign a resource version; replaces reject stale resource versions
/// and changes to an existing service's `clusterIP`, like the real API server.
/// Exec sessions echo their stdin back on stdout.
#[derive(Default)]
pub struct MockClusterApi {
	objects: Mutex<BTreeMap<ObjectKey, Value>>,
	namespaces: Mutex<Vec<String>>,
	calls: Mutex<HashMap<String, usize>>,
	deletes: Mutex<Vec<DeleteCall>>,
	execs: Mutex<Vec<ExecCall>>,
	resizes: Arc<Mutex<Vec<TerminalSize>>>,
	logs: Mutex<HashMap<(String, String), Vec<String>>>,
	failing_deletes: Mutex<HashSet<ResourceKind>>,
	list_delay: Mutex<Option<Duration>>,
	fail_ping: AtomicBool,
	fail_lists: AtomicBool,
	fail_service_writes: AtomicBool,
	version: AtomicU64,
}

impl MockClusterApi {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_namespaces(names: &[&str]) -> Self {
		let mock = Self::new();
		for name in names {
			mock.add_namespace(name);
		}
		mock
	}

	pub fn add_namespace(&self, name: &str) {
		self.namespaces.lock().push(name.to_string());
	}

	/// Store an object as-is. `metadata.name` must be set.
	pub fn seed(&self, kind: ResourceKind, namespace: &str, object: Value) {
		let name = object["metadata"]["name"]
			.as_str()
			.unwrap_or_default()
			.to_string();
		self
			.objects
			.lock()
			.insert((kind, namespace.to_string(), name), object);
	}

	pub fn seed_pod(&self, namespace: &str, name: &str, labels: &[(&str, &str)]) {
		let labels: BTreeMap<&str, &str> = labels.iter().copied().collect();
		self.seed(
			ResourceKind::Pod,
			namespace,
			json!({
				"apiVersion": "v1",
				"kind": "Pod",
				"metadata": {
					"name": name,
					"namespace": namespace,
					"labels": labels,
					"creationTimestamp": "2025-01-01T00:00:00Z",
				},
				"status": { "phase": "Running" },
			}),
		);
	}

	/// Log lines returned by both log calls for a pod.
	pub fn seed_logs(&self, namespace: &str, pod: &str, lines: &[&str]) {
		self.logs.lock().insert(
			(namespace.to_string(), pod.to_string()),
			lines.iter().map(|l| l.to_string()).collect(),
		);
	}

	pub fn object(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<Value> {
		self
			.objects
			.lock()
			.get(&(kind, namespace.to_string(), name.to_string()))
			.cloned()
	}

	pub fn contains(&self, kind: ResourceKind, namespace: &str, name: &str) -> bool {
		self.object(kind, namespace, name).is_some()
	}

	pub fn count(&self, kind: ResourceKind) -> usize {
		self
			.objects
			.lock()
			.keys()
			.filter(|(k, _, _)| *k == kind)
			.count()
	}

	/// Number of times `op` (the trait method name) was called.
	pub fn call_count(&self, op: &str) -> usize {
		self.calls.lock().get(op).copied().unwrap_or(0)
	}

	pub fn delete_calls(&self) -> Vec<DeleteCall> {
		self.deletes.lock().clone()
	}

	pub fn exec_calls(&self) -> Vec<ExecCall> {
		self.execs.lock().clone()
	}

	/// Terminal sizes received by exec sessions, in arrival order.
	pub fn resizes(&self) -> Vec<TerminalSize> {
		self.resizes.lock().clone()
	}

	pub fn set_fail_ping(&self, fail: bool) {
		self.fail_ping.store(fail, Ordering::SeqCst);
	}

	pub fn set_fail_lists(&self, fail: bool) {
		self.fail_lists.store(fail, Ordering::SeqCst);
	}

	pub fn set_fail_service_writes(&self, fail: bool) {
		self.fail_service_writes.store(fail, Ordering::SeqCst);
	}

	pub fn fail_deletes_for(&self, kind: ResourceKind) {
		self.failing_deletes.lock().insert(kind);
	}

	/// Delay every list call, to hold requests in flight.
	pub fn set_list_delay(&self, delay: Duration) {
		*self.list_delay.lock() = Some(delay);
	}

	fn record(&self, op: &str) {
		*self.calls.lock().entry(op.to_string()).or_insert(0) += 1;
	}

	async fn before_list(&self, op: &str) -> K8sResult<()> {
		self.record(op);
		let delay = *self.list_delay.lock();
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}
		if self.fail_lists.load(Ordering::SeqCst) {
			return Err(unreachable_error());
		}
		Ok(())
	}

	fn list_typed<T: DeserializeOwned>(
		&self,
		kind: ResourceKind,
		namespace: &str,
		selector: Option<&str>,
	) -> K8sResult<Vec<T>> {
		let required = selector.map(parse_selector).unwrap_or_default();
		let objects = self.objects.lock();
		objects
			.iter()
			.filter(|((k, ns, _), _)| *k == kind && ns == namespace)
			.filter(|(_, obj)| matches_labels(obj, &required))
			.map(|(_, obj)| serde_json::from_value(obj.clone()).map_err(K8sError::from))
			.collect()
	}

	/// Seeded log lines for a pod, limited to the last `tail_lines`.
	fn log_lines(&self, namespace: &str, pod: &str, opts: &LogOptions) -> Vec<String> {
		let lines = self
			.logs
			.lock()
			.get(&(namespace.to_string(), pod.to_string()))
			.cloned()
			.unwrap_or_default();
		match opts.tail_lines {
			Some(n) => {
				let skip = lines.len().saturating_sub(usize::try_from(n).unwrap_or(0));
				lines.into_iter().skip(skip).collect()
			}
			None => lines,
		}
	}

	fn get_value(&self, kind: ResourceKind, namespace: &str, name: &str) -> K8sResult<Value> {
		self.object(kind, namespace, name).ok_or_else(|| K8sError::NotFound {
			kind: kind.to_string(),
			name: name.to_string(),
		})
	}

	fn next_version(&self) -> String {
		(self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
	}

	fn create_value(&self, kind: ResourceKind, namespace: &str, mut obj: Value) -> K8sResult<Value> {
		let name = name_of(&obj, kind)?;
		let key = (kind, namespace.to_string(), name.clone());
		let mut objects = self.objects.lock();
		if objects.contains_key(&key) {
			return Err(K8sError::AlreadyExists {
				kind: kind.to_string(),
				name,
			});
		}
		obj["metadata"]["namespace"] = json!(namespace);
		obj["metadata"]["resourceVersion"] = json!(self.next_version());
		if kind == ResourceKind::Service && obj["spec"]["clusterIP"].is_null() {
			obj["spec"]["clusterIP"] = json!(format!("10.96.0.{}", objects.len() + 1));
		}
		objects.insert(key, obj.clone());
		Ok(obj)
	}

	fn replace_value(&self, kind: ResourceKind, namespace: &str, mut obj: Value) -> K8sResult<Value> {
		let name = name_of(&obj, kind)?;
		let key = (kind, namespace.to_string(), name.clone());
		let mut objects = self.objects.lock();
		let existing = objects.get(&key).ok_or_else(|| K8sError::NotFound {
			kind: kind.to_string(),
			name: name.clone(),
		})?;

		let sent_version = &obj["metadata"]["resourceVersion"];
		if !sent_version.is_null() && sent_version != &existing["metadata"]["resourceVersion"] {
			return Err(K8sError::ApiError {
				code: 409,
				reason: "Conflict".into(),
				message: format!("the object has been modified: {kind}/{name}"),
			});
		}
		if kind == ResourceKind::Service && obj["spec"]["clusterIP"] != existing["spec"]["clusterIP"] {
			return Err(K8sError::ApiError {
				code: 422,
				reason: "Invalid".into(),
				message: "spec.clusterIP: Invalid value: field is immutable".into(),
			});
		}

		obj["metadata"]["namespace"] = json!(namespace);
		obj["metadata"]["resourceVersion"] = json!(self.next_version());
		objects.insert(key, obj.clone());
		Ok(obj)
	}

	fn check_service_writes(&self) -> K8sResult<()> {
		if self.fail_service_writes.load(Ordering::SeqCst) {
			return Err(K8sError::ApiError {
				code: 422,
				reason: "Invalid".into(),
				message: "service rejected".into(),
			});
		}
		Ok(())
	}
}

fn unreachable_error() -> K8sError {
	K8sError::Transport {
		message: "connection refused".into(),
	}
}

fn name_of(obj: &Value, kind: ResourceKind) -> K8sResult<String> {
	obj["metadata"]["name"]
		.as_str()
		.map(str::to_string)
		.ok_or_else(|| K8sError::InvalidObject {
			message: format!("{kind} is missing metadata.name"),
		})
}

fn to_value<T: Serialize>(obj: &T) -> K8sResult<Value> {
	Ok(serde_json::to_value(obj)?)
}

fn from_value<T: DeserializeOwned>(value: Value) -> K8sResult<T> {
	Ok(serde_json::from_value(value)?)
}

/// Equality-only label selector: `a=b,c=d`.
fn parse_selector(selector: &str) -> Vec<(String, String)> {
	selector
		.split(',')
		.filter_map(|term| term.split_once('='))
		.map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
		.collect()
}

fn matches_labels(obj: &Value, required: &[(String, String)]) -> bool {
	required
		.iter()
		.all(|(k, v)| obj["metadata"]["labels"][k].as_str() == Some(v.as_str()))
}

#[async_trait]
impl ClusterApi for MockClusterApi {
	async fn ping(&self) -> K8sResult<()> {
		self.record("ping");
		if self.fail_ping.load(Ordering::SeqCst) {
			return Err(unreachable_error());
		}
		Ok(())
	}

	async fn list_namespaces(&self) -> K8sResult<Vec<Namespace>> {
		self.before_list("list_namespaces").await?;
		let names = self.namespaces.lock().clone();
		Ok(names
			.into_iter()
			.map(|name| Namespace {
				metadata: ObjectMeta {
					name: Some(name),
					..Default::default()
				},
				..Default::default()
			})
			.collect())
	}

	async fn list_pods(&self, namespace: &str, label_selector: Option<&str>) -> K8sResult<Vec<Pod>> {
		self.before_list("list_pods").await?;
		self.list_typed(ResourceKind::Pod, namespace, label_selector)
	}

	async fn list_deployments(&self, namespace: &str) -> K8sResult<Vec<Deployment>> {
		self.before_list("list_deployments").await?;
		self.list_typed(ResourceKind::Deployment, namespace, None)
	}

	async fn list_services(&self, namespace: &str) -> K8sResult<Vec<Service>> {
		self.before_list("list_services").await?;
		self.list_typed(ResourceKind::Service, namespace, None)
	}

	async fn list_stateful_sets(&self, namespace: &str) -> K8sResult<Vec<StatefulSet>> {
		self.before_list("list_stateful_sets").await?;
		self.list_typed(ResourceKind::StatefulSet, namespace, None)
	}

	async fn list_daemon_sets(&self, namespace: &str) -> K8sResult<Vec<DaemonSet>> {
		self.before_list("list_daemon_sets").await?;
		self.list_typed(ResourceKind::DaemonSet, namespace, None)
	}

	async fn list_jobs(&self, namespace: &str) -> K8sResult<Vec<Job>> {
		self.before_list("list_jobs").await?;
		self.list_typed(ResourceKind::Job, namespace, None)
	}

	async fn pod_logs(&self, namespace: &str, name: &str, opts: &LogOptions) -> K8sResult<String> {
		self.record("pod_logs");
		self.get_value(ResourceKind::Pod, namespace, name)?;
		let lines = self.log_lines(namespace, name, opts);
		if lines.is_empty() {
			let container = opts.container.as_deref().unwrap_or("main");
			return Ok(format!("log line from {namespace}/{name}/{container}\n"));
		}
		Ok(lines.iter().map(|l| format!("{l}\n")).collect())
	}

	async fn stream_pod_logs(
		&self,
		namespace: &str,
		name: &str,
		opts: &LogOptions,
	) -> K8sResult<LogStream> {
		self.record("stream_pod_logs");
		self.get_value(ResourceKind::Pod, namespace, name)?;
		let chunks: Vec<Result<Bytes, std::io::Error>> = self
			.log_lines(namespace, name, opts)
			.into_iter()
			.map(|l| Ok(Bytes::from(format!("{l}\n"))))
			.collect();
		Ok(Box::pin(futures::stream::iter(chunks)))
	}

	async fn exec_attach(
		&self,
		namespace: &str,
		name: &str,
		opts: &ExecOptions,
	) -> K8sResult<AttachedProcess> {
		self.record("exec_attach");
		self.get_value(ResourceKind::Pod, namespace, name)?;
		self.execs.lock().push(ExecCall {
			namespace: namespace.to_string(),
			pod: name.to_string(),
			options: opts.clone(),
		});

		let (stdin, mut remote_in) = tokio::io::duplex(4096);
		let (mut remote_out, stdout) = tokio::io::duplex(4096);
		tokio::spawn(async move {
			let mut buf = [0u8; 1024];
			loop {
				match remote_in.read(&mut buf).await {
					Ok(0) | Err(_) => break,
					Ok(n) => {
						if remote_out.write_all(&buf[..n]).await.is_err() {
							break;
						}
					}
				}
			}
		});

		let resize = opts.tty.then(|| {
			let (tx, mut rx) = mpsc::channel::<TerminalSize>(8);
			let sizes = Arc::clone(&self.resizes);
			tokio::spawn(async move {
				while let Some(size) = rx.recv().await {
					sizes.lock().push(size);
				}
			});
			tx
		});

		Ok(AttachedProcess {
			stdin: Box::pin(stdin),
			stdout: Box::pin(stdout),
			resize,
		})
	}

	async fn get_deployment(&self, namespace: &str, name: &str) -> K8sResult<Deployment> {
		self.record("get_deployment");
		from_value(self.get_value(ResourceKind::Deployment, namespace, name)?)
	}

	async fn create_deployment(
		&self,
		namespace: &str,
		deployment: &Deployment,
	) -> K8sResult<Deployment> {
		self.record("create_deployment");
		let created = self.create_value(ResourceKind::Deployment, namespace, to_value(deployment)?)?;
		from_value(created)
	}

	async fn replace_deployment(
		&self,
		namespace: &str,
		deployment: &Deployment,
	) -> K8sResult<Deployment> {
		self.record("replace_deployment");
		let replaced = self.replace_value(ResourceKind::Deployment, namespace, to_value(deployment)?)?;
		from_value(replaced)
	}

	async fn get_service(&self, namespace: &str, name: &str) -> K8sResult<Service> {
		self.record("get_service");
		from_value(self.get_value(ResourceKind::Service, namespace, name)?)
	}

	async fn create_service(&self, namespace: &str, service: &Service) -> K8sResult<Service> {
		self.record("create_service");
		self.check_service_writes()?;
		let created = self.create_value(ResourceKind::Service, namespace, to_value(service)?)?;
		from_value(created)
	}

	async fn replace_service(&self, namespace: &str, service: &Service) -> K8sResult<Service> {
		self.record("replace_service");
		self.check_service_writes()?;
		let replaced = self.replace_value(ResourceKind::Service, namespace, to_value(service)?)?;
		from_value(replaced)
	}

	async fn get_object(
		&self,
		kind: ResourceKind,
		namespace: &str,
		name: &str,
	) -> K8sResult<Value> {
		self.record("get_object");
		self.get_value(kind, namespace, name)
	}

	async fn create_object(
		&self,
		kind: ResourceKind,
		namespace: &str,
		body: Value,
	) -> K8sResult<Value> {
		self.record("create_object");
		self.create_value(kind, namespace, body)
	}

	async fn replace_object(
		&self,
		kind: ResourceKind,
		namespace: &str,
		name: &str,
		mut body: Value,
	) -> K8sResult<Value> {
		self.record("replace_object");
		body["metadata"]["name"] = json!(name);
		self.replace_value(kind, namespace, body)
	}

	async fn delete(
		&self,
		kind: ResourceKind,
		namespace: &str,
		name: &str,
		opts: &DeleteOptions,
	) -> K8sResult<()> {
		self.record("delete");
		self.deletes.lock().push(DeleteCall {
			kind,
			namespace: namespace.to_string(),
			name: name.to_string(),
			options: *opts,
		});

		if self.failing_deletes.lock().contains(&kind) {
			return Err(K8sError::ApiError {
				code: 403,
				reason: "Forbidden".into(),
				message: format!("cannot delete {kind}"),
			});
		}

		let removed = self
			.objects
			.lock()
			.remove(&(kind, namespace.to_string(), name.to_string()));
		match removed {
			Some(_) => Ok(()),
			None => Err(K8sError::NotFound {
				kind: kind.to_string(),
				name: name.to_string(),
			}),
		}
	}
}

/// Factory handing out one shared [`MockClusterApi`].
#[derive(Default)]
pub struct MockClientFactory {
	api: Arc<MockClusterApi>,
	builds: AtomicUsize,
	fail: AtomicBool,
}

impl MockClientFactory {
	pub fn new(api: Arc<MockClusterApi>) -> Self {
		Self {
			api,
			builds: AtomicUsize::new(0),
			fail: AtomicBool::new(false),
		}
	}

	pub fn api(&self) -> Arc<MockClusterApi> {
		Arc::clone(&self.api)
	}

	/// Number of clients built so far.
	pub fn builds(&self) -> usize {
		self.builds.load(Ordering::SeqCst)
	}

	pub fn set_fail(&self, fail: bool) {
		self.fail.store(fail, Ordering::SeqCst);
	}
}

#[async_trait]
impl ClientFactory for MockClientFactory {
	async fn connect(&self, _credential: &ClusterCredential) -> K8sResult<Arc<dyn ClusterApi>> {
		self.builds.fetch_add(1, Ordering::SeqCst);
		if self.fail.load(Ordering::SeqCst) {
			return Err(K8sError::ClientBuild {
				message: "mock client build failure".into(),
			});
		}
		Ok(self.api.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn list_pods_filters_by_selector() {
		let mock = MockClusterApi::new();
		mock.seed_pod("apps", "web-1", &[("app", "web")]);
		mock.seed_pod("apps", "db-1", &[("app", "db")]);
		mock.seed_pod("other", "web-2", &[("app", "web")]);

		let pods = mock.list_pods("apps", Some("app=web")).await.unwrap();
		assert_eq!(pods.len(), 1);
		assert_eq!(pods[0].metadata.name.as_deref(), Some("web-1"));

		assert_eq!(mock.list_pods("apps", None).await.unwrap().len(), 2);
		assert_eq!(mock.call_count("list_pods"), 2);
	}

	#[test]
	fn failing_factory_reports_client_build_error() {
		let factory = MockClientFactory::new(Arc::new(MockClusterApi::new()));
		let credential = ClusterCredential {
			kubeconfig: Default::default(),
			context: None,
		};

		assert!(tokio_test::block_on(factory.connect(&credential)).is_ok());
		factory.set_fail(true);
		let result = tokio_test::block_on(factory.connect(&credential));
		assert!(matches!(result, Err(K8sError::ClientBuild { .. })));
		assert_eq!(factory.builds(), 2);
	}

	#[tokio::test]
	async fn exec_session_echoes_and_records_resizes() {
		let mock = MockClusterApi::new();
		mock.seed_pod("apps", "web-1", &[]);

		let mut process = mock
			.exec_attach("apps", "web-1", &ExecOptions::default())
			.await
			.unwrap();
		process.stdin.write_all(b"ls\n").await.unwrap();
		let mut buf = [0u8; 3];
		process.stdout.read_exact(&mut buf).await.unwrap();
		assert_eq!(&buf, b"ls\n");

		let resize = process.resize.take().unwrap();
		resize
			.send(TerminalSize {
				width: 120,
				height: 40,
			})
			.await
			.unwrap();
		drop(resize);
		for _ in 0..10 {
			if !mock.resizes().is_empty() {
				break;
			}
			tokio::task::yield_now().await;
		}
		assert_eq!(
			mock.resizes(),
			vec![TerminalSize {
				width: 120,
				height: 40
			}]
		);
		assert_eq!(mock.exec_calls()[0].options.command, vec!["/bin/sh"]);
	}

	#[tokio::test]
	async fn streamed_logs_honour_tail_lines() {
		use futures::StreamExt;

		let mock = MockClusterApi::new();
		mock.seed_pod("apps", "web-1", &[]);
		mock.seed_logs("apps", "web-1", &["one", "two", "three"]);

		let opts = LogOptions {
			tail_lines: Some(2),
			..Default::default()
		};
		let chunks: Vec<_> = mock
			.stream_pod_logs("apps", "web-1", &opts)
			.await
			.unwrap()
			.collect()
			.await;
		let text: String = chunks
			.into_iter()
			.map(|c| String::from_utf8(c.unwrap().to_vec()).unwrap())
			.collect();
		assert_eq!(text, "two\nthree\n");

		let err = mock
			.stream_pod_logs("apps", "missing", &opts)
			.await
			.err()
			.unwrap();
		assert!(err.is_not_found());
	}

	#[tokio::test]
	async fn delete_missing_object_is_not_found() {
		let mock = MockClusterApi::new();
		let err = mock
			.delete(ResourceKind::Secret, "apps", "gone", &DeleteOptions::default())
			.await
			.unwrap_err();
		assert!(err.is_not_found());
		assert_eq!(mock.delete_calls().len(), 1);
	}

	#[tokio::test]
	async fn service_cluster_ip_is_immutable() {
		let mock = MockClusterApi::new();
		let body = json!({ "metadata": { "name": "web" }, "spec": { "ports": [] } });
		let created = mock
			.create_object(ResourceKind::Service, "apps", body.clone())
			.await
			.unwrap();
		assert!(created["spec"]["clusterIP"].is_string());

		let err = mock
			.replace_object(ResourceKind::Service, "apps", "web", body)
			.await
			.unwrap_err();
		assert!(matches!(err, K8sError::ApiError { code: 422, .. }));
	}

	#[tokio::test]
	async fn factory_counts_builds_and_fails_on_demand() {
		let factory = MockClientFactory::new(Arc::new(MockClusterApi::new()));
		let cred = crate::credential::load_credential(
			crate::credential::tests::SAMPLE_KUBECONFIG,
			None,
		)
		.unwrap();

		factory.connect(&cred).await.unwrap();
		factory.set_fail(true);
		assert!(factory.connect(&cred).await.is_err());
		assert_eq!(factory.builds(), 2);
	}
}
