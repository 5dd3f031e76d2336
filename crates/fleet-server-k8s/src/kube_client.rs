// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::SinkExt;
use kube::api::{Api, AttachParams, DynamicObject, ListParams, LogParams, PostParams};
use kube::config::KubeConfigOptions;
use kube::core::TypeMeta;
use kube::{Client, Config};
use tokio::sync::mpsc;
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument};

use crate::client::{ClientFactory, ClusterApi};
use crate::credential::ClusterCredential;
use crate::error::{K8sError, K8sResult};
use crate::kind::{DeleteOptions, ExecOptions, LogOptions, ResourceKind};
use crate::types::{
	AttachedProcess, DaemonSet, Deployment, Job, LogStream, Namespace, Pod, Service, StatefulSet,
	TerminalSize,
};

/// Production cluster client implementation using the kube crate.
///
/// Every call is wrapped in `call_timeout`; an elapsed timeout surfaces as
/// [`K8sError::Timeout`].
pub struct KubeClusterClient {
	client: Client,
	call_timeout: Duration,
}

impl KubeClusterClient {
	pub fn new(client: Client, call_timeout: Duration) -> Self {
		Self {
			client,
			call_timeout,
		}
	}

	/// Build a client from a decoded credential with bounded connect/read timeouts.
	pub async fn from_credential(
		credential: &ClusterCredential,
		timeout: Duration,
	) -> K8sResult<Self> {
		let options = KubeConfigOptions {
			context: credential.context.clone(),
			..Default::default()
		};

		let mut config = Config::from_custom_kubeconfig(credential.kubeconfig.clone(), &options)
			.await
			.map_err(|e| K8sError::ClientBuild {
				message: e.to_string(),
			})?;
		config.connect_timeout = Some(timeout);
		config.read_timeout = Some(timeout);

		let client = Client::try_from(config).map_err(|e| K8sError::ClientBuild {
			message: e.to_string(),
		})?;

		debug!(context = ?credential.context, "cluster client initialized");
		Ok(Self::new(client, timeout))
	}

	async fn bounded<T, F>(&self, fut: F) -> K8sResult<T>
	where
		F: Future<Output = Result<T, kube::Error>> + Send,
	{
		match tokio::time::timeout(self.call_timeout, fut).await {
			Ok(result) => result.map_err(K8sError::from),
			Err(_) => Err(K8sError::Timeout),
		}
	}

	fn dynamic(&self, kind: ResourceKind, namespace: &str) -> Api<DynamicObject> {
		Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource())
	}
}

/// Attach the addressed kind/name to not-found and already-exists answers.
fn classify(err: K8sError, kind: ResourceKind, name: &str) -> K8sError {
	if err.is_not_found() {
		K8sError::NotFound {
			kind: kind.to_string(),
			name: name.to_string(),
		}
	} else if err.is_already_exists() {
		K8sError::AlreadyExists {
			kind: kind.to_string(),
			name: name.to_string(),
		}
	} else {
		err
	}
}

/// Keep not-found and connection failures recognisable; report anything else via `wrap`.
fn session_error(err: K8sError, wrap: fn(String) -> K8sError) -> K8sError {
	if err.is_not_found() || err.is_connection_failure() {
		err
	} else {
		wrap(err.to_string())
	}
}

/// Relay resize requests onto the channel kube uses for the exec session.
fn forward_resizes(
	mut upstream: futures::channel::mpsc::Sender<kube::api::TerminalSize>,
) -> mpsc::Sender<TerminalSize> {
	let (tx, mut rx) = mpsc::channel::<TerminalSize>(8);
	tokio::spawn(async move {
		while let Some(size) = rx.recv().await {
			let size = kube::api::TerminalSize {
				width: size.width,
				height: size.height,
			};
			if upstream.send(size).await.is_err() {
				break;
			}
		}
	});
	tx
}

fn object_name<'a>(name: &'a Option<String>, kind: ResourceKind) -> K8sResult<&'a str> {
	name.as_deref().ok_or_else(|| K8sError::InvalidObject {
		message: format!("{kind} is missing metadata.name"),
	})
}

#[async_trait]
impl ClusterApi for KubeClusterClient {
	async fn ping(&self) -> K8sResult<()> {
		let namespaces: Api<Namespace> = Api::all(self.client.clone());
		self.bounded(namespaces.list(&ListParams::default().limit(1))).await?;
		Ok(())
	}

	async fn list_namespaces(&self) -> K8sResult<Vec<Namespace>> {
		let namespaces: Api<Namespace> = Api::all(self.client.clone());
		let list = self.bounded(namespaces.list(&ListParams::default())).await?;
		Ok(list.items)
	}

	async fn list_pods(&self, namespace: &str, label_selector: Option<&str>) -> K8sResult<Vec<Pod>> {
		let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
		let lp = match label_selector {
			Some(selector) => ListParams::default().labels(selector),
			None => ListParams::default(),
		};
		let list = self.bounded(pods.list(&lp)).await?;
		Ok(list.items)
	}

	async fn list_deployments(&self, namespace: &str) -> K8sResult<Vec<Deployment>> {
		let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
		Ok(self.bounded(api.list(&ListParams::default())).await?.items)
	}

	async fn list_services(&self, namespace: &str) -> K8sResult<Vec<Service>> {
		let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
		Ok(self.bounded(api.list(&ListParams::default())).await?.items)
	}

	async fn list_stateful_sets(&self, namespace: &str) -> K8sResult<Vec<StatefulSet>> {
		let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
		Ok(self.bounded(api.list(&ListParams::default())).await?.items)
	}

	async fn list_daemon_sets(&self, namespace: &str) -> K8sResult<Vec<DaemonSet>> {
		let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
		Ok(self.bounded(api.list(&ListParams::default())).await?.items)
	}

	async fn list_jobs(&self, namespace: &str) -> K8sResult<Vec<Job>> {
		let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
		Ok(self.bounded(api.list(&ListParams::default())).await?.items)
	}

	async fn pod_logs(&self, namespace: &str, name: &str, opts: &LogOptions) -> K8sResult<String> {
		let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
		let lp = LogParams {
			container: opts.container.clone(),
			tail_lines: opts.tail_lines,
			timestamps: opts.timestamps,
			..Default::default()
		};
		self
			.bounded(pods.logs(name, &lp))
			.await
			.map_err(|e| classify(e, ResourceKind::Pod, name))
	}

	#[instrument(skip(self, opts))]
	async fn stream_pod_logs(
		&self,
		namespace: &str,
		name: &str,
		opts: &LogOptions,
	) -> K8sResult<LogStream> {
		let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
		let lp = LogParams {
			container: opts.container.clone(),
			follow: true,
			tail_lines: opts.tail_lines,
			timestamps: opts.timestamps,
			..Default::default()
		};
		let reader = self
			.bounded(pods.log_stream(name, &lp))
			.await
			.map_err(|e| {
				session_error(classify(e, ResourceKind::Pod, name), |message| {
					K8sError::Stream { message }
				})
			})?;

		Ok(Box::pin(ReaderStream::new(reader.compat())))
	}

	#[instrument(skip(self, opts), fields(command = ?opts.command, container = ?opts.container))]
	async fn exec_attach(
		&self,
		namespace: &str,
		name: &str,
		opts: &ExecOptions,
	) -> K8sResult<AttachedProcess> {
		let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
		let ap = AttachParams {
			container: opts.container.clone(),
			stdin: true,
			stdout: true,
			stderr: false,
			tty: opts.tty,
			..Default::default()
		};

		let mut attached = self
			.bounded(pods.exec(name, opts.command.clone(), &ap))
			.await
			.map_err(|e| {
				session_error(classify(e, ResourceKind::Pod, name), |message| {
					K8sError::Exec { message }
				})
			})?;

		let stdin = attached.stdin().ok_or_else(|| K8sError::Exec {
			message: "stdin not available".into(),
		})?;
		let stdout = attached.stdout().ok_or_else(|| K8sError::Exec {
			message: "stdout not available".into(),
		})?;
		let resize = attached.terminal_size().map(forward_resizes);

		debug!(pod = name, namespace, "exec session attached");
		Ok(AttachedProcess {
			stdin: Box::pin(stdin),
			stdout: Box::pin(stdout),
			resize,
		})
	}

	async fn get_deployment(&self, namespace: &str, name: &str) -> K8sResult<Deployment> {
		let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
		self
			.bounded(api.get(name))
			.await
			.map_err(|e| classify(e, ResourceKind::Deployment, name))
	}

	#[instrument(skip(self, deployment), fields(name = ?deployment.metadata.name))]
	async fn create_deployment(
		&self,
		namespace: &str,
		deployment: &Deployment,
	) -> K8sResult<Deployment> {
		let name = object_name(&deployment.metadata.name, ResourceKind::Deployment)?;
		let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
		self
			.bounded(api.create(&PostParams::default(), deployment))
			.await
			.map_err(|e| classify(e, ResourceKind::Deployment, name))
	}

	#[instrument(skip(self, deployment), fields(name = ?deployment.metadata.name))]
	async fn replace_deployment(
		&self,
		namespace: &str,
		deployment: &Deployment,
	) -> K8sResult<Deployment> {
		let name = object_name(&deployment.metadata.name, ResourceKind::Deployment)?;
		let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
		self
			.bounded(api.replace(name, &PostParams::default(), deployment))
			.await
			.map_err(|e| classify(e, ResourceKind::Deployment, name))
	}

	async fn get_service(&self, namespace: &str, name: &str) -> K8sResult<Service> {
		let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
		self
			.bounded(api.get(name))
			.await
			.map_err(|e| classify(e, ResourceKind::Service, name))
	}

	#[instrument(skip(self, service), fields(name = ?service.metadata.name))]
	async fn create_service(&self, namespace: &str, service: &Service) -> K8sResult<Service> {
		let name = object_name(&service.metadata.name, ResourceKind::Service)?;
		let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
		self
			.bounded(api.create(&PostParams::default(), service))
			.await
			.map_err(|e| classify(e, ResourceKind::Service, name))
	}

	#[instrument(skip(self, service), fields(name = ?service.metadata.name))]
	async fn replace_service(&self, namespace: &str, service: &Service) -> K8sResult<Service> {
		let name = object_name(&service.metadata.name, ResourceKind::Service)?;
		let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
		self
			.bounded(api.replace(name, &PostParams::default(), service))
			.await
			.map_err(|e| classify(e, ResourceKind::Service, name))
	}

	async fn get_object(
		&self,
		kind: ResourceKind,
		namespace: &str,
		name: &str,
	) -> K8sResult<serde_json::Value> {
		let api = self.dynamic(kind, namespace);
		let obj = self
			.bounded(api.get(name))
			.await
			.map_err(|e| classify(e, kind, name))?;
		Ok(serde_json::to_value(obj)?)
	}

	#[instrument(skip(self, body))]
	async fn create_object(
		&self,
		kind: ResourceKind,
		namespace: &str,
		body: serde_json::Value,
	) -> K8sResult<serde_json::Value> {
		let obj = into_dynamic(kind, namespace, body)?;
		let name = object_name(&obj.metadata.name, kind)?.to_string();
		let api = self.dynamic(kind, namespace);
		let created = self
			.bounded(api.create(&PostParams::default(), &obj))
			.await
			.map_err(|e| classify(e, kind, &name))?;
		Ok(serde_json::to_value(created)?)
	}

	#[instrument(skip(self, body))]
	async fn replace_object(
		&self,
		kind: ResourceKind,
		namespace: &str,
		name: &str,
		body: serde_json::Value,
	) -> K8sResult<serde_json::Value> {
		let mut obj = into_dynamic(kind, namespace, body)?;
		obj.metadata.name = Some(name.to_string());
		let api = self.dynamic(kind, namespace);
		let replaced = self
			.bounded(api.replace(name, &PostParams::default(), &obj))
			.await
			.map_err(|e| classify(e, kind, name))?;
		Ok(serde_json::to_value(replaced)?)
	}

	#[instrument(skip(self))]
	async fn delete(
		&self,
		kind: ResourceKind,
		namespace: &str,
		name: &str,
		opts: &DeleteOptions,
	) -> K8sResult<()> {
		let api = self.dynamic(kind, namespace);
		self
			.bounded(api.delete(name, &opts.into()))
			.await
			.map_err(|e| classify(e, kind, name))?;
		Ok(())
	}
}

/// Deserialize a raw body, filling in type metadata and namespace.
fn into_dynamic(
	kind: ResourceKind,
	namespace: &str,
	body: serde_json::Value,
) -> K8sResult<DynamicObject> {
	let mut obj: DynamicObject = serde_json::from_value(body)?;
	let ar = kind.api_resource();
	match &obj.types {
		Some(types) if types.kind != ar.kind => {
			return Err(K8sError::InvalidObject {
				message: format!("body kind {} does not match {}", types.kind, ar.kind),
			});
		}
		Some(_) => {}
		None => {
			obj.types = Some(TypeMeta {
				api_version: ar.api_version.clone(),
				kind: ar.kind.clone(),
			});
		}
	}
	obj.metadata.namespace = Some(namespace.to_string());
	Ok(obj)
}

/// Factory producing [`KubeClusterClient`]s with a fixed timeout.
pub struct KubeClientFactory {
	timeout: Duration,
}

impl KubeClientFactory {
	pub fn new(timeout: Duration) -> Self {
		Self { timeout }
	}
}

#[async_trait]
impl ClientFactory for KubeClientFactory {
	async fn connect(&self, credential: &ClusterCredential) -> K8sResult<Arc<dyn ClusterApi>> {
		let client = KubeClusterClient::from_credential(credential, self.timeout).await?;
		Ok(Arc::new(client))
	}
}
