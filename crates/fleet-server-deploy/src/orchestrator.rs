// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Drives an application's cluster objects toward its record.
//!
//! `deploy` flips the record to `deploying` and hands the reconcile to a
//! bounded [`TaskPool`]; the caller never waits on the cluster. A reconcile
//! writes only the record's status, so `created_at` survives every transition.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fleet_server_clusters::{ClusterClientCache, ClusterError};
use fleet_server_config::DeployConfig;
use fleet_server_db::{
	Application, ApplicationResource, ApplicationResourceStore, ApplicationStatus, ApplicationStore,
};
use fleet_server_jobs::TaskPool;
use fleet_server_k8s::{ClusterApi, Deployment, K8sError, ResourceKind, Service};
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{DeployError, Result};
use crate::resource_set::ResourceSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Applied {
	Created,
	Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
	pub deployment: Applied,
	/// `None` when the service write failed. The reconcile still succeeds.
	pub service: Option<Applied>,
}

/// Live view of an application's deployment.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentStatusReport {
	pub application_id: String,
	pub status: String,
	pub replicas: i32,
	pub available_replicas: i32,
	pub ready_replicas: i32,
	pub updated_replicas: i32,
	pub created_at: Option<DateTime<Utc>>,
	pub last_deployed_at: Option<DateTime<Utc>>,
	pub container_name: Option<String>,
	pub container_port: Option<i32>,
}

impl DeploymentStatusReport {
	fn empty(app: &Application, status: &str) -> Self {
		Self {
			application_id: app.id.clone(),
			status: status.to_string(),
			replicas: 0,
			available_replicas: 0,
			ready_replicas: 0,
			updated_replicas: 0,
			created_at: None,
			last_deployed_at: app.last_deployed_at,
			container_name: None,
			container_port: None,
		}
	}
}

/// Status an application should have given its live deployment counts.
pub fn derive_status(desired: i32, available: i32) -> ApplicationStatus {
	if desired == 0 {
		ApplicationStatus::Stopped
	} else if available > 0 && available == desired {
		ApplicationStatus::Running
	} else {
		ApplicationStatus::Deploying
	}
}

pub struct DeploymentOrchestrator {
	clients: Arc<ClusterClientCache>,
	apps: Arc<dyn ApplicationStore>,
	resources: Arc<dyn ApplicationResourceStore>,
	pool: TaskPool,
	config: DeployConfig,
}

impl DeploymentOrchestrator {
	pub fn new(
		clients: Arc<ClusterClientCache>,
		apps: Arc<dyn ApplicationStore>,
		resources: Arc<dyn ApplicationResourceStore>,
		config: DeployConfig,
	) -> Self {
		Self {
			pool: TaskPool::new("reconcile", config.worker_pool_size),
			clients,
			apps,
			resources,
			config,
		}
	}

	pub fn config(&self) -> &DeployConfig {
		&self.config
	}

	/// Mark the application `deploying` and submit its reconcile.
	///
	/// The returned handle completes when the reconcile has finished; callers
	/// are free to drop it.
	#[instrument(skip(self))]
	pub async fn deploy(self: &Arc<Self>, app_id: &str) -> Result<JoinHandle<()>> {
		let app = self.load(app_id).await?;
		if !app.status.can_transition_to(ApplicationStatus::Deploying) {
			return Err(DeployError::InvalidTransition {
				from: app.status,
				to: ApplicationStatus::Deploying,
			});
		}

		self
			.apps
			.update_status(app_id, ApplicationStatus::Deploying)
			.await?;
		info!(app_id, name = %app.name, "deploy submitted");

		let this = Arc::clone(self);
		let label = format!("reconcile:{}", app.name);
		Ok(self.pool.spawn(label, async move {
			this.reconcile(&app).await.map(|_| ())
		}))
	}

	/// Apply the application's resource set and record the resulting status.
	#[instrument(skip(self, app), fields(app_id = %app.id, cluster_id = %app.cluster_config_id))]
	pub async fn reconcile(&self, app: &Application) -> Result<ReconcileOutcome> {
		let set = ResourceSet::from_application(app, &self.config);

		match self.apply(app, &set).await {
			Ok(outcome) => {
				self
					.apps
					.update_status(&app.id, ApplicationStatus::Running)
					.await?;
				self.record(app, &set, &outcome).await;
				info!(
					deployment = ?outcome.deployment,
					service = ?outcome.service,
					"application reconciled"
				);
				Ok(outcome)
			}
			Err(e) => {
				error!(error = %e, "reconcile failed");
				if let Err(status_err) = self.apps.update_status(&app.id, ApplicationStatus::Error).await {
					warn!(error = %status_err, "failed to record error status");
				}
				Err(e)
			}
		}
	}

	/// Read the live deployment and bring the record's status in line with it.
	#[instrument(skip(self))]
	pub async fn deployment_status(&self, app_id: &str) -> Result<DeploymentStatusReport> {
		let app = self.load(app_id).await?;

		let api = match self.clients.get_client(&app.cluster_config_id).await {
			Ok(api) => api,
			Err(ClusterError::ConfigNotFound(_)) => {
				return Ok(DeploymentStatusReport::empty(&app, "not_configured"))
			}
			Err(e) => return Err(e.into()),
		};

		let deployment = match api.get_deployment(&app.namespace, &app.name).await {
			Ok(deployment) => deployment,
			Err(e) if e.is_not_found() => {
				return Ok(DeploymentStatusReport::empty(&app, "not_deployed"))
			}
			Err(e) => {
				self.clients.note_failure(&app.cluster_config_id, &e);
				return Err(e.into());
			}
		};

		let spec = deployment.spec.as_ref();
		let status = deployment.status.as_ref();
		let desired = spec.and_then(|s| s.replicas).unwrap_or(1);
		let available = status.and_then(|s| s.available_replicas).unwrap_or(0);
		let derived = derive_status(desired, available);

		if derived != app.status && app.status != ApplicationStatus::Deleted {
			debug!(from = %app.status, to = %derived, "status follows live deployment");
			self.apps.update_status(&app.id, derived).await?;
		}

		let container = spec
			.and_then(|s| s.template.spec.as_ref())
			.and_then(|s| s.containers.first());

		Ok(DeploymentStatusReport {
			application_id: app.id.clone(),
			status: derived.to_string(),
			replicas: desired,
			available_replicas: available,
			ready_replicas: status.and_then(|s| s.ready_replicas).unwrap_or(0),
			updated_replicas: status.and_then(|s| s.updated_replicas).unwrap_or(0),
			created_at: deployment.metadata.creation_timestamp.as_ref().map(|t| t.0),
			last_deployed_at: app.last_deployed_at,
			container_name: container.map(|c| c.name.clone()),
			container_port: container
				.and_then(|c| c.ports.as_ref())
				.and_then(|p| p.first())
				.map(|p| p.container_port),
		})
	}

	async fn load(&self, app_id: &str) -> Result<Application> {
		self
			.apps
			.get_application(app_id)
			.await?
			.filter(|app| app.status != ApplicationStatus::Deleted)
			.ok_or_else(|| DeployError::ApplicationNotFound(app_id.to_string()))
	}

	async fn apply(&self, app: &Application, set: &ResourceSet) -> Result<ReconcileOutcome> {
		let cluster_id = app.cluster_config_id.as_str();
		let api = self.clients.get_client(cluster_id).await?;
		let ns = set.namespace.as_str();

		if let Some(config_map) = &set.config_map {
			let body = serde_json::to_value(config_map)?;
			self
				.apply_object(api.as_ref(), ResourceKind::ConfigMap, ns, body)
				.await
				.map_err(|e| self.failed(cluster_id, e))?;
		}
		if let Some(secret) = &set.secret {
			let body = serde_json::to_value(secret)?;
			self
				.apply_object(api.as_ref(), ResourceKind::Secret, ns, body)
				.await
				.map_err(|e| self.failed(cluster_id, e))?;
		}

		let deployment = apply_deployment(api.as_ref(), ns, &set.deployment)
			.await
			.map_err(|e| self.failed(cluster_id, e))?;

		let service = match apply_service(api.as_ref(), ns, &set.service).await {
			Ok(applied) => Some(applied),
			Err(e) => {
				warn!(app_id = %app.id, error = %e, "service apply failed, keeping deployment");
				self.clients.note_failure(cluster_id, &e);
				None
			}
		};

		Ok(ReconcileOutcome {
			deployment,
			service,
		})
	}

	async fn apply_object(
		&self,
		api: &dyn ClusterApi,
		kind: ResourceKind,
		namespace: &str,
		body: Value,
	) -> std::result::Result<Applied, K8sError> {
		match api.create_object(kind, namespace, body.clone()).await {
			Ok(_) => Ok(Applied::Created),
			Err(e) if e.is_already_exists() => {
				let name = body["metadata"]["name"].as_str().unwrap_or_default().to_string();
				let existing = api.get_object(kind, namespace, &name).await?;
				let mut body = body;
				body["metadata"]["resourceVersion"] = existing["metadata"]["resourceVersion"].clone();
				api.replace_object(kind, namespace, &name, body).await?;
				Ok(Applied::Updated)
			}
			Err(e) => Err(e),
		}
	}

	async fn record(&self, app: &Application, set: &ResourceSet, outcome: &ReconcileOutcome) {
		let records: Vec<_> = set
			.objects()
			.into_iter()
			.filter(|(kind, _)| *kind != ResourceKind::Service || outcome.service.is_some())
			.map(|(kind, name)| ApplicationResource::new(&app.id, kind.as_str(), name, &set.namespace))
			.collect();

		if let Err(e) = self.resources.replace_for_application(&app.id, &records).await {
			warn!(app_id = %app.id, error = %e, "failed to record applied resources");
		}
	}

	fn failed(&self, cluster_id: &str, err: K8sError) -> DeployError {
		self.clients.note_failure(cluster_id, &err);
		DeployError::Kube(err)
	}
}

/// Create the deployment, or replace it in place when it already exists.
async fn apply_deployment(
	api: &dyn ClusterApi,
	namespace: &str,
	desired: &Deployment,
) -> std::result::Result<Applied, K8sError> {
	match api.create_deployment(namespace, desired).await {
		Ok(_) => Ok(Applied::Created),
		Err(e) if e.is_already_exists() => {
			let name = desired.metadata.name.as_deref().unwrap_or_default();
			let existing = api.get_deployment(namespace, name).await?;
			let mut desired = desired.clone();
			desired.metadata.resource_version = existing.metadata.resource_version;
			api.replace_deployment(namespace, &desired).await?;
			Ok(Applied::Updated)
		}
		Err(e) => Err(e),
	}
}

/// Like [`apply_deployment`]; the allocated cluster IP is carried over on replace.
async fn apply_service(
	api: &dyn ClusterApi,
	namespace: &str,
	desired: &Service,
) -> std::result::Result<Applied, K8sError> {
	match api.create_service(namespace, desired).await {
		Ok(_) => Ok(Applied::Created),
		Err(e) if e.is_already_exists() => {
			let name = desired.metadata.name.as_deref().unwrap_or_default();
			let existing = api.get_service(namespace, name).await?;
			let mut desired = desired.clone();
			desired.metadata.resource_version = existing.metadata.resource_version;
			if let (Some(spec), Some(live)) = (desired.spec.as_mut(), existing.spec) {
				spec.cluster_ip = live.cluster_ip;
				spec.cluster_ips = live.cluster_ips;
			}
			api.replace_service(namespace, &desired).await?;
			Ok(Applied::Updated)
		}
		Err(e) => Err(e),
	}
}
