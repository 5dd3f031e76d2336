// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Create, update and delete of application records, tied to deploy and teardown.

use std::collections::BTreeMap;
use std::sync::Arc;

use fleet_server_db::{
	Application, ApplicationFilter, ApplicationStatus, ApplicationStore, ClusterConfigStore, EnvVarSpec,
};
use fleet_server_k8s::PropagationPolicy;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::{DeployError, Result};
use crate::orchestrator::DeploymentOrchestrator;
use crate::teardown::{TeardownCoordinator, TeardownReport, TeardownRequest};

/// Fields accepted when creating an application.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewApplication {
	pub name: String,
	pub description: Option<String>,
	pub namespace: Option<String>,
	pub cluster_config_id: String,
	pub image: Option<String>,
	pub replicas: Option<i32>,
	pub port: Option<i32>,
	pub service_type: Option<String>,
	#[serde(default)]
	pub env_vars: Vec<EnvVarSpec>,
	#[serde(default)]
	pub command: Vec<String>,
	#[serde(default)]
	pub args: Vec<String>,
	#[serde(default)]
	pub labels: BTreeMap<String, String>,
	#[serde(default)]
	pub annotations: BTreeMap<String, String>,
	#[serde(default)]
	pub node_selector: BTreeMap<String, String>,
	pub image_pull_policy: Option<String>,
	pub cpu_request: Option<String>,
	pub cpu_limit: Option<String>,
	pub memory_request: Option<String>,
	pub memory_limit: Option<String>,
	#[serde(default)]
	pub config_data: BTreeMap<String, String>,
	#[serde(default)]
	pub secret_data: BTreeMap<String, String>,
}

/// Partial update. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationUpdate {
	pub description: Option<String>,
	pub image: Option<String>,
	pub replicas: Option<i32>,
	pub port: Option<i32>,
	pub service_type: Option<String>,
	pub env_vars: Option<Vec<EnvVarSpec>>,
	pub command: Option<Vec<String>>,
	pub args: Option<Vec<String>>,
	pub labels: Option<BTreeMap<String, String>>,
	pub annotations: Option<BTreeMap<String, String>>,
	pub node_selector: Option<BTreeMap<String, String>>,
	pub image_pull_policy: Option<String>,
	pub cpu_request: Option<String>,
	pub cpu_limit: Option<String>,
	pub memory_request: Option<String>,
	pub memory_limit: Option<String>,
	pub config_data: Option<BTreeMap<String, String>>,
	pub secret_data: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteApplicationOptions {
	#[serde(default = "default_true")]
	pub delete_resources: bool,
	#[serde(default)]
	pub propagation: PropagationPolicy,
	#[serde(default)]
	pub force: bool,
}

fn default_true() -> bool {
	true
}

impl Default for DeleteApplicationOptions {
	fn default() -> Self {
		Self {
			delete_resources: true,
			propagation: PropagationPolicy::default(),
			force: false,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteOutcome {
	/// False when there was no record to delete.
	pub record_deleted: bool,
	pub teardown: Option<TeardownReport>,
	/// Set when the cluster could not be reached for teardown.
	pub teardown_error: Option<String>,
}

/// Checks that `name` is usable as an object name: lowercase alphanumerics
/// and `-`, starting and ending alphanumeric, at most 63 characters.
pub fn validate_name(name: &str) -> Result<()> {
	let valid_chars = name
		.chars()
		.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
	let valid_ends = !name.starts_with('-') && !name.ends_with('-');

	if name.is_empty() || name.len() > 63 || !valid_chars || !valid_ends {
		return Err(DeployError::Validation(format!(
			"'{name}' must be 1-63 lowercase alphanumerics or '-', starting and ending alphanumeric"
		)));
	}
	Ok(())
}

pub struct ApplicationService {
	apps: Arc<dyn ApplicationStore>,
	configs: Arc<dyn ClusterConfigStore>,
	orchestrator: Arc<DeploymentOrchestrator>,
	teardown: Arc<TeardownCoordinator>,
}

impl ApplicationService {
	pub fn new(
		apps: Arc<dyn ApplicationStore>,
		configs: Arc<dyn ClusterConfigStore>,
		orchestrator: Arc<DeploymentOrchestrator>,
		teardown: Arc<TeardownCoordinator>,
	) -> Self {
		Self {
			apps,
			configs,
			orchestrator,
			teardown,
		}
	}

	pub fn orchestrator(&self) -> &Arc<DeploymentOrchestrator> {
		&self.orchestrator
	}

	pub async fn get(&self, id: &str) -> Result<Application> {
		self
			.apps
			.get_application(id)
			.await?
			.filter(|app| app.status != ApplicationStatus::Deleted)
			.ok_or_else(|| DeployError::ApplicationNotFound(id.to_string()))
	}

	pub async fn list(&self, filter: &ApplicationFilter) -> Result<Vec<Application>> {
		Ok(self.apps.list_applications(filter).await?)
	}

	/// Persist a new application with status `created`, then start its deploy.
	///
	/// The returned record is the one persisted; the deploy proceeds in the
	/// background and a failure to start it is only logged.
	#[instrument(skip(self, request), fields(name = %request.name, cluster_id = %request.cluster_config_id))]
	pub async fn create(&self, request: NewApplication) -> Result<Application> {
		validate_name(&request.name)?;
		let defaults = self.orchestrator.config();

		let namespace = request
			.namespace
			.filter(|ns| !ns.is_empty())
			.unwrap_or_else(|| "default".to_string());
		validate_name(&namespace)?;

		if self
			.configs
			.get_config(&request.cluster_config_id)
			.await?
			.is_none()
		{
			return Err(DeployError::ClusterConfigNotFound(request.cluster_config_id));
		}

		if self
			.apps
			.find_by_identity(&request.name, &namespace, &request.cluster_config_id)
			.await?
			.is_some()
		{
			return Err(DeployError::Conflict {
				name: request.name,
				namespace,
			});
		}

		let image = request
			.image
			.filter(|i| !i.trim().is_empty())
			.unwrap_or_else(|| defaults.default_image.clone());
		let mut app = Application::new(request.name, namespace, request.cluster_config_id, image);
		app.description = request.description;
		app.replicas = request.replicas.unwrap_or(1);
		app.port = request.port.unwrap_or(defaults.default_port);
		app.service_type = request
			.service_type
			.unwrap_or_else(|| defaults.default_service_type.clone());
		app.env_vars = request.env_vars;
		app.command = request.command;
		app.args = request.args;
		app.labels = request.labels;
		app.annotations = request.annotations;
		app.node_selector = request.node_selector;
		app.image_pull_policy = request.image_pull_policy;
		app.cpu_request = request.cpu_request;
		app.cpu_limit = request.cpu_limit;
		app.memory_request = request.memory_request;
		app.memory_limit = request.memory_limit;
		app.config_data = request.config_data;
		app.secret_data = request.secret_data;

		self.apps.create_application(&app).await?;
		info!(app_id = %app.id, "application created");

		match self.orchestrator.deploy(&app.id).await {
			Ok(_) => app.status = ApplicationStatus::Deploying,
			Err(e) => {
				warn!(app_id = %app.id, error = %e, "initial deploy could not be started");
			}
		}
		Ok(app)
	}

	/// Apply a partial update to the editable fields. Status is untouched.
	#[instrument(skip(self, update))]
	pub async fn update(&self, id: &str, update: ApplicationUpdate) -> Result<Application> {
		let mut app = self.get(id).await?;

		if let Some(v) = update.description {
			app.description = Some(v);
		}
		if let Some(v) = update.image {
			app.image = v;
		}
		if let Some(v) = update.replicas {
			app.replicas = v;
		}
		if let Some(v) = update.port {
			app.port = v;
		}
		if let Some(v) = update.service_type {
			app.service_type = v;
		}
		if let Some(v) = update.env_vars {
			app.env_vars = v;
		}
		if let Some(v) = update.command {
			app.command = v;
		}
		if let Some(v) = update.args {
			app.args = v;
		}
		if let Some(v) = update.labels {
			app.labels = v;
		}
		if let Some(v) = update.annotations {
			app.annotations = v;
		}
		if let Some(v) = update.node_selector {
			app.node_selector = v;
		}
		if update.image_pull_policy.is_some() {
			app.image_pull_policy = update.image_pull_policy;
		}
		if update.cpu_request.is_some() {
			app.cpu_request = update.cpu_request;
		}
		if update.cpu_limit.is_some() {
			app.cpu_limit = update.cpu_limit;
		}
		if update.memory_request.is_some() {
			app.memory_request = update.memory_request;
		}
		if update.memory_limit.is_some() {
			app.memory_limit = update.memory_limit;
		}
		if let Some(v) = update.config_data {
			app.config_data = v;
		}
		if let Some(v) = update.secret_data {
			app.secret_data = v;
		}

		self.apps.update_application(&app).await?;
		self.get(id).await
	}

	/// Remove the record first, then tear its objects down.
	///
	/// A missing record is not an error. Teardown failures are reported in the
	/// outcome; the record stays deleted either way.
	#[instrument(skip(self, options))]
	pub async fn delete(&self, id: &str, options: &DeleteApplicationOptions) -> Result<DeleteOutcome> {
		let Some(app) = self.apps.get_application(id).await? else {
			return Ok(DeleteOutcome::default());
		};

		let record_deleted = self.apps.hard_delete(id).await?;
		info!(app_id = %id, name = %app.name, "application record deleted");

		let mut outcome = DeleteOutcome {
			record_deleted,
			..Default::default()
		};
		if !options.delete_resources {
			return Ok(outcome);
		}

		let request = TeardownRequest::new(&app.cluster_config_id, &app.namespace, &app.name)
			.with_propagation(options.propagation)
			.forced(options.force);
		match self.teardown.teardown(&request).await {
			Ok(report) => outcome.teardown = Some(report),
			Err(e) => {
				warn!(app_id = %id, error = %e, "teardown could not run");
				outcome.teardown_error = Some(e.to_string());
			}
		}
		Ok(outcome)
	}

	/// Tear down an application's objects without touching its record.
	pub async fn delete_resources(
		&self,
		id: &str,
		propagation: PropagationPolicy,
		force: bool,
	) -> Result<TeardownReport> {
		let app = self.get(id).await?;
		let request = TeardownRequest::new(&app.cluster_config_id, &app.namespace, &app.name)
			.with_propagation(propagation)
			.forced(force);
		self.teardown.teardown(&request).await
	}
}
