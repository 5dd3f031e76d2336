// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Desired cluster objects for an application.
//!
//! The set is derived from the application record and the `[deploy]` defaults
//! on every reconcile and never persisted.

use std::collections::BTreeMap;

use fleet_server_config::DeployConfig;
use fleet_server_db::Application;
use fleet_server_k8s::{
	ConfigMap, ConfigMapEnvSource, Container, ContainerPort, Deployment, DeploymentSpec,
	EnvFromSource, EnvVar, IntOrString, LabelSelector, ObjectMeta, PodSpec, PodTemplateSpec,
	Quantity, ResourceKind, ResourceRequirements, Secret, SecretEnvSource, Service, ServicePort,
	ServiceSpec,
};

pub const LABEL_APP: &str = "app";
pub const LABEL_APP_ID: &str = "app-id";
pub const LABEL_MANAGED_BY: &str = "managed-by";

const PORT_NAME: &str = "http";

pub fn config_map_name(app_name: &str) -> String {
	format!("{app_name}-config")
}

pub fn secret_name(app_name: &str) -> String {
	format!("{app_name}-secret")
}

/// Label selector matching every pod of an application.
pub fn app_selector(app_name: &str) -> String {
	format!("{LABEL_APP}={app_name}")
}

#[derive(Debug, Clone)]
pub struct ResourceSet {
	pub namespace: String,
	pub deployment: Deployment,
	pub service: Service,
	pub config_map: Option<ConfigMap>,
	pub secret: Option<Secret>,
}

impl ResourceSet {
	pub fn from_application(app: &Application, config: &DeployConfig) -> Self {
		let port = if app.port > 0 {
			app.port
		} else {
			config.default_port
		};
		let replicas = app.replicas.max(1);

		let mut labels = app.labels.clone();
		labels.insert(LABEL_APP.to_string(), app.name.clone());
		labels.insert(LABEL_APP_ID.to_string(), app.id.clone());
		labels.insert(LABEL_MANAGED_BY.to_string(), config.managed_by.clone());

		let selector = BTreeMap::from([(LABEL_APP.to_string(), app.name.clone())]);

		let config_map = (!app.config_data.is_empty()).then(|| ConfigMap {
			metadata: object_meta(&config_map_name(&app.name), &app.namespace, &labels, None),
			data: Some(app.config_data.clone()),
			..Default::default()
		});

		let secret = (!app.secret_data.is_empty()).then(|| Secret {
			metadata: object_meta(&secret_name(&app.name), &app.namespace, &labels, None),
			string_data: Some(app.secret_data.clone()),
			type_: Some("Opaque".to_string()),
			..Default::default()
		});

		let mut env_from = Vec::new();
		if config_map.is_some() {
			env_from.push(EnvFromSource {
				config_map_ref: Some(ConfigMapEnvSource {
					name: config_map_name(&app.name),
					..Default::default()
				}),
				..Default::default()
			});
		}
		if secret.is_some() {
			env_from.push(EnvFromSource {
				secret_ref: Some(SecretEnvSource {
					name: secret_name(&app.name),
					..Default::default()
				}),
				..Default::default()
			});
		}

		let env: Vec<EnvVar> = app
			.env_vars
			.iter()
			.map(|e| EnvVar {
				name: e.name.clone(),
				value: Some(e.value.clone()),
				value_from: None,
			})
			.collect();

		let image = if app.image.trim().is_empty() {
			config.default_image.clone()
		} else {
			app.image.clone()
		};

		let container = Container {
			name: app.name.clone(),
			image: Some(image),
			image_pull_policy: Some(
				app
					.image_pull_policy
					.clone()
					.unwrap_or_else(|| config.image_pull_policy.clone()),
			),
			ports: Some(vec![ContainerPort {
				name: Some(PORT_NAME.to_string()),
				container_port: port,
				protocol: Some("TCP".to_string()),
				..Default::default()
			}]),
			env: non_empty(env),
			env_from: non_empty(env_from),
			command: non_empty(app.command.clone()),
			args: non_empty(app.args.clone()),
			resources: Some(resources(app, config)),
			..Default::default()
		};

		let annotations = (!app.annotations.is_empty()).then(|| app.annotations.clone());

		let deployment = Deployment {
			metadata: object_meta(&app.name, &app.namespace, &labels, annotations.clone()),
			spec: Some(DeploymentSpec {
				replicas: Some(replicas),
				selector: LabelSelector {
					match_labels: Some(selector.clone()),
					..Default::default()
				},
				template: PodTemplateSpec {
					metadata: Some(ObjectMeta {
						labels: Some(labels.clone()),
						annotations,
						..Default::default()
					}),
					spec: Some(PodSpec {
						containers: vec![container],
						node_selector: (!app.node_selector.is_empty())
							.then(|| app.node_selector.clone()),
						..Default::default()
					}),
				},
				..Default::default()
			}),
			status: None,
		};

		let service_type = if app.service_type.trim().is_empty() {
			config.default_service_type.clone()
		} else {
			app.service_type.clone()
		};

		let service = Service {
			metadata: object_meta(&app.name, &app.namespace, &labels, None),
			spec: Some(ServiceSpec {
				type_: Some(service_type),
				selector: Some(selector),
				ports: Some(vec![ServicePort {
					name: Some(PORT_NAME.to_string()),
					port,
					target_port: Some(IntOrString::Int(port)),
					protocol: Some("TCP".to_string()),
					..Default::default()
				}]),
				..Default::default()
			}),
			status: None,
		};

		Self {
			namespace: app.namespace.clone(),
			deployment,
			service,
			config_map,
			secret,
		}
	}

	pub fn replicas(&self) -> i32 {
		self
			.deployment
			.spec
			.as_ref()
			.and_then(|s| s.replicas)
			.unwrap_or(1)
	}

	pub fn container(&self) -> Option<&Container> {
		self
			.deployment
			.spec
			.as_ref()
			.and_then(|s| s.template.spec.as_ref())
			.and_then(|s| s.containers.first())
	}

	pub fn container_port(&self) -> Option<i32> {
		self
			.container()
			.and_then(|c| c.ports.as_ref())
			.and_then(|ports| ports.first())
			.map(|p| p.container_port)
	}

	/// Kinds and names this set writes, config and secret first.
	pub fn objects(&self) -> Vec<(ResourceKind, String)> {
		let mut objects = Vec::with_capacity(4);
		if let Some(cm) = &self.config_map {
			objects.push((ResourceKind::ConfigMap, name_of(&cm.metadata)));
		}
		if let Some(secret) = &self.secret {
			objects.push((ResourceKind::Secret, name_of(&secret.metadata)));
		}
		objects.push((ResourceKind::Deployment, name_of(&self.deployment.metadata)));
		objects.push((ResourceKind::Service, name_of(&self.service.metadata)));
		objects
	}
}

fn resources(app: &Application, config: &DeployConfig) -> ResourceRequirements {
	let pick = |own: &Option<String>, fallback: &str| {
		Quantity(own.clone().unwrap_or_else(|| fallback.to_string()))
	};

	ResourceRequirements {
		requests: Some(BTreeMap::from([
			("cpu".to_string(), pick(&app.cpu_request, &config.cpu_request)),
			("memory".to_string(), pick(&app.memory_request, &config.memory_request)),
		])),
		limits: Some(BTreeMap::from([
			("cpu".to_string(), pick(&app.cpu_limit, &config.cpu_limit)),
			("memory".to_string(), pick(&app.memory_limit, &config.memory_limit)),
		])),
		..Default::default()
	}
}

fn object_meta(
	name: &str,
	namespace: &str,
	labels: &BTreeMap<String, String>,
	annotations: Option<BTreeMap<String, String>>,
) -> ObjectMeta {
	ObjectMeta {
		name: Some(name.to_string()),
		namespace: Some(namespace.to_string()),
		labels: Some(labels.clone()),
		annotations,
		..Default::default()
	}
}

fn name_of(meta: &ObjectMeta) -> String {
	meta.name.clone().unwrap_or_default()
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
	(!items.is_empty()).then_some(items)
}
