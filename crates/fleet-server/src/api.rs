// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application state and router construction.

use std::sync::Arc;

use axum::{
	routing::{get, post, put},
	Router,
};
use fleet_server_clusters::{ClusterClientCache, NamespaceCache, ResourceQueries};
use fleet_server_config::ServerConfig;
use fleet_server_db::{
	ApplicationRepository, ApplicationResourceRepository, ClusterConfigRepository, ClusterConfigStore,
	NamespaceCacheRepository,
};
use fleet_server_deploy::{ApplicationService, DeploymentOrchestrator, TeardownCoordinator};
use fleet_server_jobs::JobScheduler;
use fleet_server_k8s::ClientFactory;
use sqlx::SqlitePool;

use crate::routes;

/// Shared state handed to every handler.
///
/// Caches and in-flight markers live inside the services held here and are
/// created once per process.
#[derive(Clone)]
pub struct AppState {
	pub pool: SqlitePool,
	pub configs: Arc<dyn ClusterConfigStore>,
	pub clients: Arc<ClusterClientCache>,
	pub namespaces: Arc<NamespaceCache>,
	pub queries: Arc<ResourceQueries>,
	pub applications: Arc<ApplicationService>,
	pub job_scheduler: Option<Arc<JobScheduler>>,
}

/// Wire the repositories, caches and services for one process.
pub fn create_app_state(
	pool: SqlitePool,
	config: &ServerConfig,
	factory: Arc<dyn ClientFactory>,
) -> AppState {
	let configs: Arc<dyn ClusterConfigStore> = Arc::new(ClusterConfigRepository::new(pool.clone()));
	let apps = Arc::new(ApplicationRepository::new(pool.clone()));
	let resources = Arc::new(ApplicationResourceRepository::new(pool.clone()));
	let namespace_store = Arc::new(NamespaceCacheRepository::new(pool.clone()));

	let clients = Arc::new(ClusterClientCache::new(
		Arc::clone(&configs),
		factory,
		&config.clusters,
	));
	let namespaces = Arc::new(NamespaceCache::new(
		Arc::clone(&clients),
		namespace_store,
		Arc::clone(&configs),
		config.namespaces.clone(),
	));
	let queries = Arc::new(ResourceQueries::new(Arc::clone(&clients), &config.queries));

	let orchestrator = Arc::new(DeploymentOrchestrator::new(
		Arc::clone(&clients),
		apps.clone(),
		resources,
		config.deploy.clone(),
	));
	let teardown = Arc::new(TeardownCoordinator::new(Arc::clone(&clients)));
	let applications = Arc::new(ApplicationService::new(
		apps,
		Arc::clone(&configs),
		orchestrator,
		teardown,
	));

	AppState {
		pool,
		configs,
		clients,
		namespaces,
		queries,
		applications,
		job_scheduler: None,
	}
}

pub fn create_router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(routes::health::health_check))
		// Cluster configs
		.route(
			"/api/clusters",
			get(routes::clusters::list_clusters).post(routes::clusters::upload_cluster),
		)
		.route(
			"/api/clusters/{id}",
			get(routes::clusters::get_cluster).delete(routes::clusters::delete_cluster),
		)
		.route(
			"/api/clusters/{id}/context",
			put(routes::clusters::set_context),
		)
		.route(
			"/api/clusters/{id}/namespaces",
			get(routes::clusters::list_namespaces),
		)
		.route(
			"/api/clusters/{id}/namespaces/refresh",
			post(routes::clusters::refresh_namespaces),
		)
		// Workload listings and logs
		.route(
			"/api/clusters/{id}/pods/{name}/logs",
			get(routes::workloads::pod_logs),
		)
		.route(
			"/api/clusters/{id}/pods/{name}/logs/stream",
			get(routes::pod_sessions::stream_pod_logs),
		)
		.route(
			"/api/clusters/{id}/pods/{name}/exec",
			get(routes::pod_sessions::exec_pod),
		)
		.route(
			"/api/clusters/{id}/{kind}",
			get(routes::workloads::list_workloads),
		)
		// Generic object access
		.route(
			"/api/clusters/{id}/resources/{kind}",
			get(routes::resources::list_objects).post(routes::resources::create_object),
		)
		.route(
			"/api/clusters/{id}/resources/{kind}/{name}",
			get(routes::resources::get_object)
				.put(routes::resources::replace_object)
				.delete(routes::resources::delete_object),
		)
		// Applications
		.route(
			"/api/applications",
			get(routes::applications::list_applications)
				.post(routes::applications::create_application),
		)
		.route(
			"/api/applications/{id}",
			get(routes::applications::get_application)
				.put(routes::applications::update_application)
				.delete(routes::applications::delete_application),
		)
		.route(
			"/api/applications/{id}/deploy",
			post(routes::applications::deploy_application),
		)
		.route(
			"/api/applications/{id}/status",
			get(routes::applications::deployment_status),
		)
		.route(
			"/api/applications/{id}/resources",
			axum::routing::delete(routes::applications::delete_application_resources),
		)
		.with_state(state)
}
