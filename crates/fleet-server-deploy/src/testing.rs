// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use fleet_server_clusters::ClusterClientCache;
use fleet_server_config::{ClustersConfig, DeployConfig};
use fleet_server_db::testing::create_test_pool;
use fleet_server_db::{ApplicationRepository, ApplicationResourceRepository, ClusterConfigRepository};
use fleet_server_k8s::{MockClientFactory, MockClusterApi};
use sqlx::SqlitePool;

use crate::orchestrator::DeploymentOrchestrator;
use crate::teardown::TeardownCoordinator;

const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: staging
clusters:
- name: staging-cluster
  cluster:
    server: https://staging.example.com:6443
contexts:
- name: staging
  context:
    cluster: staging-cluster
    user: admin
users:
- name: admin
  user:
    token: abc123
"#;

pub(crate) struct Fixture {
	pub pool: SqlitePool,
	pub apps: Arc<ApplicationRepository>,
	pub configs: Arc<ClusterConfigRepository>,
	pub api: Arc<MockClusterApi>,
	pub clients: Arc<ClusterClientCache>,
	pub orchestrator: Arc<DeploymentOrchestrator>,
	pub teardown: Arc<TeardownCoordinator>,
	pub cluster_id: String,
}

/// A registered "staging" cluster backed by an in-memory mock.
pub(crate) async fn fixture() -> Fixture {
	let pool = create_test_pool().await;
	let apps = Arc::new(ApplicationRepository::new(pool.clone()));
	let configs = Arc::new(ClusterConfigRepository::new(pool.clone()));
	let resources = Arc::new(ApplicationResourceRepository::new(pool.clone()));

	let api = Arc::new(MockClusterApi::with_namespaces(&["default"]));
	let factory = Arc::new(MockClientFactory::new(Arc::clone(&api)));
	let clients = Arc::new(ClusterClientCache::new(
		configs.clone(),
		factory,
		&ClustersConfig::default(),
	));
	let cluster = clients
		.register("staging", None, KUBECONFIG)
		.await
		.expect("register test cluster");

	let orchestrator = Arc::new(DeploymentOrchestrator::new(
		Arc::clone(&clients),
		apps.clone(),
		resources,
		DeployConfig::default(),
	));
	let teardown = Arc::new(TeardownCoordinator::new(Arc::clone(&clients)));

	Fixture {
		pool,
		apps,
		configs,
		api,
		clients,
		orchestrator,
		teardown,
		cluster_id: cluster.id,
	}
}
