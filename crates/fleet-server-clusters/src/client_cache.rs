// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! One live client per cluster config, built lazily and validated on checkout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fleet_server_config::ClustersConfig;
use fleet_server_db::{ClusterConfig, ClusterConfigStore};
use fleet_server_k8s::{
	load_credential, parse_kubeconfig, summarize, ClientFactory, ClusterApi, K8sError,
};
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::error::{ClusterError, Result};

struct CachedClient {
	api: Arc<dyn ClusterApi>,
	config: ClusterConfig,
}

pub struct ClusterClientCache {
	store: Arc<dyn ClusterConfigStore>,
	factory: Arc<dyn ClientFactory>,
	clients: RwLock<HashMap<String, CachedClient>>,
	ping_timeout: Duration,
}

impl ClusterClientCache {
	pub fn new(
		store: Arc<dyn ClusterConfigStore>,
		factory: Arc<dyn ClientFactory>,
		config: &ClustersConfig,
	) -> Self {
		Self {
			store,
			factory,
			clients: RwLock::new(HashMap::new()),
			ping_timeout: config.ping_timeout(),
		}
	}

	/// Check out a live client for `cluster_id`.
	///
	/// A cached client is pinged first and rebuilt from the stored credential
	/// when the ping fails. Concurrent rebuilds are resolved last writer wins.
	#[instrument(skip(self))]
	pub async fn get_client(&self, cluster_id: &str) -> Result<Arc<dyn ClusterApi>> {
		let cached = self
			.clients
			.read()
			.get(cluster_id)
			.map(|c| Arc::clone(&c.api));

		if let Some(api) = cached {
			match self.ping(api.as_ref()).await {
				Ok(()) => return Ok(api),
				Err(e) => {
					warn!(cluster_id, error = %e, "cached cluster client failed ping, rebuilding");
					self.remove_client(cluster_id);
				}
			}
		}

		let config = self
			.store
			.get_config(cluster_id)
			.await?
			.ok_or_else(|| ClusterError::ConfigNotFound(cluster_id.to_string()))?;

		let api = self.build(&config).await?;
		self.insert(config, Arc::clone(&api));
		Ok(api)
	}

	/// Validate and persist an uploaded credential, then cache its client.
	#[instrument(skip(self, description, content))]
	pub async fn register(
		&self,
		name: &str,
		description: Option<String>,
		content: &str,
	) -> Result<ClusterConfig> {
		let credential =
			load_credential(content, None).map_err(|e| ClusterError::InvalidCredential(e.to_string()))?;
		let summary = summarize(&credential.kubeconfig)
			.map_err(|e| ClusterError::InvalidCredential(e.to_string()))?;

		let config = ClusterConfig::new(
			name,
			description,
			content.trim(),
			summary.current_context,
			summary.server_url,
		);

		let api = self.build(&config).await?;
		self.store.create_config(&config).await?;
		info!(cluster_id = %config.id, server = %config.server_url, "cluster config registered");
		self.insert(config.clone(), api);
		Ok(config)
	}

	/// Switch the active context of a stored config.
	///
	/// The live client is dropped so the next checkout connects with the new context.
	#[instrument(skip(self))]
	pub async fn set_context(&self, cluster_id: &str, context: &str) -> Result<ClusterConfig> {
		let config = self
			.store
			.get_config(cluster_id)
			.await?
			.ok_or_else(|| ClusterError::ConfigNotFound(cluster_id.to_string()))?;

		let kubeconfig = fleet_server_k8s::decode_credential(&config.credential)
			.and_then(|text| parse_kubeconfig(&text))
			.map_err(|e| ClusterError::InvalidCredential(e.to_string()))?;
		if !kubeconfig.contexts.iter().any(|c| c.name == context) {
			return Err(ClusterError::ContextNotFound {
				context: context.to_string(),
			});
		}

		self.store.update_context(cluster_id, context).await?;
		self.remove_client(cluster_id);
		info!(cluster_id, context, "cluster context switched");

		self
			.store
			.get_config(cluster_id)
			.await?
			.ok_or_else(|| ClusterError::ConfigNotFound(cluster_id.to_string()))
	}

	/// Evict the live client and cached config for `cluster_id`.
	pub fn remove_client(&self, cluster_id: &str) {
		if self.clients.write().remove(cluster_id).is_some() {
			debug!(cluster_id, "cluster client evicted");
		}
	}

	pub fn is_cached(&self, cluster_id: &str) -> bool {
		self.clients.read().contains_key(cluster_id)
	}

	/// Config the cached client was built from, if any.
	pub fn cached_config(&self, cluster_id: &str) -> Option<ClusterConfig> {
		self.clients.read().get(cluster_id).map(|c| c.config.clone())
	}

	/// Evict the client when `err` says the connection itself is broken.
	pub fn note_failure(&self, cluster_id: &str, err: &K8sError) {
		if err.is_connection_failure() {
			warn!(cluster_id, error = %err, "cluster connection failed, evicting client");
			self.remove_client(cluster_id);
		}
	}

	async fn build(&self, config: &ClusterConfig) -> Result<Arc<dyn ClusterApi>> {
		let context = Some(config.current_context.as_str()).filter(|c| !c.is_empty());
		let credential = load_credential(&config.credential, context)
			.map_err(|e| ClusterError::InvalidCredential(e.to_string()))?;

		let api = self
			.factory
			.connect(&credential)
			.await
			.map_err(|e| ClusterError::unreachable(&config.id, e))?;

		self
			.ping(api.as_ref())
			.await
			.map_err(|e| ClusterError::unreachable(&config.id, e))?;

		debug!(cluster_id = %config.id, "cluster client built");
		Ok(api)
	}

	async fn ping(&self, api: &dyn ClusterApi) -> std::result::Result<(), K8sError> {
		match tokio::time::timeout(self.ping_timeout, api.ping()).await {
			Ok(result) => result,
			Err(_) => Err(K8sError::Timeout),
		}
	}

	fn insert(&self, config: ClusterConfig, api: Arc<dyn ClusterApi>) {
		self
			.clients
			.write()
			.insert(config.id.clone(), CachedClient { api, config });
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use fleet_server_db::testing::create_test_pool;
	use fleet_server_db::ClusterConfigRepository;
	use fleet_server_k8s::{MockClientFactory, MockClusterApi};
	use sqlx::SqlitePool;

	pub(crate) const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: staging
clusters:
- name: staging-cluster
  cluster:
    server: https://staging.example.com:6443
- name: prod-cluster
  cluster:
    server: https://prod.example.com:6443
contexts:
- name: staging
  context:
    cluster: staging-cluster
    user: admin
- name: prod
  context:
    cluster: prod-cluster
    user: admin
users:
- name: admin
  user:
    token: abc123
"#;

	pub(crate) struct Fixture {
		pub cache: Arc<ClusterClientCache>,
		pub factory: Arc<MockClientFactory>,
		pub api: Arc<MockClusterApi>,
		pub store: Arc<ClusterConfigRepository>,
		pub pool: SqlitePool,
	}

	pub(crate) async fn fixture(api: MockClusterApi) -> Fixture {
		let pool = create_test_pool().await;
		let store = Arc::new(ClusterConfigRepository::new(pool.clone()));
		let api = Arc::new(api);
		let factory = Arc::new(MockClientFactory::new(Arc::clone(&api)));
		let cache = Arc::new(ClusterClientCache::new(
			store.clone(),
			factory.clone(),
			&ClustersConfig::default(),
		));
		Fixture {
			cache,
			factory,
			api,
			store,
			pool,
		}
	}

	pub(crate) async fn registered(fixture: &Fixture) -> ClusterConfig {
		fixture
			.cache
			.register("staging", None, KUBECONFIG)
			.await
			.unwrap()
	}

	#[tokio::test]
	async fn test_register_extracts_context_and_server() {
		let f = fixture(MockClusterApi::with_namespaces(&["default"])).await;
		let config = registered(&f).await;

		assert_eq!(config.current_context, "staging");
		assert_eq!(config.server_url, "https://staging.example.com:6443");
		assert!(f.store.get_config(&config.id).await.unwrap().is_some());
		assert!(f.cache.is_cached(&config.id));
	}

	#[tokio::test]
	async fn test_register_rejects_garbage_without_persisting() {
		let f = fixture(MockClusterApi::new()).await;
		let err = f
			.cache
			.register("broken", None, "%%% not a kubeconfig %%%")
			.await
			.unwrap_err();

		assert!(matches!(err, ClusterError::InvalidCredential(_)));
		assert!(f.store.list_configs().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_register_unreachable_cluster_is_not_persisted() {
		let f = fixture(MockClusterApi::new()).await;
		f.api.set_fail_ping(true);

		let err = f.cache.register("staging", None, KUBECONFIG).await.unwrap_err();
		assert!(matches!(err, ClusterError::Unreachable { .. }));
		assert!(f.store.list_configs().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_consecutive_checkouts_reuse_the_same_client() {
		let f = fixture(MockClusterApi::new()).await;
		let config = registered(&f).await;
		f.cache.remove_client(&config.id);

		let first = f.cache.get_client(&config.id).await.unwrap();
		let second = f.cache.get_client(&config.id).await.unwrap();

		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(f.factory.builds(), 2);
	}

	#[tokio::test]
	async fn test_failed_ping_rebuilds_client() {
		let f = fixture(MockClusterApi::new()).await;
		let config = registered(&f).await;
		let builds = f.factory.builds();

		f.api.set_fail_ping(true);
		let err = f.cache.get_client(&config.id).await.err().unwrap();
		assert!(matches!(err, ClusterError::Unreachable { .. }));
		assert!(!f.cache.is_cached(&config.id));
		assert_eq!(f.factory.builds(), builds + 1);

		f.api.set_fail_ping(false);
		f.cache.get_client(&config.id).await.unwrap();
		assert!(f.cache.is_cached(&config.id));
	}

	#[tokio::test]
	async fn test_missing_config_is_typed_error() {
		let f = fixture(MockClusterApi::new()).await;
		let err = f.cache.get_client("nope").await.err().unwrap();
		assert!(matches!(err, ClusterError::ConfigNotFound(_)));
		assert!(err.is_not_found());
	}

	#[tokio::test]
	async fn test_set_context_validates_and_evicts() {
		let f = fixture(MockClusterApi::new()).await;
		let config = registered(&f).await;

		let err = f.cache.set_context(&config.id, "qa").await.unwrap_err();
		assert!(matches!(err, ClusterError::ContextNotFound { .. }));
		assert!(f.cache.is_cached(&config.id));

		let updated = f.cache.set_context(&config.id, "prod").await.unwrap();
		assert_eq!(updated.current_context, "prod");
		assert!(!f.cache.is_cached(&config.id));

		f.cache.get_client(&config.id).await.unwrap();
		assert_eq!(
			f.cache.cached_config(&config.id).unwrap().current_context,
			"prod"
		);
	}
}
