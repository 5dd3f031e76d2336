// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-cluster namespace listings with background refresh.
//!
//! Reads are served from an in-memory snapshot backed by the persisted
//! `namespace_cache` rows and never wait on the cluster once something is
//! cached. At most one fetch per cluster runs at a time; the per-cluster
//! marker in [`InFlight`] decides who does the work.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleet_server_config::NamespacesConfig;
use fleet_server_db::{ClusterConfigStore, NamespaceCacheEntry, NamespaceCacheStore};
use fleet_server_k8s::Namespace;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::client_cache::ClusterClientCache;
use crate::error::{ClusterError, Result};
use crate::inflight::InFlight;

struct Snapshot {
	entries: Vec<NamespaceCacheEntry>,
	loaded_at: Instant,
}

/// Outcome of one pass of [`NamespaceCache::sync_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
	pub synced: usize,
	pub skipped: usize,
	pub failed: usize,
}

pub struct NamespaceCache {
	clients: Arc<ClusterClientCache>,
	store: Arc<dyn NamespaceCacheStore>,
	configs: Arc<dyn ClusterConfigStore>,
	snapshots: RwLock<HashMap<String, Snapshot>>,
	in_progress: InFlight<String>,
	config: NamespacesConfig,
}

impl NamespaceCache {
	pub fn new(
		clients: Arc<ClusterClientCache>,
		store: Arc<dyn NamespaceCacheStore>,
		configs: Arc<dyn ClusterConfigStore>,
		config: NamespacesConfig,
	) -> Self {
		Self {
			clients,
			store,
			configs,
			snapshots: RwLock::new(HashMap::new()),
			in_progress: InFlight::new(),
			config,
		}
	}

	/// Namespaces of `cluster_id`.
	///
	/// A populated cache answers immediately and schedules a background
	/// refresh once its newest row is older than the TTL. An empty cache is
	/// filled synchronously by exactly one caller; anyone arriving while that
	/// fetch runs, or after it failed, gets the fallback list.
	#[instrument(skip(self))]
	pub async fn list(self: &Arc<Self>, cluster_id: &str) -> Result<Vec<NamespaceCacheEntry>> {
		let cached = self.cached(cluster_id).await;
		if !cached.is_empty() {
			if self.is_stale(&cached) {
				self.spawn_refresh(cluster_id);
			}
			return Ok(cached);
		}

		let Some(_claim) = self.in_progress.try_claim(cluster_id.to_string()) else {
			debug!(cluster_id, "namespace fetch already running, serving fallback");
			return Ok(self.fallback(cluster_id));
		};

		match self.fetch_and_store(cluster_id).await {
			Ok(entries) => Ok(entries),
			Err(e @ ClusterError::ConfigNotFound(_)) => Err(e),
			Err(e) => {
				warn!(cluster_id, error = %e, "namespace fetch failed, serving fallback");
				Ok(self.fallback(cluster_id))
			}
		}
	}

	/// Fetch from the cluster now, unless a fetch for this cluster is already running.
	#[instrument(skip(self))]
	pub async fn refresh(&self, cluster_id: &str) -> Result<Vec<NamespaceCacheEntry>> {
		let _claim = self
			.in_progress
			.try_claim(cluster_id.to_string())
			.ok_or_else(|| ClusterError::InProgress {
				operation: "namespace_refresh",
				cluster_id: cluster_id.to_string(),
			})?;

		self.fetch_and_store(cluster_id).await
	}

	/// Upsert rows directly with a fresh sync time. Does not trigger a refresh.
	#[instrument(skip(self, entries), fields(count = entries.len()))]
	pub async fn save(&self, cluster_id: &str, entries: Vec<NamespaceCacheEntry>) -> Result<()> {
		let now = Utc::now();
		for mut entry in entries {
			entry.cluster_config_id = cluster_id.to_string();
			entry.last_synced_at = now;
			self.store.upsert(&entry).await?;
		}

		let stored = self.store.list_for_cluster(cluster_id).await?;
		self.install(cluster_id, stored);
		Ok(())
	}

	/// Refresh every active cluster, one at a time.
	///
	/// Clusters with a fetch already running are skipped. A failing cluster is
	/// counted and logged; it never stops the pass.
	#[instrument(skip(self))]
	pub async fn sync_all(&self) -> Result<SyncReport> {
		let configs = self.configs.list_configs().await?;
		let mut report = SyncReport::default();

		for config in configs {
			let Some(_claim) = self.in_progress.try_claim(config.id.clone()) else {
				debug!(cluster_id = %config.id, "namespace sync skipped, already in progress");
				report.skipped += 1;
				continue;
			};

			match self.fetch_and_store(&config.id).await {
				Ok(_) => report.synced += 1,
				Err(e) => {
					warn!(cluster_id = %config.id, error = %e, "namespace sync failed");
					report.failed += 1;
				}
			}
		}

		info!(
			synced = report.synced,
			skipped = report.skipped,
			failed = report.failed,
			"namespace sync finished"
		);
		Ok(report)
	}

	/// Drop the in-memory snapshot for a cluster.
	pub fn forget(&self, cluster_id: &str) {
		self.snapshots.write().remove(cluster_id);
	}

	/// Drop snapshots loaded more than `max_age` ago. Returns how many went.
	pub fn evict_older_than(&self, max_age: Duration) -> usize {
		let mut snapshots = self.snapshots.write();
		let before = snapshots.len();
		snapshots.retain(|_, s| s.loaded_at.elapsed() <= max_age);
		before - snapshots.len()
	}

	pub fn is_refreshing(&self, cluster_id: &str) -> bool {
		self.in_progress.is_claimed(&cluster_id.to_string())
	}

	async fn cached(&self, cluster_id: &str) -> Vec<NamespaceCacheEntry> {
		if let Some(snapshot) = self.snapshots.read().get(cluster_id) {
			return snapshot.entries.clone();
		}

		match self.store.list_for_cluster(cluster_id).await {
			Ok(entries) => {
				if !entries.is_empty() {
					self.install(cluster_id, entries.clone());
				}
				entries
			}
			Err(e) => {
				warn!(cluster_id, error = %e, "namespace cache read failed");
				Vec::new()
			}
		}
	}

	fn is_stale(&self, entries: &[NamespaceCacheEntry]) -> bool {
		let Some(newest) = entries.iter().map(|e| e.last_synced_at).max() else {
			return true;
		};
		(Utc::now() - newest)
			.to_std()
			.map(|age| age > self.config.cache_ttl())
			.unwrap_or(false)
	}

	fn spawn_refresh(self: &Arc<Self>, cluster_id: &str) {
		let Some(claim) = self.in_progress.try_claim(cluster_id.to_string()) else {
			return;
		};

		let this = Arc::clone(self);
		let cluster_id = cluster_id.to_string();
		debug!(cluster_id = %cluster_id, "namespace cache stale, refreshing in background");
		tokio::spawn(async move {
			let _claim = claim;
			if let Err(e) = this.fetch_and_store(&cluster_id).await {
				warn!(cluster_id = %cluster_id, error = %e, "background namespace refresh failed");
			}
		});
	}

	async fn fetch_and_store(&self, cluster_id: &str) -> Result<Vec<NamespaceCacheEntry>> {
		let api = self.clients.get_client(cluster_id).await?;
		let namespaces = match api.list_namespaces().await {
			Ok(namespaces) => namespaces,
			Err(e) => {
				self.clients.note_failure(cluster_id, &e);
				return Err(ClusterError::unreachable(cluster_id, e));
			}
		};

		let synced_at = Utc::now();
		let mut entries: Vec<_> = namespaces
			.iter()
			.map(|ns| entry_from_namespace(cluster_id, ns, synced_at))
			.collect();
		entries.sort_by(|a, b| a.name.cmp(&b.name));

		self
			.store
			.replace_for_cluster(cluster_id, &entries, synced_at)
			.await?;
		let stored = self.store.list_for_cluster(cluster_id).await?;
		self.install(cluster_id, stored.clone());

		info!(
			cluster_id,
			fetched = entries.len(),
			stored = stored.len(),
			"namespace cache refreshed"
		);
		Ok(stored)
	}

	fn install(&self, cluster_id: &str, entries: Vec<NamespaceCacheEntry>) {
		self.snapshots.write().insert(
			cluster_id.to_string(),
			Snapshot {
				entries,
				loaded_at: Instant::now(),
			},
		);
	}

	fn fallback(&self, cluster_id: &str) -> Vec<NamespaceCacheEntry> {
		let now = Utc::now();
		self
			.config
			.fallback
			.iter()
			.map(|name| NamespaceCacheEntry {
				cluster_config_id: cluster_id.to_string(),
				name: name.clone(),
				status: "Active".to_string(),
				labels: BTreeMap::new(),
				annotations: BTreeMap::new(),
				created_at: None,
				last_synced_at: now,
			})
			.collect()
	}
}

fn entry_from_namespace(
	cluster_id: &str,
	namespace: &Namespace,
	synced_at: DateTime<Utc>,
) -> NamespaceCacheEntry {
	let meta = &namespace.metadata;
	NamespaceCacheEntry {
		cluster_config_id: cluster_id.to_string(),
		name: meta.name.clone().unwrap_or_default(),
		status: namespace
			.status
			.as_ref()
			.and_then(|s| s.phase.clone())
			.unwrap_or_else(|| "Active".to_string()),
		labels: meta.labels.clone().unwrap_or_default(),
		annotations: meta.annotations.clone().unwrap_or_default(),
		created_at: meta.creation_timestamp.as_ref().map(|t| t.0),
		last_synced_at: synced_at,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::client_cache::tests::{fixture, registered, Fixture};
	use fleet_server_db::{ClusterConfig, NamespaceCacheRepository};
	use fleet_server_k8s::MockClusterApi;

	fn namespace_cache(f: &Fixture) -> Arc<NamespaceCache> {
		Arc::new(NamespaceCache::new(
			Arc::clone(&f.cache),
			Arc::new(NamespaceCacheRepository::new(f.pool.clone())),
			f.store.clone(),
			NamespacesConfig::default(),
		))
	}

	fn names(entries: &[NamespaceCacheEntry]) -> Vec<&str> {
		entries.iter().map(|e| e.name.as_str()).collect()
	}

	fn stale_entry(cluster_id: &str, name: &str) -> NamespaceCacheEntry {
		NamespaceCacheEntry {
			cluster_config_id: cluster_id.to_string(),
			name: name.to_string(),
			status: "Active".to_string(),
			labels: BTreeMap::new(),
			annotations: BTreeMap::new(),
			created_at: None,
			last_synced_at: Utc::now() - chrono::Duration::hours(2),
		}
	}

	#[tokio::test]
	async fn test_empty_cache_fetches_once_and_persists() {
		let f = fixture(MockClusterApi::with_namespaces(&["default", "apps"])).await;
		let config = registered(&f).await;
		let cache = namespace_cache(&f);

		let first = cache.list(&config.id).await.unwrap();
		assert_eq!(names(&first), vec!["apps", "default"]);

		let second = cache.list(&config.id).await.unwrap();
		assert_eq!(names(&second), vec!["apps", "default"]);
		assert_eq!(f.api.call_count("list_namespaces"), 1);

		let rows = NamespaceCacheRepository::new(f.pool.clone())
			.list_for_cluster(&config.id)
			.await
			.unwrap();
		assert_eq!(rows.len(), 2);
	}

	#[tokio::test]
	async fn test_simultaneous_cold_reads_reach_cluster_once() {
		let f = fixture(MockClusterApi::with_namespaces(&["apps"])).await;
		let config = registered(&f).await;
		f.api.set_list_delay(Duration::from_millis(200));
		let cache = namespace_cache(&f);

		let (a, b) = tokio::join!(cache.list(&config.id), cache.list(&config.id));
		let mut results = vec![names(&a.unwrap()).join(","), names(&b.unwrap()).join(",")];
		results.sort();

		assert_eq!(results, vec!["apps", "default,kube-system,kube-public"]);
		assert_eq!(f.api.call_count("list_namespaces"), 1);
	}

	#[tokio::test]
	async fn test_stale_cache_answers_immediately_with_one_refresh() {
		let f = fixture(MockClusterApi::with_namespaces(&["apps", "fresh"])).await;
		let config = registered(&f).await;
		f.api.set_list_delay(Duration::from_millis(100));

		let repo = NamespaceCacheRepository::new(f.pool.clone());
		repo.upsert(&stale_entry(&config.id, "apps")).await.unwrap();
		repo.upsert(&stale_entry(&config.id, "old")).await.unwrap();

		let cache = namespace_cache(&f);
		let started = std::time::Instant::now();
		let reads = (0..10).map(|_| cache.list(&config.id));
		let results = futures::future::join_all(reads).await;

		assert!(started.elapsed() < Duration::from_millis(100));
		for result in results {
			assert_eq!(names(&result.unwrap()), vec!["apps", "old"]);
		}

		tokio::time::sleep(Duration::from_millis(400)).await;
		assert_eq!(f.api.call_count("list_namespaces"), 1);
		assert!(!cache.is_refreshing(&config.id));
		assert_eq!(
			names(&cache.list(&config.id).await.unwrap()),
			vec!["apps", "fresh"]
		);
	}

	#[tokio::test]
	async fn test_fetch_failure_serves_fallback_without_persisting() {
		let f = fixture(MockClusterApi::with_namespaces(&["apps"])).await;
		let config = registered(&f).await;
		f.api.set_fail_lists(true);
		let cache = namespace_cache(&f);

		let entries = cache.list(&config.id).await.unwrap();
		assert_eq!(names(&entries), vec!["default", "kube-system", "kube-public"]);
		assert!(!f.cache.is_cached(&config.id));

		let rows = NamespaceCacheRepository::new(f.pool.clone())
			.list_for_cluster(&config.id)
			.await
			.unwrap();
		assert!(rows.is_empty());
	}

	#[tokio::test]
	async fn test_unknown_cluster_is_not_found() {
		let f = fixture(MockClusterApi::new()).await;
		let cache = namespace_cache(&f);

		let err = cache.list("missing").await.unwrap_err();
		assert!(err.is_not_found());
	}

	#[tokio::test]
	async fn test_refresh_reports_in_progress() {
		let f = fixture(MockClusterApi::with_namespaces(&["apps"])).await;
		let config = registered(&f).await;
		let cache = namespace_cache(&f);

		let claim = cache.in_progress.try_claim(config.id.clone()).unwrap();
		let err = cache.refresh(&config.id).await.unwrap_err();
		assert!(matches!(err, ClusterError::InProgress { .. }));

		drop(claim);
		assert_eq!(names(&cache.refresh(&config.id).await.unwrap()), vec!["apps"]);
	}

	#[tokio::test]
	async fn test_save_upserts_without_refreshing() {
		let f = fixture(MockClusterApi::with_namespaces(&["apps"])).await;
		let config = registered(&f).await;
		let cache = namespace_cache(&f);

		cache
			.save(&config.id, vec![stale_entry("ignored", "manual")])
			.await
			.unwrap();

		let entries = cache.list(&config.id).await.unwrap();
		assert_eq!(names(&entries), vec!["manual"]);
		assert_eq!(entries[0].cluster_config_id, config.id);
		assert!(Utc::now() - entries[0].last_synced_at < chrono::Duration::minutes(1));

		tokio::time::sleep(Duration::from_millis(50)).await;
		assert_eq!(f.api.call_count("list_namespaces"), 0);
	}

	#[tokio::test]
	async fn test_refresh_snapshot_keeps_rows_saved_after_the_fetch() {
		let f = fixture(MockClusterApi::with_namespaces(&["apps"])).await;
		let config = registered(&f).await;
		let store = NamespaceCacheRepository::new(f.pool.clone());
		let cache = namespace_cache(&f);

		let mut late = stale_entry(&config.id, "late");
		late.last_synced_at = Utc::now() + chrono::Duration::hours(1);
		store.upsert(&late).await.unwrap();

		let refreshed = cache.refresh(&config.id).await.unwrap();
		assert_eq!(names(&refreshed), vec!["apps", "late"]);

		let listed = cache.list(&config.id).await.unwrap();
		assert_eq!(listed, store.list_for_cluster(&config.id).await.unwrap());
		assert_eq!(f.api.call_count("list_namespaces"), 1);
	}

	#[tokio::test]
	async fn test_sync_all_isolates_failures_and_skips_busy_clusters() {
		let f = fixture(MockClusterApi::with_namespaces(&["apps"])).await;
		let good = registered(&f).await;
		let busy = registered(&f).await;
		let broken = ClusterConfig::new("broken", None, "garbage", "", "");
		f.store.create_config(&broken).await.unwrap();

		let cache = namespace_cache(&f);
		let _claim = cache.in_progress.try_claim(busy.id.clone()).unwrap();

		let report = cache.sync_all().await.unwrap();
		assert_eq!(
			report,
			SyncReport {
				synced: 1,
				skipped: 1,
				failed: 1,
			}
		);
		assert_eq!(names(&cache.list(&good.id).await.unwrap()), vec!["apps"]);
	}

	#[tokio::test]
	async fn test_evict_older_than_drops_snapshots() {
		let f = fixture(MockClusterApi::with_namespaces(&["apps"])).await;
		let config = registered(&f).await;
		let cache = namespace_cache(&f);
		cache.list(&config.id).await.unwrap();

		assert_eq!(cache.evict_older_than(Duration::from_secs(600)), 0);
		tokio::time::sleep(Duration::from_millis(20)).await;
		assert_eq!(cache.evict_older_than(Duration::from_millis(10)), 1);

		assert_eq!(names(&cache.list(&config.id).await.unwrap()), vec!["apps"]);
		assert_eq!(f.api.call_count("list_namespaces"), 1);
	}
}
