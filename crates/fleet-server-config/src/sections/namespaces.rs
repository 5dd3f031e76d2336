// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Namespace cache and background sync configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_cache_ttl_secs() -> u64 {
	3600
}

fn default_sync_interval_secs() -> u64 {
	3600
}

fn default_sync_initial_delay_secs() -> u64 {
	15
}

fn default_fallback() -> Vec<String> {
	["default", "kube-system", "kube-public"]
		.into_iter()
		.map(String::from)
		.collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NamespacesConfigLayer {
	pub cache_ttl_secs: Option<u64>,
	pub sync_interval_secs: Option<u64>,
	pub sync_initial_delay_secs: Option<u64>,
	pub fallback: Option<Vec<String>>,
}

impl NamespacesConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.cache_ttl_secs.is_some() {
			self.cache_ttl_secs = other.cache_ttl_secs;
		}
		if other.sync_interval_secs.is_some() {
			self.sync_interval_secs = other.sync_interval_secs;
		}
		if other.sync_initial_delay_secs.is_some() {
			self.sync_initial_delay_secs = other.sync_initial_delay_secs;
		}
		if other.fallback.is_some() {
			self.fallback = other.fallback;
		}
	}

	pub fn finalize(self) -> NamespacesConfig {
		NamespacesConfig {
			cache_ttl_secs: self.cache_ttl_secs.unwrap_or_else(default_cache_ttl_secs),
			sync_interval_secs: self
				.sync_interval_secs
				.unwrap_or_else(default_sync_interval_secs),
			sync_initial_delay_secs: self
				.sync_initial_delay_secs
				.unwrap_or_else(default_sync_initial_delay_secs),
			fallback: self.fallback.unwrap_or_else(default_fallback),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamespacesConfig {
	/// Age after which a cached listing is refreshed in the background.
	pub cache_ttl_secs: u64,
	pub sync_interval_secs: u64,
	pub sync_initial_delay_secs: u64,
	/// Served when the cache is empty and a fetch is already running or failed.
	pub fallback: Vec<String>,
}

impl NamespacesConfig {
	pub fn cache_ttl(&self) -> Duration {
		Duration::from_secs(self.cache_ttl_secs)
	}

	pub fn sync_interval(&self) -> Duration {
		Duration::from_secs(self.sync_interval_secs)
	}

	pub fn sync_initial_delay(&self) -> Duration {
		Duration::from_secs(self.sync_initial_delay_secs)
	}
}

impl Default for NamespacesConfig {
	fn default() -> Self {
		NamespacesConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_values() {
		let config = NamespacesConfig::default();
		assert_eq!(config.cache_ttl(), Duration::from_secs(3600));
		assert_eq!(config.sync_interval(), Duration::from_secs(3600));
		assert_eq!(config.sync_initial_delay(), Duration::from_secs(15));
		assert_eq!(config.fallback, vec!["default", "kube-system", "kube-public"]);
	}

	#[test]
	fn test_merge_overwrites() {
		let mut base = NamespacesConfigLayer {
			cache_ttl_secs: Some(60),
			..Default::default()
		};
		base.merge(NamespacesConfigLayer {
			fallback: Some(vec!["default".to_string()]),
			..Default::default()
		});
		let config = base.finalize();
		assert_eq!(config.cache_ttl_secs, 60);
		assert_eq!(config.fallback, vec!["default"]);
	}

	#[test]
	fn test_deserialize_layer_partial() {
		let layer: NamespacesConfigLayer = toml::from_str("sync_interval_secs = 120").unwrap();
		assert_eq!(layer.sync_interval_secs, Some(120));
		assert!(layer.fallback.is_none());
	}
}
