// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cluster connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_client_timeout_secs() -> u64 {
	10
}

fn default_ping_timeout_secs() -> u64 {
	10
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClustersConfigLayer {
	/// Connect and per-call timeout for every outbound cluster request.
	pub client_timeout_secs: Option<u64>,
	/// Upper bound for the liveness ping run on client checkout.
	pub ping_timeout_secs: Option<u64>,
}

impl ClustersConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.client_timeout_secs.is_some() {
			self.client_timeout_secs = other.client_timeout_secs;
		}
		if other.ping_timeout_secs.is_some() {
			self.ping_timeout_secs = other.ping_timeout_secs;
		}
	}

	pub fn finalize(self) -> ClustersConfig {
		ClustersConfig {
			client_timeout_secs: self
				.client_timeout_secs
				.unwrap_or_else(default_client_timeout_secs),
			ping_timeout_secs: self
				.ping_timeout_secs
				.unwrap_or_else(default_ping_timeout_secs),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClustersConfig {
	pub client_timeout_secs: u64,
	pub ping_timeout_secs: u64,
}

impl ClustersConfig {
	pub fn client_timeout(&self) -> Duration {
		Duration::from_secs(self.client_timeout_secs)
	}

	pub fn ping_timeout(&self) -> Duration {
		Duration::from_secs(self.ping_timeout_secs)
	}
}

impl Default for ClustersConfig {
	fn default() -> Self {
		Self {
			client_timeout_secs: default_client_timeout_secs(),
			ping_timeout_secs: default_ping_timeout_secs(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_values() {
		let config = ClustersConfig::default();
		assert_eq!(config.client_timeout(), Duration::from_secs(10));
		assert_eq!(config.ping_timeout(), Duration::from_secs(10));
	}

	#[test]
	fn test_layer_finalize_with_values() {
		let config = ClustersConfigLayer {
			client_timeout_secs: Some(3),
			ping_timeout_secs: None,
		}
		.finalize();
		assert_eq!(config.client_timeout_secs, 3);
		assert_eq!(config.ping_timeout_secs, 10);
	}
}
