// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_RESULT_TTL_SECS: u64 = 300;
const DEFAULT_JANITOR_INTERVAL_SECS: u64 = 300;
const DEFAULT_JANITOR_MAX_AGE_SECS: u64 = 600;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueriesConfigLayer {
	pub result_ttl_secs: Option<u64>,
	pub janitor_interval_secs: Option<u64>,
	pub janitor_max_age_secs: Option<u64>,
}

impl QueriesConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.result_ttl_secs.is_some() {
			self.result_ttl_secs = other.result_ttl_secs;
		}
		if other.janitor_interval_secs.is_some() {
			self.janitor_interval_secs = other.janitor_interval_secs;
		}
		if other.janitor_max_age_secs.is_some() {
			self.janitor_max_age_secs = other.janitor_max_age_secs;
		}
	}

	pub fn finalize(self) -> QueriesConfig {
		QueriesConfig {
			result_ttl_secs: self.result_ttl_secs.unwrap_or(DEFAULT_RESULT_TTL_SECS),
			janitor_interval_secs: self
				.janitor_interval_secs
				.unwrap_or(DEFAULT_JANITOR_INTERVAL_SECS),
			janitor_max_age_secs: self
				.janitor_max_age_secs
				.unwrap_or(DEFAULT_JANITOR_MAX_AGE_SECS),
		}
	}
}

/// Resource query result caching and the janitor that evicts stale entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueriesConfig {
	pub result_ttl_secs: u64,
	pub janitor_interval_secs: u64,
	pub janitor_max_age_secs: u64,
}

impl QueriesConfig {
	pub fn result_ttl(&self) -> Duration {
		Duration::from_secs(self.result_ttl_secs)
	}

	pub fn janitor_interval(&self) -> Duration {
		Duration::from_secs(self.janitor_interval_secs)
	}

	pub fn janitor_max_age(&self) -> Duration {
		Duration::from_secs(self.janitor_max_age_secs)
	}
}

impl Default for QueriesConfig {
	fn default() -> Self {
		Self {
			result_ttl_secs: DEFAULT_RESULT_TTL_SECS,
			janitor_interval_secs: DEFAULT_JANITOR_INTERVAL_SECS,
			janitor_max_age_secs: DEFAULT_JANITOR_MAX_AGE_SECS,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_layer_finalize_defaults() {
		let config = QueriesConfigLayer::default().finalize();
		assert_eq!(config, QueriesConfig::default());
		assert_eq!(config.result_ttl(), Duration::from_secs(300));
		assert_eq!(config.janitor_max_age(), Duration::from_secs(600));
	}
}
