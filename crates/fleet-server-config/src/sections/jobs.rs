// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Jobs configuration section.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobsConfigLayer {
	pub history_retention_days: Option<u32>,
	pub history_cleanup_interval_secs: Option<u64>,
}

impl JobsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.history_retention_days.is_some() {
			self.history_retention_days = other.history_retention_days;
		}
		if other.history_cleanup_interval_secs.is_some() {
			self.history_cleanup_interval_secs = other.history_cleanup_interval_secs;
		}
	}

	pub fn finalize(self) -> JobsConfig {
		JobsConfig {
			history_retention_days: self.history_retention_days.unwrap_or(30),
			history_cleanup_interval_secs: self.history_cleanup_interval_secs.unwrap_or(86400), // 24 hours
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobsConfig {
	pub history_retention_days: u32,
	pub history_cleanup_interval_secs: u64,
}

impl Default for JobsConfig {
	fn default() -> Self {
		Self {
			history_retention_days: 30,
			history_cleanup_interval_secs: 86400, // 24 hours
		}
	}
}
