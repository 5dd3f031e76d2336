// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Defaults applied when an application record is turned into cluster
//! objects, plus the size of the reconcile worker pool.

use serde::{Deserialize, Serialize};

fn default_image() -> String {
	"nginx:latest".to_string()
}

fn default_port() -> i32 {
	8080
}

fn default_service_type() -> String {
	"ClusterIP".to_string()
}

fn default_image_pull_policy() -> String {
	"IfNotPresent".to_string()
}

fn default_cpu_request() -> String {
	"100m".to_string()
}

fn default_memory_request() -> String {
	"128Mi".to_string()
}

fn default_cpu_limit() -> String {
	"500m".to_string()
}

fn default_memory_limit() -> String {
	"512Mi".to_string()
}

fn default_worker_pool_size() -> usize {
	8
}

fn default_managed_by() -> String {
	"fleet-server".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeployConfigLayer {
	pub default_image: Option<String>,
	pub default_port: Option<i32>,
	pub default_service_type: Option<String>,
	pub image_pull_policy: Option<String>,
	pub cpu_request: Option<String>,
	pub memory_request: Option<String>,
	pub cpu_limit: Option<String>,
	pub memory_limit: Option<String>,
	pub worker_pool_size: Option<usize>,
	pub managed_by: Option<String>,
}

impl DeployConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.default_image.is_some() {
			self.default_image = other.default_image;
		}
		if other.default_port.is_some() {
			self.default_port = other.default_port;
		}
		if other.default_service_type.is_some() {
			self.default_service_type = other.default_service_type;
		}
		if other.image_pull_policy.is_some() {
			self.image_pull_policy = other.image_pull_policy;
		}
		if other.cpu_request.is_some() {
			self.cpu_request = other.cpu_request;
		}
		if other.memory_request.is_some() {
			self.memory_request = other.memory_request;
		}
		if other.cpu_limit.is_some() {
			self.cpu_limit = other.cpu_limit;
		}
		if other.memory_limit.is_some() {
			self.memory_limit = other.memory_limit;
		}
		if other.worker_pool_size.is_some() {
			self.worker_pool_size = other.worker_pool_size;
		}
		if other.managed_by.is_some() {
			self.managed_by = other.managed_by;
		}
	}

	pub fn finalize(self) -> DeployConfig {
		DeployConfig {
			default_image: self.default_image.unwrap_or_else(default_image),
			default_port: self.default_port.unwrap_or_else(default_port),
			default_service_type: self
				.default_service_type
				.unwrap_or_else(default_service_type),
			image_pull_policy: self
				.image_pull_policy
				.unwrap_or_else(default_image_pull_policy),
			cpu_request: self.cpu_request.unwrap_or_else(default_cpu_request),
			memory_request: self.memory_request.unwrap_or_else(default_memory_request),
			cpu_limit: self.cpu_limit.unwrap_or_else(default_cpu_limit),
			memory_limit: self.memory_limit.unwrap_or_else(default_memory_limit),
			worker_pool_size: self
				.worker_pool_size
				.unwrap_or_else(default_worker_pool_size),
			managed_by: self.managed_by.unwrap_or_else(default_managed_by),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployConfig {
	pub default_image: String,
	pub default_port: i32,
	pub default_service_type: String,
	pub image_pull_policy: String,
	pub cpu_request: String,
	pub memory_request: String,
	pub cpu_limit: String,
	pub memory_limit: String,
	pub worker_pool_size: usize,
	/// Value of the `managed-by` label stamped on every applied object.
	pub managed_by: String,
}

impl Default for DeployConfig {
	fn default() -> Self {
		DeployConfigLayer::default().finalize()
	}
}
