// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration layer for merging from multiple sources.

use serde::Deserialize;

use crate::sections::{
	ClustersConfigLayer, DatabaseConfigLayer, DeployConfigLayer, HttpConfigLayer, JobsConfigLayer,
	LoggingConfigLayer, NamespacesConfigLayer, QueriesConfigLayer,
};

/// Server configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub http: Option<HttpConfigLayer>,
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
	#[serde(default)]
	pub clusters: Option<ClustersConfigLayer>,
	#[serde(default)]
	pub namespaces: Option<NamespacesConfigLayer>,
	#[serde(default)]
	pub queries: Option<QueriesConfigLayer>,
	#[serde(default)]
	pub deploy: Option<DeployConfigLayer>,
	#[serde(default)]
	pub jobs: Option<JobsConfigLayer>,
}

impl ServerConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_option(&mut self.http, other.http, HttpConfigLayer::merge);
		merge_option(
			&mut self.database,
			other.database,
			DatabaseConfigLayer::merge,
		);
		merge_option(&mut self.logging, other.logging, LoggingConfigLayer::merge);
		merge_option(
			&mut self.clusters,
			other.clusters,
			ClustersConfigLayer::merge,
		);
		merge_option(
			&mut self.namespaces,
			other.namespaces,
			NamespacesConfigLayer::merge,
		);
		merge_option(&mut self.queries, other.queries, QueriesConfigLayer::merge);
		merge_option(&mut self.deploy, other.deploy, DeployConfigLayer::merge);
		merge_option(&mut self.jobs, other.jobs, JobsConfigLayer::merge);
	}
}

fn merge_option<T, F>(target: &mut Option<T>, source: Option<T>, merge_fn: F)
where
	F: FnOnce(&mut T, T),
{
	match (target.as_mut(), source) {
		(Some(t), Some(s)) => merge_fn(t, s),
		(None, Some(s)) => *target = Some(s),
		_ => {}
	}
}
