// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cluster-facing caches for Fleet.
//!
//! - [`ClusterClientCache`]: one validated live client per cluster config
//! - [`NamespaceCache`]: persisted namespace listings with background refresh
//! - [`ResourceQueries`]: workload listings, logs, exec sessions and generic object passthrough

pub mod client_cache;
pub mod error;
pub mod inflight;
pub mod namespace_cache;
pub mod resource_query;
pub mod summary;
pub mod ttl_cache;

pub use client_cache::ClusterClientCache;
pub use error::{ClusterError, Result};
pub use inflight::{InFlight, InFlightGuard};
pub use namespace_cache::{NamespaceCache, SyncReport};
pub use resource_query::{ResourceList, ResourceQueries, DEFAULT_NAMESPACE};
pub use summary::{
	format_age, ContainerSummary, DaemonSetSummary, DeploymentSummary, JobSummary, NamespaceSummary,
	PodSummary, ServiceSummary, StatefulSetSummary,
};
pub use ttl_cache::TtlCache;
