// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! # fleet-server-db
//!
//! Persistence layer for Fleet server using SQLite via sqlx.
//!
//! ## Repository Pattern
//!
//! Each domain has two components:
//! - **`*Store` trait**: the interface consumers depend on (e.g. `ApplicationStore`)
//! - **`*Repository` struct**: the concrete implementation holding a `SqlitePool`
//!
//! Repositories expose inherent methods annotated with `#[tracing::instrument]`
//! and implement their store trait by delegation, so services can be tested
//! against in-memory pools from [`testing`].
//!
//! ## Error Handling
//!
//! | Variant | When to use |
//! |---------|-------------|
//! | `NotFound` | An id the caller supplied does not exist (updates) |
//! | `Conflict` | Business rule conflict, e.g. deleting a cluster config still in use |
//! | `Sqlx` | Unexpected database errors, propagated with `?` |
//! | `Internal` | Stored data that cannot be decoded |
//!
//! Lookups where absence is normal return `Result<Option<T>>`.
//!
//! ## Timestamps
//!
//! All timestamps are stored as fixed-width RFC 3339 text with nanosecond
//! precision so SQL comparisons order them correctly.

pub mod application;
pub mod application_resource;
pub mod cluster_config;
mod error;
pub mod job;
mod migrate;
pub mod namespace_cache;
pub mod pool;
mod time;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use application::{
	Application, ApplicationFilter, ApplicationRepository, ApplicationStatus, ApplicationStore,
	EnvVarSpec,
};
pub use application_resource::{
	ApplicationResource, ApplicationResourceRepository, ApplicationResourceStore,
};
pub use cluster_config::{ClusterConfig, ClusterConfigRepository, ClusterConfigStore};
pub use error::{DbError, Result};
pub use job::{JobDefinition, JobRepository, JobRun, JobStatus, JobStore, TriggerSource};
pub use migrate::run_migrations;
pub use namespace_cache::{NamespaceCacheEntry, NamespaceCacheRepository, NamespaceCacheStore};
pub use pool::create_pool;
