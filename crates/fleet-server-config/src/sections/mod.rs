// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections for fleet-server.

pub mod clusters;
pub mod database;
pub mod deploy;
pub mod http;
pub mod jobs;
pub mod logging;
pub mod namespaces;
pub mod queries;

pub use clusters::{ClustersConfig, ClustersConfigLayer};
pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use deploy::{DeployConfig, DeployConfigLayer};
pub use http::{HttpConfig, HttpConfigLayer};
pub use jobs::{JobsConfig, JobsConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
pub use namespaces::{NamespacesConfig, NamespacesConfigLayer};
pub use queries::{QueriesConfig, QueriesConfigLayer};
