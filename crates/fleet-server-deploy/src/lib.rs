// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application deployment for Fleet server.
//!
//! An application record is rendered into a [`ResourceSet`], applied by the
//! [`DeploymentOrchestrator`] and removed again by the [`TeardownCoordinator`].
//! [`ApplicationService`] ties both to the record's lifecycle.

pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod resource_set;
pub mod teardown;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{DeployError, Result};
pub use lifecycle::{
	validate_name, ApplicationService, ApplicationUpdate, DeleteApplicationOptions, DeleteOutcome,
	NewApplication,
};
pub use orchestrator::{
	derive_status, Applied, DeploymentOrchestrator, DeploymentStatusReport, ReconcileOutcome,
};
pub use resource_set::ResourceSet;
pub use teardown::{KindFailure, TeardownCoordinator, TeardownReport, TeardownRequest};
