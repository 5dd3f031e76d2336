// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background work for Fleet server.
//!
//! This crate provides a supervised scheduler for periodic and one-shot jobs
//! with run history persisted through SQLite, a bounded [`TaskPool`] for
//! fire-and-forget submissions, and [`fan_out`] for running a set of labelled
//! tasks in parallel and collecting every result.

pub mod context;
pub mod error;
pub mod fan_out;
pub mod health;
pub mod job;
pub mod pool;
pub mod scheduler;
pub mod types;

pub use context::{CancellationToken, JobContext};
pub use error::{JobError, Result};
pub use fan_out::{fan_out, Labelled};
pub use health::{HealthState, JobHealthStatus, JobsHealthStatus, LastRunInfo};
pub use job::Job;
pub use pool::TaskPool;
pub use scheduler::JobScheduler;
pub use types::{JobDefinition, JobOutput, JobRepository, JobRun, JobStatus, JobType, TriggerSource};
