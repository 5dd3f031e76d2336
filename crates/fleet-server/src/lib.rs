// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fleet server.
//!
//! This crate provides the HTTP surface for managing cluster configs,
//! browsing cluster workloads and deploying applications, plus the periodic
//! jobs that keep the cluster caches fresh.

pub mod api;
pub mod error;
pub mod jobs;
pub mod routes;

pub use api::{create_app_state, create_router, AppState};
pub use error::{ErrorResponse, ServerError, REQUEST_IN_PROGRESS};
pub use fleet_server_config::ServerConfig;
