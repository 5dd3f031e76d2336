// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP handlers, one module per resource family.

pub mod applications;
pub mod clusters;
pub mod health;
pub mod pod_sessions;
pub mod resources;
pub mod workloads;
