// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Periodic jobs registered by the server.

mod cache_janitor;
mod job_history_cleanup;
mod namespace_sync;

pub use cache_janitor::CacheJanitorJob;
pub use job_history_cleanup::JobHistoryCleanupJob;
pub use namespace_sync::NamespaceSyncJob;
