// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded pool for fire-and-forget background submissions.
//!
//! Submissions never block the caller. Each task waits for a permit before it
//! starts, so at most `size` tasks run at once. Errors and panics are logged
//! at the task boundary and never reach the submitter.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub struct TaskPool {
	name: &'static str,
	size: usize,
	permits: Arc<Semaphore>,
}

impl TaskPool {
	pub fn new(name: &'static str, size: usize) -> Self {
		let size = size.max(1);
		Self {
			name,
			size,
			permits: Arc::new(Semaphore::new(size)),
		}
	}

	pub fn size(&self) -> usize {
		self.size
	}

	/// Permits not currently held by a running task.
	pub fn available(&self) -> usize {
		self.permits.available_permits()
	}

	pub fn spawn<F, E>(&self, label: impl Into<String>, task: F) -> JoinHandle<()>
	where
		F: Future<Output = Result<(), E>> + Send + 'static,
		E: Display + Send + 'static,
	{
		let label = label.into();
		let pool = self.name;
		let permits = Arc::clone(&self.permits);

		tokio::spawn(async move {
			let _permit = match permits.acquire_owned().await {
				Ok(permit) => permit,
				Err(_) => {
					warn!(pool, task = %label, "task pool closed, dropping submission");
					return;
				}
			};

			debug!(pool, task = %label, "pooled task started");
			match tokio::spawn(task).await {
				Ok(Ok(())) => debug!(pool, task = %label, "pooled task finished"),
				Ok(Err(e)) => error!(pool, task = %label, error = %e, "pooled task failed"),
				Err(join_err) if join_err.is_panic() => {
					error!(pool, task = %label, "pooled task panicked")
				}
				Err(join_err) => warn!(pool, task = %label, error = %join_err, "pooled task aborted"),
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	#[tokio::test]
	async fn test_concurrency_is_bounded() {
		let pool = TaskPool::new("test", 2);
		let running = Arc::new(AtomicUsize::new(0));
		let peak = Arc::new(AtomicUsize::new(0));

		let handles: Vec<_> = (0..6)
			.map(|i| {
				let running = Arc::clone(&running);
				let peak = Arc::clone(&peak);
				pool.spawn(format!("task-{i}"), async move {
					let now = running.fetch_add(1, Ordering::SeqCst) + 1;
					peak.fetch_max(now, Ordering::SeqCst);
					tokio::time::sleep(Duration::from_millis(20)).await;
					running.fetch_sub(1, Ordering::SeqCst);
					Ok::<_, String>(())
				})
			})
			.collect();

		for handle in handles {
			handle.await.unwrap();
		}

		assert!(peak.load(Ordering::SeqCst) <= 2);
		assert_eq!(pool.available(), 2);
	}

	#[tokio::test]
	async fn test_failures_and_panics_do_not_escape() {
		let pool = TaskPool::new("test", 1);

		pool
			.spawn("fails", async { Err::<(), _>("boom") })
			.await
			.unwrap();
		pool
			.spawn("panics", async {
				if pool_should_panic() {
					panic!("task blew up");
				}
				Ok::<(), String>(())
			})
			.await
			.unwrap();

		let done = Arc::new(AtomicUsize::new(0));
		let flag = Arc::clone(&done);
		pool
			.spawn("after", async move {
				flag.store(1, Ordering::SeqCst);
				Ok::<_, String>(())
			})
			.await
			.unwrap();
		assert_eq!(done.load(Ordering::SeqCst), 1);
	}

	fn pool_should_panic() -> bool {
		true
	}

	#[test]
	fn test_zero_size_is_clamped() {
		assert_eq!(TaskPool::new("test", 0).size(), 1);
	}
}
