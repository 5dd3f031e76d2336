// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::future::Future;

use futures::future::join_all;

/// Outcome of one branch of a [`fan_out`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labelled<T> {
	pub label: String,
	pub result: T,
}

/// Drive every future concurrently and collect all outcomes in input order.
///
/// A failing branch never cancels its siblings.
pub async fn fan_out<L, F, T>(tasks: impl IntoIterator<Item = (L, F)>) -> Vec<Labelled<T>>
where
	L: Into<String>,
	F: Future<Output = T>,
{
	join_all(tasks.into_iter().map(|(label, task)| {
		let label = label.into();
		async move {
			Labelled {
				label,
				result: task.await,
			}
		}
	}))
	.await
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::{Duration, Instant};

	#[tokio::test]
	async fn test_collects_every_result_in_order() {
		type Branch = std::pin::Pin<Box<dyn Future<Output = Result<u32, String>> + Send>>;

		let branches: Vec<(&str, Branch)> = vec![
			("a", Box::pin(async { Ok(1) })),
			("b", Box::pin(async { Err("broken".to_string()) })),
			("c", Box::pin(async { Ok(3) })),
		];
		let results = fan_out(branches).await;

		let labels: Vec<_> = results.iter().map(|r| r.label.as_str()).collect();
		assert_eq!(labels, vec!["a", "b", "c"]);
		assert_eq!(results[0].result, Ok(1));
		assert_eq!(results[1].result, Err("broken".to_string()));
		assert_eq!(results[2].result, Ok(3));
	}

	#[tokio::test]
	async fn test_branches_run_concurrently() {
		let start = Instant::now();
		let results = fan_out((0..5).map(|i| {
			(format!("sleep-{i}"), async move {
				tokio::time::sleep(Duration::from_millis(50)).await;
				i
			})
		}))
		.await;

		assert_eq!(results.len(), 5);
		assert!(start.elapsed() < Duration::from_millis(200));
	}
}
