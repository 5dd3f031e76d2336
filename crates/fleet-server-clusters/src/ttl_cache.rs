// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;

/// Map whose entries are served only while younger than `ttl`.
///
/// Expired entries stay in place until overwritten or evicted by
/// [`TtlCache::evict_older_than`].
pub struct TtlCache<K, V> {
	ttl: Duration,
	entries: RwLock<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
	pub fn new(ttl: Duration) -> Self {
		Self {
			ttl,
			entries: RwLock::new(HashMap::new()),
		}
	}

	pub fn get_fresh(&self, key: &K) -> Option<V> {
		let entries = self.entries.read();
		entries
			.get(key)
			.filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
			.map(|(_, value)| value.clone())
	}

	pub fn insert(&self, key: K, value: V) {
		self.entries.write().insert(key, (Instant::now(), value));
	}

	pub fn remove(&self, key: &K) -> Option<V> {
		self.entries.write().remove(key).map(|(_, value)| value)
	}

	pub fn retain(&self, mut keep: impl FnMut(&K) -> bool) {
		self.entries.write().retain(|key, _| keep(key));
	}

	/// Drop entries stored more than `max_age` ago. Returns how many were dropped.
	pub fn evict_older_than(&self, max_age: Duration) -> usize {
		let mut entries = self.entries.write();
		let before = entries.len();
		entries.retain(|_, (stored_at, _)| stored_at.elapsed() <= max_age);
		before - entries.len()
	}

	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
