// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Presence markers that coalesce duplicate concurrent requests.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

/// Set of keys currently being worked on.
///
/// Claiming is a single write-locked check-and-insert, so at most one caller
/// holds a key at a time. Checks that only look take the read lock.
pub struct InFlight<K: Eq + Hash> {
	keys: Arc<RwLock<HashSet<K>>>,
}

impl<K: Eq + Hash + Clone> InFlight<K> {
	pub fn new() -> Self {
		Self {
			keys: Arc::new(RwLock::new(HashSet::new())),
		}
	}

	/// Claim `key`, or `None` when someone else holds it.
	///
	/// The claim is released when the returned guard is dropped.
	pub fn try_claim(&self, key: K) -> Option<InFlightGuard<K>> {
		let mut keys = self.keys.write();
		if !keys.insert(key.clone()) {
			return None;
		}
		Some(InFlightGuard {
			keys: Arc::clone(&self.keys),
			key,
		})
	}

	pub fn is_claimed(&self, key: &K) -> bool {
		self.keys.read().contains(key)
	}

	pub fn len(&self) -> usize {
		self.keys.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl<K: Eq + Hash + Clone> Default for InFlight<K> {
	fn default() -> Self {
		Self::new()
	}
}

#[must_use = "the claim is released as soon as the guard is dropped"]
pub struct InFlightGuard<K: Eq + Hash> {
	keys: Arc<RwLock<HashSet<K>>>,
	key: K,
}

impl<K: Eq + Hash> Drop for InFlightGuard<K> {
	fn drop(&mut self) {
		self.keys.write().remove(&self.key);
	}
}
