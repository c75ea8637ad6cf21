// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! This module has a map which can be iterated in a deterministic order. See the [`IndexedMap`].

use alloc::collections::{btree_map, BTreeMap};
use core::cmp::Ord;

/// A map which can be iterated in a deterministic order.
///
/// Route computation walks the graph snapshot's channels and must produce bit-for-bit identical
/// output for identical inputs, so the backing maps cannot expose randomized hash iteration
/// order anywhere the router iterates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedMap<K: Ord, V> {
	map: BTreeMap<K, V>,
}

impl<K: Ord, V> IndexedMap<K, V> {
	/// Constructs a new, empty map
	pub fn new() -> Self {
		Self { map: BTreeMap::new() }
	}

	#[inline(always)]
	/// Fetches the element with the given `key`, if one exists.
	pub fn get(&self, key: &K) -> Option<&V> {
		self.map.get(key)
	}

	/// Fetches a mutable reference to the element with the given `key`, if one exists.
	pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
		self.map.get_mut(key)
	}

	#[inline]
	/// Returns true if an element with the given `key` exists in the map.
	pub fn contains_key(&self, key: &K) -> bool {
		self.map.contains_key(key)
	}

	/// Removes the element with the given `key`, returning it, if one exists.
	pub fn remove(&mut self, key: &K) -> Option<V> {
		self.map.remove(key)
	}

	/// Inserts the given `key`/`value` pair into the map, returning the element that was
	/// previously stored at the given `key`, if one exists.
	pub fn insert(&mut self, key: K, value: V) -> Option<V> {
		self.map.insert(key, value)
	}

	/// Returns an iterator which iterates over the `key`/`value` pairs in the order defined by
	/// [`Ord`].
	pub fn iter(&self) -> btree_map::Iter<K, V> {
		self.map.iter()
	}

	/// Returns an iterator which iterates over the `key`s and mutable references to `value`s in
	/// the order defined by [`Ord`].
	pub fn iter_mut(&mut self) -> btree_map::IterMut<K, V> {
		self.map.iter_mut()
	}

	/// Returns the number of `key`/`value` pairs in the map
	pub fn len(&self) -> usize {
		self.map.len()
	}

	/// Returns true if there are no elements in the map
	pub fn is_empty(&self) -> bool {
		self.map.is_empty()
	}
}

impl<K: Ord, V> Default for IndexedMap<K, V> {
	fn default() -> Self {
		Self::new()
	}
}
