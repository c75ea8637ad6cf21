// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! A binary min-heap with an index back into it, allowing O(log n) decrease-key.
//!
//! `std`'s [`BinaryHeap`] cannot update the key of an element already in the heap, forcing
//! shortest-path searches to either push duplicate entries and skip stale ones on pop, or
//! rebuild the heap. Since the flow solver runs many searches per payment over the same node
//! set, we keep an arena of heap slots plus a node-index→slot table and swap slots in place.
//!
//! [`BinaryHeap`]: alloc::collections::BinaryHeap

use crate::prelude::*;

/// Slot table sentinel for a node not currently in the heap.
const NOT_IN_HEAP: u32 = u32::MAX;

struct HeapSlot {
	node: u32,
	distance: u64,
	/// Insertion sequence number; ties on `distance` pop in insertion (FIFO) order so that
	/// repeated searches over the same graph are deterministic.
	order: u64,
}

impl HeapSlot {
	#[inline(always)]
	fn key(&self) -> (u64, u64) {
		(self.distance, self.order)
	}
}

/// A min-heap over `(node, distance)` pairs supporting decrease-key, for dense node indices in
/// `0..n`.
///
/// Reusable across repeated searches: [`IndexedHeap::clear`] costs O(len) rather than O(n).
pub struct IndexedHeap {
	heap: Vec<HeapSlot>,
	positions: Vec<u32>,
	next_order: u64,
}

impl IndexedHeap {
	/// Constructs a new, empty heap over node indices in `0..node_count`.
	pub fn new(node_count: usize) -> Self {
		Self { heap: Vec::with_capacity(node_count), positions: vec![NOT_IN_HEAP; node_count], next_order: 0 }
	}

	/// Inserts a node which must not currently be in the heap.
	///
	/// Returns false (leaving the heap unchanged) if the node is already present, which callers
	/// should treat as a bug.
	pub fn push(&mut self, node: u32, distance: u64) -> bool {
		if self.positions[node as usize] != NOT_IN_HEAP {
			debug_assert!(false, "pushed a node already in the heap");
			return false;
		}
		let slot = self.heap.len() as u32;
		self.heap.push(HeapSlot { node, distance, order: self.next_order });
		self.next_order += 1;
		self.positions[node as usize] = slot;
		self.sift_up(slot);
		true
	}

	/// Decreases the distance of a node already in the heap.
	///
	/// A no-op returning false if the new distance is not strictly smaller than the current one.
	pub fn decrease_key(&mut self, node: u32, distance: u64) -> bool {
		let slot = self.positions[node as usize];
		debug_assert!(slot != NOT_IN_HEAP, "decrease_key on a node not in the heap");
		if slot == NOT_IN_HEAP || distance >= self.heap[slot as usize].distance {
			return false;
		}
		self.heap[slot as usize].distance = distance;
		self.sift_up(slot);
		true
	}

	/// Returns the minimum entry without removing it.
	pub fn peek(&self) -> Option<(u32, u64)> {
		self.heap.first().map(|slot| (slot.node, slot.distance))
	}

	/// Removes and returns the minimum entry.
	pub fn pop(&mut self) -> Option<(u32, u64)> {
		if self.heap.is_empty() {
			return None;
		}
		let last = self.heap.len() as u32 - 1;
		self.swap_slots(0, last);
		let min = self.heap.pop().expect("non-empty checked above");
		self.positions[min.node as usize] = NOT_IN_HEAP;
		if !self.heap.is_empty() {
			self.sift_down(0);
		}
		Some((min.node, min.distance))
	}

	/// Returns true if the given node is currently in the heap.
	pub fn contains(&self, node: u32) -> bool {
		self.positions[node as usize] != NOT_IN_HEAP
	}

	/// Returns true if the heap contains no entries.
	pub fn is_empty(&self) -> bool {
		self.heap.is_empty()
	}

	/// Returns the number of entries in the heap.
	pub fn len(&self) -> usize {
		self.heap.len()
	}

	/// Removes all entries, in time proportional to the current occupancy.
	pub fn clear(&mut self) {
		for slot in self.heap.drain(..) {
			self.positions[slot.node as usize] = NOT_IN_HEAP;
		}
		self.next_order = 0;
	}

	#[inline]
	fn swap_slots(&mut self, a: u32, b: u32) {
		if a == b {
			return;
		}
		self.heap.swap(a as usize, b as usize);
		self.positions[self.heap[a as usize].node as usize] = a;
		self.positions[self.heap[b as usize].node as usize] = b;
	}

	fn sift_up(&mut self, mut slot: u32) {
		while slot > 0 {
			let parent = (slot - 1) / 2;
			if self.heap[parent as usize].key() <= self.heap[slot as usize].key() {
				break;
			}
			self.swap_slots(parent, slot);
			slot = parent;
		}
	}

	fn sift_down(&mut self, mut slot: u32) {
		let len = self.heap.len() as u32;
		loop {
			let left = slot * 2 + 1;
			let right = slot * 2 + 2;
			let mut smallest = slot;
			if left < len && self.heap[left as usize].key() < self.heap[smallest as usize].key() {
				smallest = left;
			}
			if right < len && self.heap[right as usize].key() < self.heap[smallest as usize].key() {
				smallest = right;
			}
			if smallest == slot {
				break;
			}
			self.swap_slots(slot, smallest);
			slot = smallest;
		}
	}
}
