// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Generally this crate uses `std`'s `HashMap`s, however the `hashbrown` feature swaps in
//! `hashbrown`'s `HashMap`s instead, which avoids pulling in `std`'s hasher machinery on
//! constrained targets.
//!
//! This module simply re-exports the `HashMap` used in this crate for public consumption.

#[cfg(not(feature = "hashbrown"))]
mod std_hashtables {
	pub use std::collections::HashMap;

	pub(crate) use std::collections::hash_map;

	/// Builds a new [`HashMap`].
	pub fn new_hash_map<K, V>() -> HashMap<K, V> {
		HashMap::new()
	}
}
#[cfg(not(feature = "hashbrown"))]
pub use std_hashtables::*;

#[cfg(feature = "hashbrown")]
mod hashbrown_tables {
	pub use hashbrown::HashMap;

	pub(crate) use hashbrown::hash_map;

	/// Builds a new [`HashMap`].
	pub fn new_hash_map<K, V>() -> HashMap<K, V> {
		HashMap::new()
	}
}
#[cfg(feature = "hashbrown")]
pub use hashbrown_tables::*;
