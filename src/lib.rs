// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! An uncertainty-aware multi-path payment router for Lightning-style payment
//! channel networks.
//!
//! Channel capacities are public but the liquidity available in each direction
//! is not. This crate models what is known about each channel direction as an
//! interval (see [`routing::scoring::ChannelBelief`]), splits a payment across
//! one or more paths with a min-cost-flow solver that trades fees against the
//! probability of running into the unknown liquidity ceiling (see
//! [`routing::router::minflow`]), and narrows the per-channel intervals as
//! payment attempts succeed or fail so that retries improve over time (see
//! [`routing::payflow::PayflowManager`]).
//!
//! The gossip layer that builds the channel graph, the HTLC state machine that
//! actually moves money, and any persistence are expected to live elsewhere;
//! this crate consumes a read-only graph snapshot and opaque per-part
//! success/failure/timeout resolutions.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

#[macro_use]
pub mod util;
pub mod routing;

mod prelude {
	#![allow(unused_imports)]

	pub use alloc::{boxed::Box, collections::VecDeque, string::String, vec, vec::Vec};

	pub use alloc::borrow::ToOwned;
	pub use alloc::string::ToString;

	pub(crate) use crate::util::hash_tables::*;
}
