// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Structs and impls for computing multi-path payment flows and tracking what each attempt
//! taught us about the network.

pub mod gossip;
pub mod payflow;
pub mod router;
pub mod scoring;

#[cfg(test)]
pub(crate) mod test_utils;

use crate::prelude::*;

use core::fmt;

/// The resource limit which a payment ran into, see [`RouterError::ConstraintExceeded`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Constraint {
	/// The total fee across all parts exceeded the payment's fee budget.
	Fee,
	/// Some hop's total CLTV delay exceeded the payment's delay budget.
	Delay,
	/// The payment could not be delivered within the allowed number of parts.
	Parts,
	/// The payment's deadline passed before it resolved.
	Deadline,
}

impl fmt::Display for Constraint {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Constraint::Fee => write!(f, "fee budget"),
			Constraint::Delay => write!(f, "delay budget"),
			Constraint::Parts => write!(f, "part count"),
			Constraint::Deadline => write!(f, "deadline"),
		}
	}
}

/// An error returned when computing or tracking a payment flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouterError {
	/// No combination of paths can carry the requested amount under current beliefs.
	NoRouteFound {
		/// A human-readable description of why the search gave up.
		err: String,
	},
	/// Fee accumulation overflowed while materializing a path.
	///
	/// Only reachable with absurd fee rates; the amount plus fees exceeded what a `u64` in
	/// millisatoshis can represent.
	AmountOverflow,
	/// A computed path asks a channel to carry more than our current upper bound on its
	/// liquidity says it can.
	///
	/// Single allocations are fee-capped so they always fit, but when several allocations
	/// over the same fee-charging path merge into one part, the merged fee-inclusive amount
	/// can exceed a belief the individual allocations respected. The flow is refused rather
	/// than truncated; callers re-solve (beliefs in hand, a different split may work) or
	/// give up.
	BeliefInconsistent {
		/// The channel whose belief the flow contradicts.
		short_channel_id: u64,
		/// The amount the flow asked the channel to carry, including fees.
		attempted_msat: u64,
	},
	/// The payment ran into one of its resource limits.
	ConstraintExceeded {
		/// Which limit was hit.
		constraint: Constraint,
	},
	/// A resolution was reported for a part which already resolved.
	DoubleResolution {
		/// The part which was resolved twice.
		part_id: u64,
	},
	/// A payment with the same payment hash is already registered.
	DuplicatePayment,
}

impl fmt::Display for RouterError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			RouterError::NoRouteFound { err } => write!(f, "no route found: {}", err),
			RouterError::AmountOverflow => write!(f, "fee accumulation overflowed u64 msat"),
			RouterError::BeliefInconsistent { short_channel_id, attempted_msat } => write!(
				f,
				"flow over channel {} of {} msat contradicts the channel's liquidity belief",
				short_channel_id, attempted_msat
			),
			RouterError::ConstraintExceeded { constraint } => {
				write!(f, "payment exceeded its {}", constraint)
			},
			RouterError::DoubleResolution { part_id } => {
				write!(f, "part {} was already resolved", part_id)
			},
			RouterError::DuplicatePayment => write!(f, "payment hash is already registered"),
		}
	}
}

#[cfg(feature = "std")]
impl std::error::Error for RouterError {}
