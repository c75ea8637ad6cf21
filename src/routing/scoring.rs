// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Liquidity beliefs: what payment attempts have taught us about how much each channel
//! direction can actually carry.
//!
//! A channel's capacity is public but the split of its liquidity between the two endpoints is
//! not. We track, per direction, the interval `[known_min_msat, known_max_msat]` the true
//! available liquidity must lie in: a successful (or partially-progressed) payment of `x`
//! proves at least `x` was available and raises the lower bound, a failure at `x` proves less
//! than `x` was available and lowers the upper bound. The flow solver prices channels by how
//! deep into this interval a candidate amount reaches, and the materializer refuses flows
//! that contradict it outright.

use crate::prelude::*;
use crate::routing::gossip::Direction;
use crate::routing::RouterError;
use crate::util::logger::Logger;

use core::ops::Deref;

/// The current belief about the liquidity available in one direction of a channel,
/// in millisatoshis.
///
/// Maintains `0 <= known_min_msat <= known_max_msat <= capacity_msat`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelBelief {
	/// Liquidity proven to be available, i.e. the true liquidity is at least this.
	pub known_min_msat: u64,
	/// Liquidity which may be available, i.e. the true liquidity is at most this.
	pub known_max_msat: u64,
	/// The channel's total capacity.
	pub capacity_msat: u64,
}

impl ChannelBelief {
	/// The belief about a channel direction we know nothing about: anywhere from nothing to
	/// the full capacity.
	pub fn unknown(capacity_msat: u64) -> Self {
		ChannelBelief { known_min_msat: 0, known_max_msat: capacity_msat, capacity_msat }
	}

	/// Estimates the probability that this direction can carry `amount_msat`, assuming the
	/// true liquidity is uniformly distributed over the belief interval.
	pub fn success_probability(&self, amount_msat: u64) -> f64 {
		self.debug_assert_invariants();
		if amount_msat <= self.known_min_msat {
			return 1.0;
		}
		if amount_msat > self.known_max_msat {
			return 0.0;
		}
		let states = (self.known_max_msat - self.known_min_msat).saturating_add(1);
		let good_states = self.known_max_msat - amount_msat + 1;
		good_states as f64 / states as f64
	}

	#[inline]
	fn debug_assert_invariants(&self) {
		debug_assert!(self.known_min_msat <= self.known_max_msat);
		debug_assert!(self.known_max_msat <= self.capacity_msat);
	}
}

#[derive(Clone, Copy, Debug, Default)]
struct TrackedBelief {
	known_min_msat: u64,
	known_max_msat: u64,
	/// Amount currently committed over this direction by not-yet-resolved parts. Subtracted
	/// from both bounds when the belief is read, so concurrent parts do not double-spend
	/// liquidity the solver already planned to use.
	inflight_msat: u64,
}

/// Tracks [`ChannelBelief`]s across payment attempts, plus in-flight reservations.
///
/// Directions we have never learned anything about are not stored; reading them yields
/// [`ChannelBelief::unknown`]. Beliefs persist for the lifetime of the store and are shared
/// by all payments routed against it.
pub struct BeliefStore<L: Deref>
where
	L::Target: Logger,
{
	beliefs: HashMap<(u64, Direction), TrackedBelief>,
	logger: L,
}

impl<L: Deref> BeliefStore<L>
where
	L::Target: Logger,
{
	/// Constructs an empty store.
	pub fn new(logger: L) -> Self {
		BeliefStore { beliefs: new_hash_map(), logger }
	}

	/// Returns the effective belief for a channel direction, with any in-flight reservation
	/// subtracted from both bounds.
	///
	/// `capacity_msat` comes from the caller's graph snapshot; stored bounds are clamped to it
	/// in case the snapshot disagrees with the one the bounds were learned against.
	pub fn get(
		&self, short_channel_id: u64, direction: Direction, capacity_msat: u64,
	) -> ChannelBelief {
		let tracked = self
			.beliefs
			.get(&(short_channel_id, direction))
			.copied()
			.unwrap_or(TrackedBelief { known_min_msat: 0, known_max_msat: capacity_msat, inflight_msat: 0 });
		let known_max_msat = core::cmp::min(tracked.known_max_msat, capacity_msat);
		let known_min_msat = core::cmp::min(tracked.known_min_msat, known_max_msat);
		let belief = ChannelBelief {
			known_min_msat: known_min_msat.saturating_sub(tracked.inflight_msat),
			known_max_msat: known_max_msat.saturating_sub(tracked.inflight_msat),
			capacity_msat,
		};
		belief.debug_assert_invariants();
		belief
	}

	/// Records that `amount_msat` was successfully carried over a channel direction, raising
	/// the direction's lower bound.
	///
	/// If the new lower bound crosses the stored upper bound, the upper bound was wrong (the
	/// channel's liquidity shifted under us) and is reset to the full capacity.
	pub fn narrow_on_success(
		&mut self, short_channel_id: u64, direction: Direction, capacity_msat: u64,
		amount_msat: u64,
	) {
		let tracked = self.entry(short_channel_id, direction, capacity_msat);
		let new_min = core::cmp::max(tracked.known_min_msat, core::cmp::min(amount_msat, capacity_msat));
		tracked.known_min_msat = new_min;
		if tracked.known_max_msat < new_min {
			tracked.known_max_msat = capacity_msat;
		}
		let (min_after, max_after) = (tracked.known_min_msat, tracked.known_max_msat);
		log_debug!(
			self.logger,
			"Carried {} msat over channel {} in direction {:?}, bounds now ({}, {})",
			amount_msat, short_channel_id, direction, min_after, max_after
		);
	}

	/// Records that a channel direction failed to carry `amount_msat`, lowering the
	/// direction's upper bound to `amount_msat - 1`.
	///
	/// If the new upper bound crosses the stored lower bound, the lower bound was wrong and
	/// collapses to zero. Collapsing (rather than merely lowering the minimum below the new
	/// maximum) deliberately forgets stale evidence: liquidity moved, so old proofs of
	/// available liquidity no longer apply.
	pub fn narrow_on_failure(
		&mut self, short_channel_id: u64, direction: Direction, capacity_msat: u64,
		amount_msat: u64,
	) {
		let tracked = self.entry(short_channel_id, direction, capacity_msat);
		let new_max = core::cmp::min(tracked.known_max_msat, amount_msat.saturating_sub(1));
		tracked.known_max_msat = new_max;
		if tracked.known_min_msat > new_max {
			tracked.known_min_msat = 0;
		}
		let (min_after, max_after) = (tracked.known_min_msat, tracked.known_max_msat);
		log_debug!(
			self.logger,
			"Channel {} failed to carry {} msat in direction {:?}, bounds now ({}, {})",
			short_channel_id, amount_msat, direction, min_after, max_after
		);
	}

	/// Marks `amount_msat` as committed over a channel direction by an in-flight part.
	///
	/// Until [`release`]d, the amount is subtracted from the direction's effective bounds so
	/// later solves do not plan to use liquidity an outstanding part may consume.
	///
	/// [`release`]: Self::release
	pub fn reserve(
		&mut self, short_channel_id: u64, direction: Direction, capacity_msat: u64,
		amount_msat: u64,
	) -> Result<(), RouterError> {
		let tracked = self.entry(short_channel_id, direction, capacity_msat);
		tracked.inflight_msat = tracked
			.inflight_msat
			.checked_add(amount_msat)
			.ok_or(RouterError::AmountOverflow)?;
		Ok(())
	}

	/// Releases a reservation made by [`reserve`], once the part carrying it resolved.
	///
	/// [`reserve`]: Self::reserve
	pub fn release(&mut self, short_channel_id: u64, direction: Direction, amount_msat: u64) {
		if let Some(tracked) = self.beliefs.get_mut(&(short_channel_id, direction)) {
			debug_assert!(tracked.inflight_msat >= amount_msat);
			tracked.inflight_msat = tracked.inflight_msat.saturating_sub(amount_msat);
		} else {
			debug_assert!(false, "released a reservation which was never made");
		}
	}

	/// Dumps the current belief for every tracked channel direction, at the debug log level.
	pub fn debug_log_stats(&self) {
		for ((scid, direction), tracked) in self.beliefs.iter() {
			log_debug!(
				self.logger,
				"Channel {} direction {:?}: liquidity in ({}, {}) msat, {} msat in flight",
				scid, direction, tracked.known_min_msat, tracked.known_max_msat,
				tracked.inflight_msat
			);
		}
	}

	fn entry(
		&mut self, short_channel_id: u64, direction: Direction, capacity_msat: u64,
	) -> &mut TrackedBelief {
		self.beliefs.entry((short_channel_id, direction)).or_insert(TrackedBelief {
			known_min_msat: 0,
			known_max_msat: capacity_msat,
			inflight_msat: 0,
		})
	}
}
