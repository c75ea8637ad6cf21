// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Tracks multi-part payments across attempts: turns solver [`Flow`]s into committed
//! [`PayFlow`]s with liquidity reserved for them, applies per-part resolutions back onto the
//! belief store, and decides whether a payment is done, waiting, or due for a retry.
//!
//! The manager never talks to the network. Callers hand each committed part to their HTLC
//! machinery, then report back an opaque [`FlowResolution`]; retries are caller-driven by
//! calling [`PayflowManager::next_flows`] again after a failure.

use crate::prelude::*;
use crate::routing::gossip::{ChannelLookup, Direction, NodeId};
use crate::routing::router::{minflow, Flow, FlowParameters};
use crate::routing::scoring::BeliefStore;
use crate::routing::{Constraint, RouterError};
use crate::util::indexed_map::IndexedMap;
use crate::util::logger::Logger;

use core::fmt;
use core::ops::Deref;
use core::time::Duration;

/// The hash identifying a payment, as included in the invoice being paid.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PaymentHash(pub [u8; 32]);

impl fmt::Debug for PaymentHash {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "PaymentHash({})", crate::util::logger::DebugBytes(&self.0))
	}
}
impl fmt::Display for PaymentHash {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", crate::util::logger::DebugBytes(&self.0))
	}
}

/// Per-payment resource budgets, fixed at registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaymentConstraints {
	/// The most the payer will spend on routing fees, across all parts.
	pub max_fee_msat: u64,
	/// The largest total CLTV delay (including the destination's final delta) any part may
	/// incur.
	pub max_cltv_expiry_delta: u32,
	/// The most parts the payment may be split into at once.
	pub max_parts: usize,
	/// Absolute time after which no further parts are launched and the payment is abandoned.
	pub stop_time: Duration,
}

/// Where a committed part is in its life.
///
/// Parts move `Planned -> Committed -> {Succeeded, Failed, Abandoned}`; the three right-hand
/// states are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayFlowState {
	/// Created from a solver flow but not yet holding liquidity reservations.
	Planned,
	/// Reservations held; the part is (or is about to be) in flight.
	Committed,
	/// The destination accepted this part.
	Succeeded,
	/// Some hop failed to forward this part.
	Failed,
	/// Given up on without a definitive outcome, e.g. on timeout or deadline.
	Abandoned,
}

impl PayFlowState {
	fn is_terminal(&self) -> bool {
		match self {
			PayFlowState::Planned | PayFlowState::Committed => false,
			PayFlowState::Succeeded | PayFlowState::Failed | PayFlowState::Abandoned => true,
		}
	}
}

/// One hop of a committed [`PayFlow`].
///
/// Carries everything belief updates need (notably the channel capacity observed at commit
/// time), so resolutions can be applied long after the graph snapshot that produced the part
/// is gone.
#[derive(Clone, Debug, PartialEq)]
pub struct PayFlowHop {
	/// The node this hop delivers to.
	pub node_id: NodeId,
	/// The channel carrying this hop.
	pub short_channel_id: u64,
	/// Which direction of the channel the hop traverses.
	pub direction: Direction,
	/// The amount entering this hop, including fees for all later hops.
	pub amount_msat: u64,
	/// The total CLTV delay from this hop to the destination, including the destination's
	/// final delta.
	pub cltv_delay: u32,
	/// The channel's capacity when the part was committed.
	pub channel_capacity_msat: u64,
}

/// One in-flight (or resolved) part of a payment, bound to a specific attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct PayFlow {
	/// Identifies this part within its payment, for resolution reporting.
	pub part_id: u64,
	/// Which call to [`PayflowManager::next_flows`] produced this part.
	pub attempt: u32,
	/// The hops of the part, payer first.
	pub hops: Vec<PayFlowHop>,
	/// The amount this part delivers to the destination.
	pub delivered_msat: u64,
	/// The solver's success estimate when the part was committed.
	pub success_probability: f64,
	/// Where the part is in its life.
	pub state: PayFlowState,
}

impl PayFlow {
	/// The total routing fee of this part.
	pub fn fee_msat(&self) -> u64 {
		match self.hops.first() {
			Some(first) => first.amount_msat.saturating_sub(self.delivered_msat),
			None => 0,
		}
	}
}

/// The outcome of one in-flight part, as observed by the caller's HTLC machinery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowResolution {
	/// The destination accepted the part.
	Success {
		/// The amount the destination received.
		amount_delivered_msat: u64,
	},
	/// A hop refused or failed to forward the part.
	Failure {
		/// The index (into the part's hops) of the hop that failed. Hops before it
		/// successfully forwarded.
		failing_hop: usize,
	},
	/// The part's fate is unknown; nothing was learned about any hop.
	Timeout,
}

/// Where a payment stands after a resolution was applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentProgress {
	/// The full amount was delivered.
	Complete,
	/// Parts are still in flight; wait for their resolutions.
	AwaitingParts,
	/// Nothing is in flight and the payment is not fully delivered; call
	/// [`PayflowManager::next_flows`] to retry.
	NeedsRetry,
}

/// A payment being tracked by the [`PayflowManager`].
#[derive(Clone, Debug)]
pub struct Payment {
	/// The node paying.
	pub payer: NodeId,
	/// The node being paid.
	pub destination: NodeId,
	/// The payment's identifying hash.
	pub payment_hash: PaymentHash,
	/// The total amount to deliver.
	pub amount_msat: u64,
	/// The payment's budgets.
	pub constraints: PaymentConstraints,
	/// The CLTV delta the destination requires on incoming HTLCs.
	pub final_cltv_expiry_delta: u32,
	/// All parts launched so far, keyed by part id, terminal ones included.
	pub parts: IndexedMap<u64, PayFlow>,
	/// The amount successfully delivered so far.
	pub delivered_msat: u64,
	next_part_id: u64,
	attempts: u32,
}

impl Payment {
	fn inflight_msat(&self) -> u64 {
		self.parts
			.iter()
			.filter(|(_, part)| !part.state.is_terminal())
			.map(|(_, part)| part.delivered_msat)
			.sum()
	}

	fn fees_committed_msat(&self) -> u64 {
		self.parts
			.iter()
			.filter(|(_, part)| !part.state.is_terminal() || part.state == PayFlowState::Succeeded)
			.map(|(_, part)| part.fee_msat())
			.sum()
	}

	fn active_part_count(&self) -> usize {
		self.parts.iter().filter(|(_, part)| !part.state.is_terminal()).count()
	}

	fn progress(&self) -> PaymentProgress {
		if self.delivered_msat >= self.amount_msat {
			PaymentProgress::Complete
		} else if self.active_part_count() > 0 {
			PaymentProgress::AwaitingParts
		} else {
			PaymentProgress::NeedsRetry
		}
	}
}

/// Owns the payments being routed and drives their parts through commit and resolution.
///
/// The graph snapshot and the [`BeliefStore`] are borrowed per call rather than owned, so one
/// belief store can serve several managers (or other consumers) and snapshots can be swapped
/// freely between calls.
pub struct PayflowManager {
	payments: HashMap<PaymentHash, Payment>,
}

impl Default for PayflowManager {
	fn default() -> Self {
		Self::new()
	}
}

impl PayflowManager {
	/// Constructs a manager tracking no payments.
	pub fn new() -> Self {
		PayflowManager { payments: new_hash_map() }
	}

	/// Starts tracking a payment. Fails with [`RouterError::DuplicatePayment`] if the hash is
	/// already registered.
	pub fn register_payment(
		&mut self, payer: NodeId, destination: NodeId, payment_hash: PaymentHash,
		amount_msat: u64, final_cltv_expiry_delta: u32, constraints: PaymentConstraints,
	) -> Result<(), RouterError> {
		match self.payments.entry(payment_hash) {
			hash_map::Entry::Occupied(_) => Err(RouterError::DuplicatePayment),
			hash_map::Entry::Vacant(entry) => {
				entry.insert(Payment {
					payer,
					destination,
					payment_hash,
					amount_msat,
					constraints,
					final_cltv_expiry_delta,
					parts: IndexedMap::new(),
					delivered_msat: 0,
					next_part_id: 0,
					attempts: 0,
				});
				Ok(())
			},
		}
	}

	/// Returns the tracked payment with the given hash, if any.
	pub fn payment(&self, payment_hash: &PaymentHash) -> Option<&Payment> {
		self.payments.get(payment_hash)
	}

	/// Stops tracking a payment and returns its final record.
	///
	/// Refuses (returning `None` and keeping the payment) while any part is still in flight,
	/// as resolutions may yet arrive for it; resolve or abandon every part first. Once
	/// removed, the hash may be registered again.
	pub fn remove_payment(&mut self, payment_hash: &PaymentHash) -> Option<Payment> {
		match self.payments.get(payment_hash) {
			Some(payment) if payment.active_part_count() == 0 => {
				self.payments.remove(payment_hash)
			},
			_ => None,
		}
	}

	/// Computes and commits the next set of parts for a payment: solves for the amount not
	/// yet delivered or in flight, checks the solution against the payment's budgets,
	/// reserves every hop's liquidity, and records the parts as committed.
	///
	/// Returns the newly committed parts, or an empty `Vec` if nothing is outstanding (all
	/// delivered, or the rest is in flight awaiting resolutions). On any error no part is
	/// committed and no reservation is left behind.
	///
	/// Past the payment's `stop_time` this abandons all in-flight parts (releasing their
	/// reservations) and fails with the `Deadline` constraint.
	pub fn next_flows<G: ChannelLookup, BL: Deref, L: Deref>(
		&mut self, graph: &G, beliefs: &mut BeliefStore<BL>, payment_hash: &PaymentHash,
		now: Duration, params: &FlowParameters, logger: L,
	) -> Result<Vec<PayFlow>, RouterError>
	where
		BL::Target: Logger,
		L::Target: Logger,
	{
		let payment = match self.payments.get_mut(payment_hash) {
			Some(payment) => payment,
			None => {
				return Err(RouterError::NoRouteFound {
					err: "No payment with the given hash is registered".to_owned(),
				})
			},
		};

		if now >= payment.constraints.stop_time {
			let mut abandoned = 0;
			for (_, part) in payment.parts.iter_mut() {
				if !part.state.is_terminal() {
					release_part(beliefs, part);
					part.state = PayFlowState::Abandoned;
					abandoned += 1;
				}
			}
			log_debug!(
				logger,
				"Payment {} passed its deadline, abandoned {} in-flight part(s)",
				payment_hash, abandoned
			);
			return Err(RouterError::ConstraintExceeded { constraint: Constraint::Deadline });
		}

		let outstanding_msat =
			payment.amount_msat.saturating_sub(payment.delivered_msat + payment.inflight_msat());
		if outstanding_msat == 0 {
			return Ok(Vec::new());
		}

		let parts_available =
			payment.constraints.max_parts.saturating_sub(payment.active_part_count());
		if parts_available == 0 {
			return Err(RouterError::ConstraintExceeded { constraint: Constraint::Parts });
		}

		let mut solve_attempts = 0;
		let flows = loop {
			solve_attempts += 1;
			match minflow(
				graph, &payment.payer, &payment.destination, beliefs, outstanding_msat, params,
				parts_available, &*logger,
			) {
				Ok(flows) => break flows,
				Err(RouterError::BeliefInconsistent { .. })
					if solve_attempts <= params.solve_retries =>
				{
					continue
				},
				Err(e) => return Err(e),
			}
		};

		if flows.len() > parts_available {
			return Err(RouterError::ConstraintExceeded { constraint: Constraint::Parts });
		}
		let new_fees_msat: u64 = flows.iter().map(Flow::fee_msat).sum();
		if payment.fees_committed_msat().saturating_add(new_fees_msat)
			> payment.constraints.max_fee_msat
		{
			return Err(RouterError::ConstraintExceeded { constraint: Constraint::Fee });
		}
		for flow in flows.iter() {
			if flow.cltv_expiry_delta() + payment.final_cltv_expiry_delta
				> payment.constraints.max_cltv_expiry_delta
			{
				return Err(RouterError::ConstraintExceeded { constraint: Constraint::Delay });
			}
		}

		// All checks passed; reserve hop liquidity. If a reservation fails, roll back the ones
		// already made so an error leaves the store untouched.
		let mut parts = Vec::with_capacity(flows.len());
		let mut reserved: Vec<(u64, Direction, u64)> = Vec::new();
		for flow in flows.iter() {
			let part = build_payflow(graph, payment, flow);
			for hop in part.hops.iter() {
				if let Err(e) = beliefs.reserve(
					hop.short_channel_id,
					hop.direction,
					hop.channel_capacity_msat,
					hop.amount_msat,
				) {
					for (scid, direction, amount_msat) in reserved.iter() {
						beliefs.release(*scid, *direction, *amount_msat);
					}
					return Err(e);
				}
				reserved.push((hop.short_channel_id, hop.direction, hop.amount_msat));
			}
			parts.push(part);
		}

		payment.attempts += 1;
		for part in parts.iter_mut() {
			part.part_id = payment.next_part_id;
			payment.next_part_id += 1;
			part.attempt = payment.attempts;
			part.state = PayFlowState::Committed;
			payment.parts.insert(part.part_id, part.clone());
		}
		log_debug!(
			logger,
			"Committed {} part(s) covering {} msat of payment {} on attempt {}",
			parts.len(), outstanding_msat, payment_hash, payment.attempts
		);
		Ok(parts)
	}

	/// Applies the outcome of one in-flight part: releases its reservations, narrows the
	/// relevant beliefs, moves the part to a terminal state, and reports where the payment
	/// now stands.
	///
	/// Resolving a part which already reached a terminal state fails with
	/// [`RouterError::DoubleResolution`] and changes nothing.
	pub fn handle_resolution<BL: Deref, L: Deref>(
		&mut self, beliefs: &mut BeliefStore<BL>, payment_hash: &PaymentHash, part_id: u64,
		resolution: FlowResolution, logger: L,
	) -> Result<PaymentProgress, RouterError>
	where
		BL::Target: Logger,
		L::Target: Logger,
	{
		let payment = match self.payments.get_mut(payment_hash) {
			Some(payment) => payment,
			None => {
				return Err(RouterError::NoRouteFound {
					err: "No payment with the given hash is registered".to_owned(),
				})
			},
		};
		let part = match payment.parts.get_mut(&part_id) {
			Some(part) if !part.state.is_terminal() => part,
			_ => return Err(RouterError::DoubleResolution { part_id }),
		};

		release_part(beliefs, part);
		match resolution {
			FlowResolution::Success { amount_delivered_msat } => {
				debug_assert_eq!(amount_delivered_msat, part.delivered_msat);
				for hop in part.hops.iter() {
					beliefs.narrow_on_success(
						hop.short_channel_id,
						hop.direction,
						hop.channel_capacity_msat,
						hop.amount_msat,
					);
				}
				part.state = PayFlowState::Succeeded;
				payment.delivered_msat =
					payment.delivered_msat.saturating_add(amount_delivered_msat);
			},
			FlowResolution::Failure { failing_hop } => {
				debug_assert!(failing_hop < part.hops.len());
				// Only the failing hop taught us anything: the hops before it forwarded but
				// their liquidity moved on with the HTLC's round trip, and the hops after it
				// were never reached.
				if let Some(hop) = part.hops.get(failing_hop) {
					beliefs.narrow_on_failure(
						hop.short_channel_id,
						hop.direction,
						hop.channel_capacity_msat,
						hop.amount_msat,
					);
				}
				part.state = PayFlowState::Failed;
			},
			FlowResolution::Timeout => {
				part.state = PayFlowState::Abandoned;
			},
		}

		let progress = payment.progress();
		if progress == PaymentProgress::Complete {
			log_info!(
				logger,
				"Payment {} complete: {} msat delivered over {} part(s) in {} attempt(s)",
				payment_hash, payment.delivered_msat, payment.parts.len(), payment.attempts
			);
		} else {
			log_trace!(
				logger,
				"Part {} of payment {} resolved, payment now {:?}",
				part_id, payment_hash, progress
			);
		}
		Ok(progress)
	}
}

fn release_part<BL: Deref>(beliefs: &mut BeliefStore<BL>, part: &PayFlow)
where
	BL::Target: Logger,
{
	for hop in part.hops.iter() {
		beliefs.release(hop.short_channel_id, hop.direction, hop.amount_msat);
	}
}

/// Binds a solver [`Flow`] to a [`PayFlow`], resolving per-hop absolute CLTV delays and
/// capturing channel capacities from the snapshot.
fn build_payflow<G: ChannelLookup>(graph: &G, payment: &Payment, flow: &Flow) -> PayFlow {
	let mut hops = Vec::with_capacity(flow.hops.len());
	let mut cltv_delay = payment.final_cltv_expiry_delta;
	for (i, hop) in flow.hops.iter().enumerate().rev() {
		// The HTLC over a hop must outlive the downstream HTLCs by the deltas the downstream
		// forwarders require.
		if i + 1 < flow.hops.len() {
			cltv_delay += flow.hops[i + 1].cltv_expiry_delta as u32;
		}
		let channel_capacity_msat =
			graph.channel(hop.short_channel_id).map_or(hop.amount_msat, |c| c.capacity_msat);
		hops.push(PayFlowHop {
			node_id: hop.target,
			short_channel_id: hop.short_channel_id,
			direction: hop.direction,
			amount_msat: hop.amount_msat,
			cltv_delay,
			channel_capacity_msat,
		});
	}
	hops.reverse();
	PayFlow {
		part_id: 0,
		attempt: 0,
		hops,
		delivered_msat: flow.delivered_msat,
		success_probability: flow.success_probability,
		state: PayFlowState::Planned,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::routing::gossip::NetworkView;
	use crate::routing::test_utils::{add_dual_channel, add_dual_channel_with_fees, node_id};
	use crate::util::test_utils::TestLogger;

	fn constraints() -> PaymentConstraints {
		PaymentConstraints {
			max_fee_msat: 10_000,
			max_cltv_expiry_delta: 1_000,
			max_parts: 4,
			stop_time: Duration::from_secs(100),
		}
	}

	fn hash(byte: u8) -> PaymentHash {
		PaymentHash([byte; 32])
	}

	fn now() -> Duration {
		Duration::from_secs(10)
	}

	#[test]
	fn a_payment_runs_to_completion() {
		let a = node_id(1);
		let b = node_id(2);
		let c = node_id(3);
		let mut view = NetworkView::new();
		add_dual_channel(&mut view, 1, a, b, 1_000_000);
		add_dual_channel(&mut view, 2, b, c, 1_000_000);
		let logger = TestLogger::new();
		let mut beliefs = BeliefStore::new(&logger);
		let mut manager = PayflowManager::new();
		let params = FlowParameters::default();

		manager.register_payment(a, c, hash(7), 100_000, 18, constraints()).unwrap();
		let parts = manager
			.next_flows(&view, &mut beliefs, &hash(7), now(), &params, &logger)
			.unwrap();
		assert_eq!(parts.len(), 1);
		assert_eq!(parts[0].state, PayFlowState::Committed);
		assert_eq!(parts[0].delivered_msat, 100_000);
		// CLTV delays accumulate from the destination's final delta backwards.
		assert_eq!(parts[0].hops[1].cltv_delay, 18);
		assert_eq!(parts[0].hops[0].cltv_delay, 18 + 40);

		// While the part is in flight, its liquidity is reserved.
		let belief = beliefs.get(1, Direction::OneToTwo, 1_000_000);
		assert_eq!(belief.known_max_msat, 900_000);

		let progress = manager
			.handle_resolution(
				&mut beliefs,
				&hash(7),
				parts[0].part_id,
				FlowResolution::Success { amount_delivered_msat: 100_000 },
				&logger,
			)
			.unwrap();
		assert_eq!(progress, PaymentProgress::Complete);
		assert_eq!(manager.payment(&hash(7)).unwrap().delivered_msat, 100_000);

		// Reservations are gone and the success narrowed the lower bounds.
		let belief = beliefs.get(1, Direction::OneToTwo, 1_000_000);
		assert_eq!(belief.known_min_msat, 100_000);
		assert_eq!(belief.known_max_msat, 1_000_000);
	}

	#[test]
	fn second_resolution_of_a_part_is_rejected() {
		let a = node_id(1);
		let b = node_id(2);
		let mut view = NetworkView::new();
		add_dual_channel(&mut view, 1, a, b, 1_000_000);
		let logger = TestLogger::new();
		let mut beliefs = BeliefStore::new(&logger);
		let mut manager = PayflowManager::new();
		let params = FlowParameters::default();

		manager.register_payment(a, b, hash(7), 50_000, 18, constraints()).unwrap();
		let parts = manager
			.next_flows(&view, &mut beliefs, &hash(7), now(), &params, &logger)
			.unwrap();
		let part_id = parts[0].part_id;
		manager
			.handle_resolution(
				&mut beliefs,
				&hash(7),
				part_id,
				FlowResolution::Success { amount_delivered_msat: 50_000 },
				&logger,
			)
			.unwrap();
		let err = manager
			.handle_resolution(
				&mut beliefs,
				&hash(7),
				part_id,
				FlowResolution::Failure { failing_hop: 0 },
				&logger,
			)
			.unwrap_err();
		assert_eq!(err, RouterError::DoubleResolution { part_id });
		// The double resolution left the belief narrowing from the success in place.
		assert_eq!(beliefs.get(1, Direction::OneToTwo, 1_000_000).known_min_msat, 50_000);
	}

	#[test]
	fn failure_narrows_only_the_failing_hop_and_enables_a_retry() {
		let a = node_id(1);
		let b = node_id(2);
		let c = node_id(3);
		let d = node_id(4);
		let mut view = NetworkView::new();
		add_dual_channel(&mut view, 1, a, b, 1_000_000);
		add_dual_channel(&mut view, 2, b, d, 1_000_000);
		add_dual_channel_with_fees(&mut view, 3, a, c, 1_000_000, 10, 0);
		add_dual_channel_with_fees(&mut view, 4, c, d, 1_000_000, 10, 0);
		let logger = TestLogger::new();
		let mut beliefs = BeliefStore::new(&logger);
		let mut manager = PayflowManager::new();
		let params = FlowParameters::default();

		manager.register_payment(a, d, hash(9), 100_000, 18, constraints()).unwrap();
		// The fee-free a->b->d route wins the first attempt.
		let parts = manager
			.next_flows(&view, &mut beliefs, &hash(9), now(), &params, &logger)
			.unwrap();
		assert_eq!(parts.len(), 1);
		assert_eq!(parts[0].hops[0].short_channel_id, 1);

		let progress = manager
			.handle_resolution(
				&mut beliefs,
				&hash(9),
				parts[0].part_id,
				FlowResolution::Failure { failing_hop: 1 },
				&logger,
			)
			.unwrap();
		assert_eq!(progress, PaymentProgress::NeedsRetry);

		// Only channel 2 (the failing hop) was narrowed; channel 1 forwarded fine and keeps
		// its full range, and both reservations were released.
		assert_eq!(beliefs.get(2, Direction::OneToTwo, 1_000_000).known_max_msat, 99_999);
		assert_eq!(
			beliefs.get(1, Direction::OneToTwo, 1_000_000),
			crate::routing::scoring::ChannelBelief::unknown(1_000_000)
		);

		// The retry routes around the narrowed channel.
		let retry = manager
			.next_flows(&view, &mut beliefs, &hash(9), now(), &params, &logger)
			.unwrap();
		assert_eq!(retry.len(), 1);
		assert_eq!(retry[0].hops[0].short_channel_id, 3);
		assert_eq!(retry[0].attempt, 2);
	}

	#[test]
	fn timeout_releases_without_narrowing() {
		let a = node_id(1);
		let b = node_id(2);
		let mut view = NetworkView::new();
		add_dual_channel(&mut view, 1, a, b, 1_000_000);
		let logger = TestLogger::new();
		let mut beliefs = BeliefStore::new(&logger);
		let mut manager = PayflowManager::new();
		let params = FlowParameters::default();

		manager.register_payment(a, b, hash(5), 70_000, 18, constraints()).unwrap();
		let parts = manager
			.next_flows(&view, &mut beliefs, &hash(5), now(), &params, &logger)
			.unwrap();
		let progress = manager
			.handle_resolution(
				&mut beliefs,
				&hash(5),
				parts[0].part_id,
				FlowResolution::Timeout,
				&logger,
			)
			.unwrap();
		assert_eq!(progress, PaymentProgress::NeedsRetry);
		assert_eq!(
			beliefs.get(1, Direction::OneToTwo, 1_000_000),
			crate::routing::scoring::ChannelBelief::unknown(1_000_000)
		);
	}

	#[test]
	fn multi_part_payment_conserves_the_amount() {
		let a = node_id(1);
		let b = node_id(2);
		let c = node_id(3);
		let mut view = NetworkView::new();
		add_dual_channel(&mut view, 1, a, b, 600_000);
		add_dual_channel(&mut view, 2, a, b, 600_000);
		add_dual_channel(&mut view, 3, b, c, 2_000_000);
		let logger = TestLogger::new();
		let mut beliefs = BeliefStore::new(&logger);
		let mut manager = PayflowManager::new();
		let params = FlowParameters::default();

		manager.register_payment(a, c, hash(2), 1_000_000, 18, constraints()).unwrap();
		let parts = manager
			.next_flows(&view, &mut beliefs, &hash(2), now(), &params, &logger)
			.unwrap();
		assert_eq!(parts.len(), 2);
		assert_eq!(parts.iter().map(|part| part.delivered_msat).sum::<u64>(), 1_000_000);

		// Nothing outstanding while both parts are in flight.
		assert!(manager
			.next_flows(&view, &mut beliefs, &hash(2), now(), &params, &logger)
			.unwrap()
			.is_empty());

		let mut progress = None;
		for part in parts.iter() {
			progress = Some(
				manager
					.handle_resolution(
						&mut beliefs,
						&hash(2),
						part.part_id,
						FlowResolution::Success { amount_delivered_msat: part.delivered_msat },
						&logger,
					)
					.unwrap(),
			);
		}
		assert_eq!(progress, Some(PaymentProgress::Complete));
	}

	#[test]
	fn deadline_abandons_inflight_parts() {
		let a = node_id(1);
		let b = node_id(2);
		let mut view = NetworkView::new();
		add_dual_channel(&mut view, 1, a, b, 1_000_000);
		let logger = TestLogger::new();
		let mut beliefs = BeliefStore::new(&logger);
		let mut manager = PayflowManager::new();
		let params = FlowParameters::default();

		manager.register_payment(a, b, hash(3), 100_000, 18, constraints()).unwrap();
		let parts = manager
			.next_flows(&view, &mut beliefs, &hash(3), now(), &params, &logger)
			.unwrap();
		assert_eq!(parts.len(), 1);

		let err = manager
			.next_flows(&view, &mut beliefs, &hash(3), Duration::from_secs(200), &params, &logger)
			.unwrap_err();
		assert_eq!(err, RouterError::ConstraintExceeded { constraint: Constraint::Deadline });
		let payment = manager.payment(&hash(3)).unwrap();
		assert_eq!(payment.parts.get(&parts[0].part_id).unwrap().state, PayFlowState::Abandoned);
		// The abandoned part's reservation is gone.
		assert_eq!(
			beliefs.get(1, Direction::OneToTwo, 1_000_000),
			crate::routing::scoring::ChannelBelief::unknown(1_000_000)
		);
	}

	#[test]
	fn fee_budget_is_enforced_without_side_effects() {
		let a = node_id(1);
		let b = node_id(2);
		let c = node_id(3);
		let mut view = NetworkView::new();
		add_dual_channel(&mut view, 1, a, b, 1_000_000);
		add_dual_channel_with_fees(&mut view, 2, b, c, 1_000_000, 500, 0);
		let logger = TestLogger::new();
		let mut beliefs = BeliefStore::new(&logger);
		let mut manager = PayflowManager::new();
		let params = FlowParameters::default();

		let mut tight = constraints();
		tight.max_fee_msat = 100;
		manager.register_payment(a, c, hash(4), 100_000, 18, tight).unwrap();
		let err = manager
			.next_flows(&view, &mut beliefs, &hash(4), now(), &params, &logger)
			.unwrap_err();
		assert_eq!(err, RouterError::ConstraintExceeded { constraint: Constraint::Fee });
		// The failed attempt reserved nothing.
		assert_eq!(
			beliefs.get(1, Direction::OneToTwo, 1_000_000),
			crate::routing::scoring::ChannelBelief::unknown(1_000_000)
		);
		assert_eq!(manager.payment(&hash(4)).unwrap().parts.len(), 0);
	}

	#[test]
	fn delay_budget_is_enforced() {
		let a = node_id(1);
		let b = node_id(2);
		let c = node_id(3);
		let mut view = NetworkView::new();
		add_dual_channel(&mut view, 1, a, b, 1_000_000);
		add_dual_channel(&mut view, 2, b, c, 1_000_000);
		let logger = TestLogger::new();
		let mut beliefs = BeliefStore::new(&logger);
		let mut manager = PayflowManager::new();
		let params = FlowParameters::default();

		let mut tight = constraints();
		// The route needs 40 + 40 of hop delta plus the final 18.
		tight.max_cltv_expiry_delta = 90;
		manager.register_payment(a, c, hash(6), 100_000, 18, tight).unwrap();
		let err = manager
			.next_flows(&view, &mut beliefs, &hash(6), now(), &params, &logger)
			.unwrap_err();
		assert_eq!(err, RouterError::ConstraintExceeded { constraint: Constraint::Delay });
	}

	#[test]
	fn part_budget_is_enforced() {
		let a = node_id(1);
		let b = node_id(2);
		let mut view = NetworkView::new();
		add_dual_channel(&mut view, 1, a, b, 600_000);
		add_dual_channel(&mut view, 2, a, b, 600_000);
		let logger = TestLogger::new();
		let mut beliefs = BeliefStore::new(&logger);
		let mut manager = PayflowManager::new();
		let params = FlowParameters::default();

		let mut tight = constraints();
		tight.max_parts = 1;
		manager.register_payment(a, b, hash(8), 1_000_000, 18, tight).unwrap();
		let err = manager
			.next_flows(&view, &mut beliefs, &hash(8), now(), &params, &logger)
			.unwrap_err();
		assert_eq!(err, RouterError::ConstraintExceeded { constraint: Constraint::Parts });
	}

	#[test]
	fn duplicate_registration_is_rejected() {
		let mut manager = PayflowManager::new();
		manager
			.register_payment(node_id(1), node_id(2), hash(1), 1_000, 18, constraints())
			.unwrap();
		let err = manager
			.register_payment(node_id(1), node_id(2), hash(1), 2_000, 18, constraints())
			.unwrap_err();
		assert_eq!(err, RouterError::DuplicatePayment);
	}

	#[test]
	fn payment_removal_requires_all_parts_resolved() {
		let a = node_id(1);
		let b = node_id(2);
		let mut view = NetworkView::new();
		add_dual_channel(&mut view, 1, a, b, 1_000_000);
		let logger = TestLogger::new();
		let mut beliefs = BeliefStore::new(&logger);
		let mut manager = PayflowManager::new();
		let params = FlowParameters::default();

		manager.register_payment(a, b, hash(11), 60_000, 18, constraints()).unwrap();
		let parts = manager
			.next_flows(&view, &mut beliefs, &hash(11), now(), &params, &logger)
			.unwrap();
		// The part is in flight; the payment must stay tracked until it resolves.
		assert!(manager.remove_payment(&hash(11)).is_none());
		assert!(manager.payment(&hash(11)).is_some());

		manager
			.handle_resolution(
				&mut beliefs,
				&hash(11),
				parts[0].part_id,
				FlowResolution::Success { amount_delivered_msat: 60_000 },
				&logger,
			)
			.unwrap();
		let record = manager.remove_payment(&hash(11)).unwrap();
		assert_eq!(record.delivered_msat, 60_000);
		assert!(manager.payment(&hash(11)).is_none());
		// The hash is free for a fresh payment again.
		manager.register_payment(a, b, hash(11), 1_000, 18, constraints()).unwrap();
	}

	#[test]
	fn inconsistent_solve_is_retried_before_surfacing() {
		let a = node_id(1);
		let b = node_id(2);
		let c = node_id(3);
		let mut view = NetworkView::new();
		// b's 10% fee makes channel 1 too small for the amount plus fee, but only once the
		// solver merges its two per-iteration allocations into a single part; each allocation
		// fits on its own, so only materialization catches the overshoot.
		add_dual_channel(&mut view, 1, a, b, 100_000);
		add_dual_channel_with_fees(&mut view, 2, b, c, 1_000_000, 0, 100_000);
		let logger = TestLogger::new();
		let mut beliefs = BeliefStore::new(&logger);
		let mut manager = PayflowManager::new();
		let params = FlowParameters::default();

		manager.register_payment(a, c, hash(12), 95_000, 18, constraints()).unwrap();
		let err = manager
			.next_flows(&view, &mut beliefs, &hash(12), now(), &params, &logger)
			.unwrap_err();
		assert_eq!(
			err,
			RouterError::BeliefInconsistent { short_channel_id: 1, attempted_msat: 104_500 }
		);
		// The solve was retried twice before the error surfaced: three runs of two
		// allocations each.
		logger.assert_log_contains("lightning_flow_router::routing::router", "Allocated", 6);
		// The failed attempts left no part and no reservation behind.
		assert_eq!(manager.payment(&hash(12)).unwrap().parts.len(), 0);
		assert_eq!(
			beliefs.get(1, Direction::OneToTwo, 100_000),
			crate::routing::scoring::ChannelBelief::unknown(100_000)
		);
	}

	#[test]
	fn inflight_parts_hide_liquidity_from_other_payments() {
		let a = node_id(1);
		let b = node_id(2);
		let mut view = NetworkView::new();
		add_dual_channel(&mut view, 1, a, b, 1_000_000);
		let logger = TestLogger::new();
		let mut beliefs = BeliefStore::new(&logger);
		let mut manager = PayflowManager::new();
		let params = FlowParameters::default();

		manager.register_payment(a, b, hash(1), 800_000, 18, constraints()).unwrap();
		manager.next_flows(&view, &mut beliefs, &hash(1), now(), &params, &logger).unwrap();

		// A second payment cannot plan with the 800_000 msat the first has in flight.
		manager.register_payment(a, b, hash(2), 500_000, 18, constraints()).unwrap();
		let err = manager
			.next_flows(&view, &mut beliefs, &hash(2), now(), &params, &logger)
			.unwrap_err();
		assert!(matches!(err, RouterError::NoRouteFound { .. }));
	}
}
