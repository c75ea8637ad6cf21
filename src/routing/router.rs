// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The min-cost-flow solver: splits a payment across channel paths, trading routing fees
//! against the probability of running into a channel's unknown liquidity ceiling.

use crate::prelude::*;
use crate::routing::gossip::{ChannelLookup, Direction, NodeId, RoutingFees};
use crate::routing::scoring::{BeliefStore, ChannelBelief};
use crate::routing::RouterError;
use crate::util::indexed_heap::IndexedHeap;
use crate::util::logger::Logger;

use core::ops::Deref;

/// The maximum value a payment may carry, in millisatoshi: 21 million bitcoin.
pub const MAX_VALUE_MSAT: u64 = 21_000_000_0000_0000_000;

/// Arc costs at or above this are treated as "do not use". Kept finite so per-arc cost
/// components can still be summed with saturating adds.
const FLOW_INF_COST: u64 = 1 << 60;

/// Distance sentinel for nodes the search has not reached.
const UNREACHABLE: u64 = u64::MAX;

const NO_ARC: u32 = u32::MAX;

/// Knobs controlling how the flow solver trades fees against reliability.
///
/// The defaults are a reasonable starting point; a payer who cares more about reliability
/// than fees should raise [`mu_msat`].
///
/// [`mu_msat`]: Self::mu_msat
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowParameters {
	/// Weight of the uncertainty penalty, in millisatoshis per bit of improbability.
	///
	/// An arc whose estimated success probability is `p` is charged an extra
	/// `mu_msat * -log2(p)` on top of its fee, so e.g. a 50%-likely arc costs `mu_msat`
	/// more than a certain one. Zero routes purely by fee.
	pub mu_msat: u64,

	/// Cost of HTLC lock-up time, in millionths of a millisatoshi per msat per CLTV unit.
	///
	/// Longer time-locks keep funds unusable for longer if a payment gets stuck, so each arc
	/// is charged `amount * cltv_expiry_delta * delay_riskfactor_millionths / 1_000_000`.
	pub delay_riskfactor_millionths: u64,

	/// How many times a solve is retried when materialization refuses the computed flow with
	/// [`RouterError::BeliefInconsistent`].
	pub solve_retries: usize,

	/// Path-search iteration budget per allowed payment part. The solver gives up with
	/// [`RouterError::NoRouteFound`] once it has run `max_parts` times this many searches
	/// without fully allocating the payment.
	pub iterations_per_part: usize,
}

impl Default for FlowParameters {
	fn default() -> Self {
		FlowParameters {
			mu_msat: 1_000,
			delay_riskfactor_millionths: 10,
			solve_retries: 2,
			iterations_per_part: 4,
		}
	}
}

/// One hop of a computed [`Flow`].
#[derive(Clone, Debug, PartialEq)]
pub struct FlowHop {
	/// The channel carrying this hop.
	pub short_channel_id: u64,
	/// Which direction of the channel the hop traverses.
	pub direction: Direction,
	/// The node this hop delivers to.
	pub target: NodeId,
	/// The amount entering this hop, including fees for all later hops.
	pub amount_msat: u64,
	/// The CLTV delta this hop requires.
	pub cltv_expiry_delta: u16,
}

/// One path of a computed payment split, with per-hop amounts including fees.
///
/// Hop amounts are non-increasing from payer to payee; the difference between the first
/// hop's amount and [`delivered_msat`] is the total routing fee of the path.
///
/// [`delivered_msat`]: Self::delivered_msat
#[derive(Clone, Debug, PartialEq)]
pub struct Flow {
	/// The hops of the path, payer first.
	pub hops: Vec<FlowHop>,
	/// The amount the path delivers to the payee.
	pub delivered_msat: u64,
	/// The estimated probability that every hop has the liquidity this path asks of it.
	pub success_probability: f64,
}

impl Flow {
	/// The total routing fee of this path.
	pub fn fee_msat(&self) -> u64 {
		match self.hops.first() {
			Some(first) => first.amount_msat.saturating_sub(self.delivered_msat),
			None => 0,
		}
	}

	/// The sum of the CLTV deltas of this path's hops.
	pub fn cltv_expiry_delta(&self) -> u32 {
		self.hops.iter().map(|hop| hop.cltv_expiry_delta as u32).sum()
	}
}

/// Computes the fee a forwarding node charges for relaying `amount_msat`, or `None` on
/// overflow.
pub(crate) fn compute_fees(amount_msat: u64, channel_fees: RoutingFees) -> Option<u64> {
	amount_msat
		.checked_mul(channel_fees.proportional_millionths as u64)
		.map(|part| part / 1_000_000)?
		.checked_add(channel_fees.base_msat as u64)
}

struct FlowArc {
	short_channel_id: u64,
	direction: Direction,
	source: u32,
	target: u32,
	belief: ChannelBelief,
	/// Most this arc can usefully carry: the belief's upper bound further capped by the
	/// direction's `htlc_maximum_msat`.
	usable_max_msat: u64,
	htlc_minimum_msat: u64,
	fees: RoutingFees,
	cltv_expiry_delta: u16,
	/// Amount allocated over this arc by earlier solver iterations.
	flow_msat: u64,
}

impl FlowArc {
	fn headroom_msat(&self) -> u64 {
		self.usable_max_msat.saturating_sub(self.flow_msat)
	}

	/// The cost of additionally pushing `push_msat` over this arc, given what earlier
	/// iterations already allocated. Re-derived every search since `flow_msat` moves.
	fn cost_msat(&self, push_msat: u64, params: &FlowParameters) -> u64 {
		let total = self.flow_msat.saturating_add(push_msat);
		if total > self.usable_max_msat {
			return FLOW_INF_COST;
		}
		let fee = match compute_fees(push_msat, self.fees) {
			Some(fee) => fee,
			None => return FLOW_INF_COST,
		};

		let uncertainty = if total <= self.belief.known_min_msat || params.mu_msat == 0 {
			0
		} else {
			let states =
				(self.belief.known_max_msat - self.belief.known_min_msat).saturating_add(1);
			let good_states = self.belief.known_max_msat - total + 1;
			let bits = -libm::log2(good_states as f64 / states as f64);
			(params.mu_msat as f64 * bits) as u64
		};

		let delay = (push_msat as u128)
			* (self.cltv_expiry_delta as u128)
			* (params.delay_riskfactor_millionths as u128)
			/ 1_000_000;
		let delay = u64::try_from(delay).unwrap_or(u64::MAX);

		core::cmp::min(fee.saturating_add(uncertainty).saturating_add(delay), FLOW_INF_COST)
	}
}

/// The solver's working graph: nodes reachable from the payer, densely indexed in a
/// deterministic discovery order, with one arc per usable channel direction.
struct FlowGraph {
	nodes: Vec<NodeId>,
	arcs: Vec<FlowArc>,
	out_arcs: Vec<Vec<u32>>,
}

impl FlowGraph {
	fn build<G: ChannelLookup, BL: Deref>(
		graph: &G, payer: &NodeId, beliefs: &BeliefStore<BL>,
	) -> Self
	where
		BL::Target: Logger,
	{
		let mut nodes = vec![*payer];
		let mut node_idx = new_hash_map();
		node_idx.insert(*payer, 0u32);
		let mut arcs = Vec::new();
		let mut out_arcs = vec![Vec::new()];
		let mut queue: VecDeque<u32> = VecDeque::new();
		queue.push_back(0);

		while let Some(u) = queue.pop_front() {
			let u_id = nodes[u as usize];
			graph.for_each_channel_from(&u_id, |scid, info| {
				let directed = match info.as_directed_from(&u_id) {
					Some(directed) => directed,
					None => return,
				};
				if !directed.enabled() {
					return;
				}
				let target = *directed.target();
				if target == u_id {
					return;
				}
				let belief = beliefs.get(scid, directed.direction(), directed.capacity_msat());
				let usable_max_msat =
					core::cmp::min(belief.known_max_msat, directed.htlc_maximum_msat());
				if usable_max_msat == 0 {
					return;
				}
				let v = match node_idx.get(&target).copied() {
					Some(v) => v,
					None => {
						let v = nodes.len() as u32;
						nodes.push(target);
						node_idx.insert(target, v);
						out_arcs.push(Vec::new());
						queue.push_back(v);
						v
					},
				};
				let arc_id = arcs.len() as u32;
				arcs.push(FlowArc {
					short_channel_id: scid,
					direction: directed.direction(),
					source: u,
					target: v,
					belief,
					usable_max_msat,
					htlc_minimum_msat: directed.htlc_minimum_msat(),
					fees: directed.fees(),
					cltv_expiry_delta: directed.cltv_expiry_delta(),
					flow_msat: 0,
				});
				out_arcs[u as usize].push(arc_id);
			});
		}

		FlowGraph { nodes, arcs, out_arcs }
	}

	fn node_index(&self, node: &NodeId) -> Option<u32> {
		self.nodes.iter().position(|n| n == node).map(|idx| idx as u32)
	}

	/// Whether every arc of the path can fit `delivered_msat` plus the fees of all hops
	/// downstream of it within its remaining headroom.
	fn path_fits(&self, path: &[u32], delivered_msat: u64) -> bool {
		let mut amount_msat = delivered_msat;
		for i in (0..path.len()).rev() {
			let arc = &self.arcs[path[i] as usize];
			if amount_msat > arc.headroom_msat() {
				return false;
			}
			if i > 0 {
				amount_msat = match compute_fees(amount_msat, arc.fees)
					.and_then(|fee| amount_msat.checked_add(fee))
				{
					Some(amount) => amount,
					None => return false,
				};
			}
		}
		true
	}

	/// Returns the largest delivered-side amount (up to `remaining_msat`) the path can
	/// carry: each upstream arc must fit the delivered amount plus all downstream fees, not
	/// just the delivered amount, so the plain per-arc headroom minimum would overshoot on
	/// fee-charging paths.
	///
	/// The amount entering each arc is nondecreasing in the delivered amount, so the
	/// largest fitting amount is found by binary search. Returns zero if the path cannot
	/// carry anything once fees are counted.
	fn fee_adjusted_bottleneck(&self, path: &[u32], remaining_msat: u64) -> u64 {
		if self.path_fits(path, remaining_msat) {
			return remaining_msat;
		}
		let mut lo = 0u64;
		let mut hi = remaining_msat;
		while hi - lo > 1 {
			let mid = lo + (hi - lo) / 2;
			if self.path_fits(path, mid) {
				lo = mid;
			} else {
				hi = mid;
			}
		}
		lo
	}

	/// Runs a shortest-path search from `source`, filling `dist`/`prev_arc`, and returns
	/// whether `target` was reached. Costs are marginal for pushing up to `remaining_msat`
	/// more over each arc.
	fn shortest_path(
		&self, source: u32, target: u32, remaining_msat: u64, params: &FlowParameters,
		heap: &mut IndexedHeap, dist: &mut Vec<u64>, prev_arc: &mut Vec<u32>,
	) -> bool {
		dist.clear();
		dist.resize(self.nodes.len(), UNREACHABLE);
		prev_arc.clear();
		prev_arc.resize(self.nodes.len(), NO_ARC);
		heap.clear();

		dist[source as usize] = 0;
		heap.push(source, 0);

		while let Some((u, u_dist)) = heap.pop() {
			if u == target {
				return true;
			}
			for arc_id in self.out_arcs[u as usize].iter() {
				let arc = &self.arcs[*arc_id as usize];
				let push_msat = core::cmp::min(remaining_msat, arc.headroom_msat());
				// push_msat is the delivered-side amount; the amount actually entering the hop
				// also carries the fees of downstream hops (unknown until a full path exists),
				// so this gate only under-approximates the entering amount.
				if push_msat == 0 || push_msat < arc.htlc_minimum_msat {
					continue;
				}
				let cost = arc.cost_msat(push_msat, params);
				if cost >= FLOW_INF_COST {
					continue;
				}
				let v = arc.target;
				let new_dist = u_dist.saturating_add(cost);
				if new_dist < dist[v as usize] {
					dist[v as usize] = new_dist;
					prev_arc[v as usize] = *arc_id;
					if heap.contains(v) {
						heap.decrease_key(v, new_dist);
					} else {
						heap.push(v, new_dist);
					}
				}
			}
		}
		false
	}
}

/// Splits `amount_msat` from `payer` to `payee` into one or more [`Flow`]s over `graph`,
/// priced against the liquidity beliefs in `beliefs`.
///
/// Uses successive shortest augmenting paths: each iteration finds the cheapest path under
/// the current allocation (fees plus uncertainty and delay penalties, see
/// [`FlowParameters`]), pushes the path's bottleneck amount over it, and repeats until the
/// full amount is allocated. Either the whole amount is delivered or
/// [`RouterError::NoRouteFound`] is returned; partial allocations are never surfaced and
/// `beliefs` is not modified.
///
/// Output is deterministic: identical inputs yield identical flows.
pub fn minflow<G: ChannelLookup, BL: Deref, L: Deref>(
	graph: &G, payer: &NodeId, payee: &NodeId, beliefs: &BeliefStore<BL>, amount_msat: u64,
	params: &FlowParameters, max_parts: usize, logger: L,
) -> Result<Vec<Flow>, RouterError>
where
	BL::Target: Logger,
	L::Target: Logger,
{
	if payer == payee {
		return Err(RouterError::NoRouteFound {
			err: "Cannot route a payment to ourselves".to_owned(),
		});
	}
	if amount_msat == 0 {
		return Err(RouterError::NoRouteFound {
			err: "Cannot send a payment of 0 msat".to_owned(),
		});
	}
	if amount_msat > MAX_VALUE_MSAT {
		return Err(RouterError::NoRouteFound {
			err: "Cannot send a payment of more than 21 million bitcoin".to_owned(),
		});
	}

	let mut flow_graph = FlowGraph::build(graph, payer, beliefs);
	let target = match flow_graph.node_index(payee) {
		Some(target) => target,
		None => {
			return Err(RouterError::NoRouteFound {
				err: "Payee is not reachable from the payer".to_owned(),
			})
		},
	};

	let mut heap = IndexedHeap::new(flow_graph.nodes.len());
	let mut dist = Vec::new();
	let mut prev_arc = Vec::new();

	// Arc paths with the amount allocated over each, merged on identical paths and kept in
	// first-seen order.
	let mut segments: Vec<(Vec<u32>, u64)> = Vec::new();
	let mut remaining_msat = amount_msat;
	let iteration_budget = max_parts.saturating_mul(params.iterations_per_part);
	let mut iterations = 0;

	while remaining_msat > 0 {
		iterations += 1;
		if iterations > iteration_budget {
			return Err(RouterError::NoRouteFound {
				err: "Could not allocate the full amount within the search budget".to_owned(),
			});
		}
		if !flow_graph.shortest_path(
			0, target, remaining_msat, params, &mut heap, &mut dist, &mut prev_arc,
		) {
			return Err(RouterError::NoRouteFound {
				err: "No remaining path can carry any part of the amount".to_owned(),
			});
		}

		let mut path = Vec::new();
		let mut v = target;
		while v != 0 {
			let arc_id = prev_arc[v as usize];
			debug_assert!(arc_id != NO_ARC);
			path.push(arc_id);
			v = flow_graph.arcs[arc_id as usize].source;
		}
		path.reverse();
		let bottleneck_msat = flow_graph.fee_adjusted_bottleneck(&path, remaining_msat);
		if bottleneck_msat == 0 {
			return Err(RouterError::NoRouteFound {
				err: "No remaining path can carry any part of the amount once fees are counted"
					.to_owned(),
			});
		}

		for arc_id in path.iter() {
			let arc = &mut flow_graph.arcs[*arc_id as usize];
			arc.flow_msat = arc.flow_msat.saturating_add(bottleneck_msat);
		}
		log_trace!(
			logger,
			"Allocated {} msat along a {}-hop path at distance {}, {} msat remaining",
			bottleneck_msat, path.len(), dist[target as usize],
			remaining_msat - bottleneck_msat
		);

		match segments.iter_mut().find(|(seen, _)| *seen == path) {
			Some((_, amount)) => *amount += bottleneck_msat,
			None => segments.push((path, bottleneck_msat)),
		}
		remaining_msat -= bottleneck_msat;
	}

	let mut flows = Vec::with_capacity(segments.len());
	for (path, delivered_msat) in segments {
		flows.push(materialize_flow(&flow_graph, &path, delivered_msat)?);
	}
	log_debug!(
		logger,
		"Split {} msat from {} to {} into {} flow(s)",
		amount_msat, log_bytes!(payer.as_slice()), log_bytes!(payee.as_slice()), flows.len()
	);
	Ok(flows)
}

/// Turns an arc path into a [`Flow`]: walks it payee-to-payer accumulating the fees each
/// forwarding node charges, and prices the result against the arcs' beliefs.
///
/// Refuses (rather than truncates) a path whose fee-inclusive amount exceeds what some
/// channel's belief says it can carry; callers re-solve against fresh beliefs.
fn materialize_flow(
	flow_graph: &FlowGraph, path: &[u32], delivered_msat: u64,
) -> Result<Flow, RouterError> {
	debug_assert!(!path.is_empty());
	let mut amounts = vec![0u64; path.len()];
	let mut amount_msat = delivered_msat;
	amounts[path.len() - 1] = amount_msat;
	for i in (0..path.len() - 1).rev() {
		// The node forwarding over the next arc charges its fee on what it forwards; the
		// payer's own first hop charges nothing.
		let next_arc = &flow_graph.arcs[path[i + 1] as usize];
		let fee_msat =
			compute_fees(amount_msat, next_arc.fees).ok_or(RouterError::AmountOverflow)?;
		amount_msat = amount_msat.checked_add(fee_msat).ok_or(RouterError::AmountOverflow)?;
		amounts[i] = amount_msat;
	}

	let mut hops = Vec::with_capacity(path.len());
	let mut success_probability = 1.0f64;
	for (arc_id, hop_amount_msat) in path.iter().zip(amounts.iter()) {
		let arc = &flow_graph.arcs[*arc_id as usize];
		if *hop_amount_msat > arc.belief.known_max_msat {
			return Err(RouterError::BeliefInconsistent {
				short_channel_id: arc.short_channel_id,
				attempted_msat: *hop_amount_msat,
			});
		}
		success_probability *= arc.belief.success_probability(*hop_amount_msat);
		hops.push(FlowHop {
			short_channel_id: arc.short_channel_id,
			direction: arc.direction,
			target: flow_graph.nodes[arc.target as usize],
			amount_msat: *hop_amount_msat,
			cltv_expiry_delta: arc.cltv_expiry_delta,
		});
	}
	Ok(Flow { hops, delivered_msat, success_probability })
}
