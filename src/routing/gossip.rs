// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The network graph as the router sees it: an immutable snapshot of channels and their
//! advertised per-direction parameters, plus an overlay for channels only the local node
//! knows about.

use bitcoin::secp256k1::PublicKey;

use crate::prelude::*;
use crate::util::indexed_map::IndexedMap;

use core::fmt;

/// Represents the compressed public key of a node
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId([u8; 33]);

impl NodeId {
	/// Create a new NodeId from a public key
	pub fn from_pubkey(pubkey: &PublicKey) -> Self {
		NodeId(pubkey.serialize())
	}

	/// Get the public key slice from this NodeId
	pub fn as_slice(&self) -> &[u8] {
		&self.0
	}
}

impl fmt::Debug for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "NodeId({})", crate::util::logger::DebugBytes(&self.0))
	}
}
impl fmt::Display for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", crate::util::logger::DebugBytes(&self.0))
	}
}

/// The direction a payment traverses a channel in.
///
/// Channels are announced once with an ordered `(node_one, node_two)` pair; each direction
/// carries its own forwarding parameters and its own liquidity belief.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
	/// The payment flows from `node_one` to `node_two`.
	OneToTwo,
	/// The payment flows from `node_two` to `node_one`.
	TwoToOne,
}

/// Fees for routing via a given channel or a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RoutingFees {
	/// Flat routing fee in millisatoshis.
	pub base_msat: u32,
	/// Liquidity-based routing fee in millionths of a routed amount.
	pub proportional_millionths: u32,
}

/// Details about one direction of a channel as received within a channel update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelUpdateInfo {
	/// Whether the channel can be currently used for payments in this direction.
	pub enabled: bool,
	/// The difference in CLTV values that you must have when routing through this channel.
	pub cltv_expiry_delta: u16,
	/// The minimum value, which must be relayed to the next hop via the channel
	pub htlc_minimum_msat: u64,
	/// The maximum value which may be relayed to the next hop via the channel.
	pub htlc_maximum_msat: u64,
	/// Fees charged when the channel is used for routing
	pub fees: RoutingFees,
}

/// Details about a channel (both directions).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelInfo {
	/// Source node of the first direction of a channel
	pub node_one: NodeId,
	/// Source node of the second direction of a channel
	pub node_two: NodeId,
	/// The channel capacity, in millisatoshis.
	pub capacity_msat: u64,
	/// Details about the first direction of a channel
	pub one_to_two: Option<ChannelUpdateInfo>,
	/// Details about the second direction of a channel
	pub two_to_one: Option<ChannelUpdateInfo>,
}

impl ChannelInfo {
	/// Returns a [`DirectedChannelInfo`] for the channel directed from the given `source`, if
	/// `source` is one of the channel's endpoints and an update for that direction exists.
	pub fn as_directed_from(&self, source: &NodeId) -> Option<DirectedChannelInfo> {
		let (direction, update) = if source == &self.node_one {
			(Direction::OneToTwo, self.one_to_two.as_ref()?)
		} else if source == &self.node_two {
			(Direction::TwoToOne, self.two_to_one.as_ref()?)
		} else {
			return None;
		};
		Some(DirectedChannelInfo { channel: self, update, direction })
	}
}

/// A channel descriptor for a hop along a route, fixed to one of its two directions.
#[derive(Clone, Copy)]
pub struct DirectedChannelInfo<'a> {
	channel: &'a ChannelInfo,
	update: &'a ChannelUpdateInfo,
	direction: Direction,
}

impl<'a> DirectedChannelInfo<'a> {
	/// Returns information for the channel.
	pub fn channel(&self) -> &'a ChannelInfo {
		self.channel
	}

	/// Returns the direction this view covers.
	pub fn direction(&self) -> Direction {
		self.direction
	}

	/// Returns the node the payment enters the channel from.
	pub fn source(&self) -> &'a NodeId {
		match self.direction {
			Direction::OneToTwo => &self.channel.node_one,
			Direction::TwoToOne => &self.channel.node_two,
		}
	}

	/// Returns the node the payment exits the channel towards.
	pub fn target(&self) -> &'a NodeId {
		match self.direction {
			Direction::OneToTwo => &self.channel.node_two,
			Direction::TwoToOne => &self.channel.node_one,
		}
	}

	/// Returns the channel capacity, in millisatoshis.
	pub fn capacity_msat(&self) -> u64 {
		self.channel.capacity_msat
	}

	/// Returns whether forwarding in this direction is currently enabled.
	pub fn enabled(&self) -> bool {
		self.update.enabled
	}

	/// Returns the CLTV delta this hop requires.
	pub fn cltv_expiry_delta(&self) -> u16 {
		self.update.cltv_expiry_delta
	}

	/// Returns the minimum HTLC value this direction will forward.
	pub fn htlc_minimum_msat(&self) -> u64 {
		self.update.htlc_minimum_msat
	}

	/// Returns the maximum HTLC value this direction will forward.
	pub fn htlc_maximum_msat(&self) -> u64 {
		self.update.htlc_maximum_msat
	}

	/// Returns the fees this direction charges for forwarding.
	pub fn fees(&self) -> RoutingFees {
		self.update.fees
	}
}

impl<'a> fmt::Debug for DirectedChannelInfo<'a> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DirectedChannelInfo")
			.field("source", self.source())
			.field("target", self.target())
			.field("capacity_msat", &self.channel.capacity_msat)
			.finish()
	}
}

/// A read-only view of channels, as consumed by the flow solver.
///
/// Implementations must be stable for the duration of a solve: repeated lookups of the same
/// channel return identical data, and [`for_each_channel_from`] enumerates channels in a
/// deterministic order.
///
/// [`for_each_channel_from`]: Self::for_each_channel_from
pub trait ChannelLookup {
	/// Fetches the channel with the given short channel id, if it is known.
	fn channel(&self, short_channel_id: u64) -> Option<&ChannelInfo>;

	/// Calls `f` once per channel which has `node` as an endpoint, in a deterministic order.
	fn for_each_channel_from<F: FnMut(u64, &ChannelInfo)>(&self, node: &NodeId, f: F);
}

/// An immutable snapshot of the public channel graph.
///
/// Built by whatever gossip machinery the caller runs; the router only reads it. Channels are
/// keyed by short channel id and adjacency lists are kept sorted so enumeration order never
/// depends on insertion order.
#[derive(Clone, Debug, Default)]
pub struct NetworkView {
	channels: IndexedMap<u64, ChannelInfo>,
	adjacency: HashMap<NodeId, Vec<u64>>,
}

impl NetworkView {
	/// Constructs an empty view.
	pub fn new() -> Self {
		NetworkView { channels: IndexedMap::new(), adjacency: new_hash_map() }
	}

	/// Adds a channel to the view, replacing any existing channel with the same short channel
	/// id.
	pub fn add_channel(&mut self, short_channel_id: u64, info: ChannelInfo) {
		if let Some(old) = self.channels.remove(&short_channel_id) {
			self.unlink(&old.node_one, short_channel_id);
			self.unlink(&old.node_two, short_channel_id);
		}
		self.link(info.node_one, short_channel_id);
		self.link(info.node_two, short_channel_id);
		self.channels.insert(short_channel_id, info);
	}

	/// Removes a channel from the view, if present.
	pub fn remove_channel(&mut self, short_channel_id: u64) {
		if let Some(old) = self.channels.remove(&short_channel_id) {
			self.unlink(&old.node_one, short_channel_id);
			self.unlink(&old.node_two, short_channel_id);
		}
	}

	/// Returns the number of channels in the view.
	pub fn channel_count(&self) -> usize {
		self.channels.len()
	}

	fn link(&mut self, node: NodeId, short_channel_id: u64) {
		let scids = self.adjacency.entry(node).or_insert_with(Vec::new);
		if let Err(pos) = scids.binary_search(&short_channel_id) {
			scids.insert(pos, short_channel_id);
		}
	}

	fn unlink(&mut self, node: &NodeId, short_channel_id: u64) {
		if let Some(scids) = self.adjacency.get_mut(node) {
			if let Ok(pos) = scids.binary_search(&short_channel_id) {
				scids.remove(pos);
			}
			if scids.is_empty() {
				self.adjacency.remove(node);
			}
		}
	}
}

impl ChannelLookup for NetworkView {
	fn channel(&self, short_channel_id: u64) -> Option<&ChannelInfo> {
		self.channels.get(&short_channel_id)
	}

	fn for_each_channel_from<F: FnMut(u64, &ChannelInfo)>(&self, node: &NodeId, mut f: F) {
		if let Some(scids) = self.adjacency.get(node) {
			for scid in scids.iter() {
				debug_assert!(self.channels.contains_key(scid));
				if let Some(info) = self.channels.get(scid) {
					f(*scid, info);
				}
			}
		}
	}
}

/// A [`ChannelLookup`] layering local-only channels over a base snapshot.
///
/// Channels our own node participates in are not (or not yet) visible in public gossip but
/// must be routable. A local entry with the same short channel id as a base entry shadows it,
/// so the local node's fresher view of its own channels wins.
pub struct OverlaidNetworkView<'a, G: ChannelLookup> {
	base: &'a G,
	local: &'a NetworkView,
}

impl<'a, G: ChannelLookup> OverlaidNetworkView<'a, G> {
	/// Overlays `local` channels on top of `base`.
	pub fn new(base: &'a G, local: &'a NetworkView) -> Self {
		OverlaidNetworkView { base, local }
	}
}

impl<'a, G: ChannelLookup> ChannelLookup for OverlaidNetworkView<'a, G> {
	fn channel(&self, short_channel_id: u64) -> Option<&ChannelInfo> {
		self.local.channel(short_channel_id).or_else(|| self.base.channel(short_channel_id))
	}

	fn for_each_channel_from<F: FnMut(u64, &ChannelInfo)>(&self, node: &NodeId, mut f: F) {
		self.local.for_each_channel_from(node, &mut f);
		self.base.for_each_channel_from(node, |scid, info| {
			if self.local.channel(scid).is_none() {
				f(scid, info);
			}
		});
	}
}
