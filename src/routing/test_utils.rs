// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use crate::routing::gossip::{
	ChannelInfo, ChannelUpdateInfo, NetworkView, NodeId, RoutingFees,
};

use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};

/// Builds the `NodeId` of a deterministic test node. `seed` must be a valid secret key byte,
/// i.e. non-zero.
pub fn node_id(seed: u8) -> NodeId {
	let secp_ctx = Secp256k1::new();
	let secret = SecretKey::from_slice(&[seed; 32]).unwrap();
	NodeId::from_pubkey(&PublicKey::from_secret_key(&secp_ctx, &secret))
}

/// Builds a channel with no directional updates.
pub fn channel(node_one: NodeId, node_two: NodeId, capacity_msat: u64) -> ChannelInfo {
	ChannelInfo { node_one, node_two, capacity_msat, one_to_two: None, two_to_one: None }
}

/// Builds an enabled directional update with the given fees, no HTLC minimum, and no HTLC
/// maximum.
pub fn update(
	fee_base_msat: u32, fee_proportional_millionths: u32, cltv_expiry_delta: u16,
) -> ChannelUpdateInfo {
	ChannelUpdateInfo {
		enabled: true,
		cltv_expiry_delta,
		htlc_minimum_msat: 0,
		htlc_maximum_msat: u64::MAX,
		fees: RoutingFees {
			base_msat: fee_base_msat,
			proportional_millionths: fee_proportional_millionths,
		},
	}
}

/// Adds a zero-fee channel usable in both directions with a 40-block CLTV delta.
pub fn add_dual_channel(
	view: &mut NetworkView, short_channel_id: u64, node_one: NodeId, node_two: NodeId,
	capacity_msat: u64,
) {
	add_dual_channel_with_fees(view, short_channel_id, node_one, node_two, capacity_msat, 0, 0);
}

/// Adds a channel usable in both directions, charging the given fees both ways.
pub fn add_dual_channel_with_fees(
	view: &mut NetworkView, short_channel_id: u64, node_one: NodeId, node_two: NodeId,
	capacity_msat: u64, fee_base_msat: u32, fee_proportional_millionths: u32,
) {
	let mut info = channel(node_one, node_two, capacity_msat);
	info.one_to_two = Some(update(fee_base_msat, fee_proportional_millionths, 40));
	info.two_to_one = Some(update(fee_base_msat, fee_proportional_millionths, 40));
	view.add_channel(short_channel_id, info);
}
