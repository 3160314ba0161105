//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use const_addrs::ip4;
use holo_pimdm::assert::AssertState;
use holo_pimdm::packet::Packet;
use holo_pimdm::sg::{GraftPruneState, SgPair};

use super::{Network, secs};

//
// Topology:
//
//   (r1 upstream)        (r2 upstream)
//        |                     |
//      eth0                  eth0
//       r1                    r2
//      eth1                  eth1
//    10.0.2.1              10.0.2.2
//        |                     |
//   -----+----------+----------+----- 10.0.2.0/24
//                   |
//                 eth1 10.0.2.3
//                  r3
//                 eth0 (local receiver)
//
// Both r1 and r2 are able to forward the flow onto the shared LAN.
//
pub(super) fn shared_lan(r1_metric: u32, r2_metric: u32) -> (Network, SgPair) {
    let sg = SgPair::new(ip4!("192.168.0.10"), ip4!("239.1.1.1"));
    let mut net = Network::new();
    let r1 = net.add_node("r1");
    let r2 = net.add_node("r2");
    let r3 = net.add_node("r3");
    net.connect(&[(r1, "eth0", "10.0.1.1/24")]);
    net.connect(&[(r2, "eth0", "10.0.3.1/24")]);
    net.connect(&[(r3, "eth0", "10.0.4.1/24")]);
    net.connect(&[
        (r1, "eth1", "10.0.2.1/24"),
        (r2, "eth1", "10.0.2.2/24"),
        (r3, "eth1", "10.0.2.3/24"),
    ]);

    let prefix = "192.168.0.0/24".parse().unwrap();
    net.node(r1)
        .route_add(prefix, "eth0", Some(ip4!("10.0.1.254")), r1_metric);
    net.node(r2)
        .route_add(prefix, "eth0", Some(ip4!("10.0.3.254")), r2_metric);
    net.node(r3)
        .route_add(prefix, "eth1", Some(ip4!("10.0.2.2")), 20);
    net.node(r3).add_local_member("eth0", sg.group).unwrap();

    // Let the routers discover each other.
    net.run_for(secs(10));
    (net, sg)
}

// Floods one data packet from each upstream router, in the given order.
pub(super) fn flood(net: &mut Network, sg: &SgPair, r1_first: bool) {
    let order = if r1_first { [0, 1] } else { [1, 0] };
    for node in order {
        net.send_data(node, "eth0", sg.source, sg.group);
    }
    net.pump();
}

fn check_election(net: &Network, sg: &SgPair, winner: usize, loser: usize) {
    let winner_addr = net
        .instance(winner)
        .interface("eth1")
        .map(|iface| iface.addr())
        .unwrap();

    assert_eq!(net.assert_state(winner, sg, "eth1"), AssertState::Winner);
    assert_eq!(net.assert_state(loser, sg, "eth1"), AssertState::Loser);
    let loser_state = net.sg_state(loser, sg);
    assert_eq!(
        loser_state.downstream["eth1"].assert.winner_addr(),
        Some(winner_addr)
    );

    // The loser stops forwarding onto the LAN and prunes itself.
    assert_eq!(net.upstream_state(loser, sg), GraftPruneState::Pruned);
    assert!(net.entries(loser).is_empty());
    assert!(
        net.entries(winner)
            .iter()
            .all(|entry| entry.ifname == "eth1")
    );
    assert!(!net.entries(winner).is_empty());

    // The downstream router follows the winner.
    assert_eq!(net.sg_state(2, sg).upstream.rpf_nbr, Some(winner_addr));
    assert_eq!(net.upstream_state(2, sg), GraftPruneState::Forwarding);

    net.check_table_invariant();
}

#[test]
fn better_metric_wins_r1_first() {
    let (mut net, sg) = shared_lan(20, 10);
    flood(&mut net, &sg, true);
    check_election(&net, &sg, 1, 0);
}

#[test]
fn better_metric_wins_r2_first() {
    let (mut net, sg) = shared_lan(20, 10);
    flood(&mut net, &sg, false);
    check_election(&net, &sg, 1, 0);
}

#[test]
fn tie_break_r1_first() {
    let (mut net, sg) = shared_lan(10, 10);
    flood(&mut net, &sg, true);
    check_election(&net, &sg, 0, 1);
}

#[test]
fn tie_break_r2_first() {
    let (mut net, sg) = shared_lan(10, 10);
    flood(&mut net, &sg, false);
    check_election(&net, &sg, 0, 1);
}

#[test]
fn winner_refreshes_assert() {
    let (mut net, sg) = shared_lan(10, 10);
    flood(&mut net, &sg, true);
    let is_assert = |packet: &Packet| matches!(packet, Packet::Assert(_));
    let asserts = net.count_sent(0, is_assert);

    // The winner keeps its role across Assert Timer expirations.
    net.run_for(secs(181));
    assert!(net.count_sent(0, is_assert) > asserts);
    check_election(&net, &sg, 0, 1);
}
