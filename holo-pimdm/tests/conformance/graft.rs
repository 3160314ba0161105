//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use const_addrs::ip4;
use holo_pimdm::config::InstanceCfg;
use holo_pimdm::packet::{GroupEntry, JoinPrune, Packet};
use holo_pimdm::sg::{GraftPruneState, SgPair};

use super::prune::lan;
use super::{Network, secs};

fn sg() -> SgPair {
    SgPair::new(ip4!("10.0.1.100"), ip4!("239.1.1.1"))
}

// Builds a two-router chain whose downstream router pruned the flow, then
// makes the upstream router unreachable.
fn pruned_chain(graft_retry_limit: Option<u32>) -> Network {
    let sg = sg();
    let mut net = Network::new();
    let r1 = net.add_node("r1");
    let config = InstanceCfg {
        rng_seed: 2,
        graft_retry_limit,
        ..Default::default()
    };
    let r2 = net.add_node_with_config("r2", config);
    net.connect(&[(r1, "eth0", "10.0.1.1/24")]);
    net.connect(&[(r2, "eth0", "10.0.3.1/24")]);
    net.connect(&[(r1, "eth1", "10.0.2.1/24"), (r2, "eth1", "10.0.2.2/24")]);
    net.node(r2).route_add(
        "10.0.1.0/24".parse().unwrap(),
        "eth1",
        Some(ip4!("10.0.2.1")),
        10,
    );
    net.node(r2).add_local_member("eth0", sg.group).unwrap();
    net.run_for(secs(10));
    net.send_data(r1, "eth0", sg.source, sg.group);

    net.node(r2).remove_local_member("eth0", sg.group).unwrap();
    net.run_for(secs(4));
    assert_eq!(net.upstream_state(r2, &sg), GraftPruneState::Pruned);

    net.isolate(r1);
    net
}

fn grafts_sent(net: &Network) -> Vec<&Packet> {
    net.log
        .iter()
        .filter(|sent| sent.node == "r2")
        .filter(|sent| matches!(sent.packet, Packet::Graft(_)))
        .inspect(|sent| assert_eq!(sent.dst, ip4!("10.0.2.1")))
        .map(|sent| &sent.packet)
        .collect()
}

#[test]
fn graft_retry_bounded() {
    let sg = sg();
    let mut net = pruned_chain(Some(3));

    net.node(1).add_local_member("eth0", sg.group).unwrap();
    assert_eq!(net.upstream_state(1, &sg), GraftPruneState::AckPending);
    net.pump();
    assert_eq!(grafts_sent(&net).len(), 1);

    // Three retransmissions, one every Graft Retry Period.
    net.run_for(secs(9));
    assert_eq!(grafts_sent(&net).len(), 4);
    assert_eq!(net.upstream_state(1, &sg), GraftPruneState::AckPending);
    assert_eq!(net.sg_state(1, &sg).upstream.graft_retries, 3);

    // Give up waiting for the acknowledgement.
    net.run_for(secs(3));
    assert_eq!(net.upstream_state(1, &sg), GraftPruneState::Forwarding);
    assert!(net.sg_state(1, &sg).upstream.graft_retry_timer.is_none());
    assert_eq!(net.entries(1).len(), 1);

    net.run_for(secs(30));
    assert_eq!(grafts_sent(&net).len(), 4);
    net.check_table_invariant();
}

#[test]
fn graft_retry_unbounded() {
    let sg = sg();
    let mut net = pruned_chain(None);

    net.node(1).add_local_member("eth0", sg.group).unwrap();
    net.run_for(secs(30));
    assert_eq!(grafts_sent(&net).len(), 11);
    assert_eq!(net.upstream_state(1, &sg), GraftPruneState::AckPending);
    assert!(net.entries(1).is_empty());
    net.check_table_invariant();
}

#[test]
fn graft_suppressed_without_route() {
    let sg = sg();
    let mut net = pruned_chain(None);

    // Without a route to the source there's nobody to graft to.
    net.node(1).route_del("10.0.1.0/24".parse().unwrap());
    net.node(1).add_local_member("eth0", sg.group).unwrap();
    net.run_for(secs(10));
    assert!(grafts_sent(&net).is_empty());
    assert!(net.sg_state(1, &sg).upstream.graft_suppressed);

    // The Graft goes out as soon as the route comes back.
    net.node(1).route_add(
        "10.0.1.0/24".parse().unwrap(),
        "eth1",
        Some(ip4!("10.0.2.1")),
        10,
    );
    assert_eq!(grafts_sent(&net).len(), 0);
    net.pump();
    assert_eq!(grafts_sent(&net).len(), 1);
    assert_eq!(net.upstream_state(1, &sg), GraftPruneState::AckPending);
    assert!(!net.sg_state(1, &sg).upstream.graft_suppressed);
}

#[test]
fn route_loss_while_forwarding() {
    let sg = sg();
    let mut net = lan(false);
    assert_eq!(net.upstream_state(1, &sg), GraftPruneState::Forwarding);

    // The unicast route towards the source goes away.
    net.node(1).route_del("10.0.1.0/24".parse().unwrap());
    let upstream = &net.sg_state(1, &sg).upstream;
    assert_eq!(upstream.state, GraftPruneState::Pruned);
    assert_eq!(upstream.rpf_iface, None);
    assert_eq!(upstream.rpf_nbr, None);
    assert!(upstream.graft_suppressed);
    assert!(net.entries(1).is_empty());
    net.check_table_invariant();

    // The flow is grafted back as soon as the route returns.
    net.node(1).route_add(
        "10.0.1.0/24".parse().unwrap(),
        "eth1",
        Some(ip4!("10.0.2.1")),
        10,
    );
    net.pump();
    assert_eq!(grafts_sent(&net).len(), 1);
    let upstream = &net.sg_state(1, &sg).upstream;
    assert_eq!(upstream.state, GraftPruneState::Forwarding);
    assert!(!upstream.graft_suppressed);
    let entries = net.entries(1);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].ifname, "eth0");
    net.check_table_invariant();
}

#[test]
fn graft_for_another_router_ignored() {
    let sg = sg();
    let mut net = Network::new();
    let r1 = net.add_node("r1");
    net.connect(&[(r1, "eth1", "10.0.2.1/24")]);
    let graft = |upstream_nbr| {
        Packet::Graft(JoinPrune {
            upstream_nbr,
            holdtime: 0,
            groups: vec![GroupEntry {
                group: sg.group,
                joined: vec![sg.source],
                pruned: vec![],
            }],
        })
    };
    let is_graft_ack = |packet: &Packet| matches!(packet, Packet::GraftAck(_));

    net.inject(r1, "eth1", ip4!("10.0.2.2"), graft(ip4!("10.0.2.3")));
    assert_eq!(net.count_sent(r1, is_graft_ack), 0);
    assert_eq!(net.instance(r1).statistics().discarded_packets, 1);
    assert!(net.instance(r1).sgs.is_empty());

    net.inject(r1, "eth1", ip4!("10.0.2.2"), graft(ip4!("10.0.2.1")));
    assert_eq!(net.count_sent(r1, is_graft_ack), 1);
    assert!(net.instance(r1).sgs.contains_key(&sg));
}
