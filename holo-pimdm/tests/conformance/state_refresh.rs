//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use const_addrs::ip4;
use holo_pimdm::packet::{Packet, StateRefresh, StateRefreshFlags};
use holo_pimdm::sg::{GraftPruneState, PruneState, SgPair};

use super::{DATA_TTL, Network, secs};

fn sg() -> SgPair {
    SgPair::new(ip4!("10.0.1.100"), ip4!("239.1.1.1"))
}

//
// Topology:
//
//   source 10.0.1.100
//        |
//   eth0 10.0.1.1
//       r1
//   eth1 10.0.2.1
//        |
//   eth1 10.0.2.2
//       r2
//   eth2 10.0.5.1
//        |
//   eth1 10.0.5.2
//       r3
//   eth0 (receiver)
//
fn chain() -> Network {
    let mut net = Network::new();
    let r1 = net.add_node("r1");
    let r2 = net.add_node("r2");
    let r3 = net.add_node("r3");
    net.connect(&[(r1, "eth0", "10.0.1.1/24")]);
    net.connect(&[(r3, "eth0", "10.0.6.1/24")]);
    net.connect(&[(r1, "eth1", "10.0.2.1/24"), (r2, "eth1", "10.0.2.2/24")]);
    net.connect(&[(r2, "eth2", "10.0.5.1/24"), (r3, "eth1", "10.0.5.2/24")]);

    let prefix = "10.0.1.0/24".parse().unwrap();
    net.node(r2)
        .route_add(prefix, "eth1", Some(ip4!("10.0.2.1")), 10);
    net.node(r3)
        .route_add(prefix, "eth1", Some(ip4!("10.0.5.1")), 20);
    net.node(r3).add_local_member("eth0", sg().group).unwrap();

    net.run_for(secs(10));
    net.send_data(r1, "eth0", sg().source, sg().group);
    net
}

fn refreshes_sent(net: &Network, node: &str) -> Vec<StateRefresh> {
    net.log
        .iter()
        .filter(|sent| sent.node == node)
        .filter_map(|sent| match &sent.packet {
            Packet::StateRefresh(msg) => Some(*msg),
            _ => None,
        })
        .collect()
}

#[test]
fn state_refresh_forwarding() {
    let sg = sg();
    let mut net = chain();
    assert_eq!(net.upstream_state(2, &sg), GraftPruneState::Forwarding);

    // First refresh from the originator, relayed hop by hop.
    net.run_for(secs(61));
    let originated = refreshes_sent(&net, "r1");
    assert_eq!(originated.len(), 1);
    assert_eq!(originated[0].ttl, DATA_TTL);
    let relayed = refreshes_sent(&net, "r2");
    assert_eq!(relayed.len(), 1);
    assert_eq!(relayed[0].ttl, DATA_TTL - 1);
    assert_eq!(relayed[0].originator, ip4!("10.0.2.1"));
    assert!(!relayed[0].flags.contains(StateRefreshFlags::PRUNE_INDICATOR));
    assert_eq!(net.sg_state(1, &sg).sr_ttl, Some(DATA_TTL));
    assert_eq!(net.sg_state(2, &sg).sr_ttl, Some(DATA_TTL - 1));

    // A copy arriving over another path is not relayed again.
    let packet = Packet::StateRefresh(originated[0]);
    net.inject(1, "eth1", ip4!("10.0.2.1"), packet);
    assert_eq!(refreshes_sent(&net, "r2").len(), 1);

    // r3 leaves: the next refresh carries the Prune Indicator downstream of
    // r2 only on its pruned interface.
    net.node(2).remove_local_member("eth0", sg.group).unwrap();
    net.run_for(secs(60));
    assert_eq!(
        net.sg_state(1, &sg).downstream["eth2"].prune_state,
        PruneState::Pruned
    );
    assert_eq!(net.upstream_state(1, &sg), GraftPruneState::Pruned);
    let relayed = refreshes_sent(&net, "r2");
    assert_eq!(relayed.len(), 2);
    assert_eq!(relayed[1].ttl, DATA_TTL - 1);
    assert!(relayed[1].flags.contains(StateRefreshFlags::PRUNE_INDICATOR));
    net.check_table_invariant();
}

#[test]
fn source_active_timer_expiry() {
    let sg = sg();
    let mut net = chain();
    net.run_for(secs(61));
    assert!(net.sg_state(1, &sg).upstream.valid);
    assert!(!net.entries(1).is_empty());

    // Neither data nor refreshes arrive anymore.
    net.isolate(0);
    net.run_for(secs(211));
    let state = net.sg_state(1, &sg);
    assert!(!state.upstream.valid);
    assert_eq!(state.upstream.state, GraftPruneState::NoInfo);
    assert_eq!(state.sr_ttl, None);
    assert!(net.entries(1).is_empty());
    net.check_table_invariant();
}
