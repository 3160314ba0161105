//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use const_addrs::ip4;
use holo_pimdm::instance::RouteInputResult;
use holo_pimdm::mrib::MulticastRoute;
use holo_pimdm::packet::{DecodeError, GroupEntry, JoinPrune, Packet};
use holo_pimdm::sg::{GraftPruneState, Origination, SgPair};
use holo_pimdm::tasks::messages::ProtocolInputMsg;
use holo_pimdm::tasks::messages::input::NetRxPacketMsg;

use super::{Network, secs};

const A: [u8; 4] = [10, 0, 0, 1];
const B: [u8; 4] = [10, 0, 0, 2];

fn join(source: [u8; 4], group: [u8; 4]) -> Packet {
    Packet::JoinPrune(JoinPrune {
        upstream_nbr: A.into(),
        holdtime: 210,
        groups: vec![GroupEntry {
            group: group.into(),
            joined: vec![source.into()],
            pruned: vec![],
        }],
    })
}

#[test]
fn basic_origination() {
    let sg = SgPair::new(A.into(), ip4!("239.1.1.1"));
    let mut net = Network::new();
    let a = net.add_node("a");
    net.connect(&[(a, "eth0", "10.0.0.1/24")]);

    // Nobody downstream yet.
    let result = net.node(a).originate(sg.source, sg.group);
    assert_eq!(result, RouteInputResult::Dropped);
    let state = net.sg_state(a, &sg);
    assert_eq!(state.upstream.state, GraftPruneState::Forwarding);
    assert_eq!(state.upstream.origination, Origination::Originator);
    assert!(net.entries(a).is_empty());
    net.check_table_invariant();

    // B asks for the flow.
    net.inject(a, "eth0", B.into(), join(A, [239, 1, 1, 1]));
    assert_eq!(
        net.entries(a),
        [MulticastRoute {
            group: sg.group,
            source: sg.source,
            next_hop: B.into(),
            ifname: "eth0".to_owned(),
        }]
    );
    net.check_table_invariant();

    let result = net.node(a).originate(sg.source, sg.group);
    assert_eq!(
        result,
        RouteInputResult::Forwarded {
            interfaces: vec!["eth0".to_owned()]
        }
    );

    // Only local addresses can originate traffic.
    let result = net.node(a).originate(B.into(), sg.group);
    assert_eq!(result, RouteInputResult::NotHandled);
}

#[test]
fn originated_flow_expires() {
    let sg = SgPair::new(A.into(), ip4!("239.1.1.1"));
    let mut net = Network::new();
    let a = net.add_node("a");
    net.connect(&[(a, "eth0", "10.0.0.1/24")]);
    net.node(a).originate(sg.source, sg.group);
    net.inject(a, "eth0", B.into(), join(A, [239, 1, 1, 1]));
    assert_eq!(net.entries(a).len(), 1);

    // Source Lifetime without any data.
    net.run_for(secs(211));
    let state = net.sg_state(a, &sg);
    assert!(!state.upstream.valid);
    assert_eq!(state.upstream.state, GraftPruneState::NoInfo);
    assert!(net.entries(a).is_empty());

    // New data brings the flow back.
    net.node(a).originate(sg.source, sg.group);
    assert!(net.sg_state(a, &sg).upstream.valid);
    net.check_table_invariant();
}

#[test]
fn join_for_unknown_source() {
    let mut net = Network::new();
    let a = net.add_node("a");
    net.connect(&[(a, "eth0", "10.0.0.1/24")]);

    // No route towards the source: state is created but there's nowhere to
    // forward from.
    net.inject(a, "eth0", B.into(), join([172, 16, 0, 1], [239, 1, 1, 1]));
    let sg = SgPair::new(ip4!("172.16.0.1"), ip4!("239.1.1.1"));
    let state = net.sg_state(a, &sg);
    assert_eq!(state.upstream.rpf_iface, None);
    assert!(net.entries(a).is_empty());
    net.check_table_invariant();
}

#[test]
fn malformed_packet_dropped() {
    let mut net = Network::new();
    let a = net.add_node("a");
    net.connect(&[(a, "eth0", "10.0.0.1/24")]);

    let msg = NetRxPacketMsg {
        ifname: "eth0".to_owned(),
        src: B.into(),
        packet: Err(DecodeError::InvalidChecksum),
    };
    net.node(a)
        .process_protocol_msg(ProtocolInputMsg::NetRxPacket(msg));
    let msg = NetRxPacketMsg {
        ifname: "eth9".to_owned(),
        src: B.into(),
        packet: Ok(join(A, [239, 1, 1, 1])),
    };
    net.node(a)
        .process_protocol_msg(ProtocolInputMsg::NetRxPacket(msg));

    let instance = net.instance(a);
    assert_eq!(instance.statistics().decode_errors, 1);
    assert_eq!(instance.statistics().discarded_packets, 1);
    let iface = instance.interface("eth0").unwrap();
    assert_eq!(iface.state.statistics.bad_packets_rcvd, 1);
    assert!(instance.sgs.is_empty());
}

#[test]
fn origination_floods_to_neighbors() {
    let sg = SgPair::new(A.into(), ip4!("239.1.1.1"));
    let mut net = Network::new();
    let a = net.add_node("a");
    let b = net.add_node("b");
    net.connect(&[(a, "eth0", "10.0.0.1/24"), (b, "eth0", "10.0.0.2/24")]);
    net.run_for(secs(6));

    // Dense mode: known PIM neighbors receive the flow without any Join.
    let result = net.node(a).originate(sg.source, sg.group);
    assert_eq!(
        result,
        RouteInputResult::Forwarded {
            interfaces: vec!["eth0".to_owned()]
        }
    );
    assert_eq!(
        net.entries(a),
        [MulticastRoute {
            group: sg.group,
            source: sg.source,
            next_hop: B.into(),
            ifname: "eth0".to_owned(),
        }]
    );
    net.check_table_invariant();
}
