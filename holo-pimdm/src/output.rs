//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use crate::assert::AssertMetric;
use crate::debug::Debug;
use crate::instance::InstanceTx;
use crate::interface::Interface;
use crate::packet::{
    ALL_PIM_ROUTERS, Assert, GroupEntry, JoinPrune, Packet, StateRefresh,
};
use crate::sg::SgPair;
use crate::tasks::messages::output::NetTxPacketMsg;

// ===== global functions =====

pub(crate) fn send_packet(
    iface: &mut Interface,
    tx: &InstanceTx,
    dst: Ipv4Addr,
    packet: Packet,
) {
    Debug::PacketTx(&iface.name, &dst, &packet).log();

    iface.state.statistics.msgs_sent.update(&packet);
    let msg = NetTxPacketMsg {
        ifname: iface.name.clone(),
        dst,
        packet,
    };
    // The receiving end is only gone during shutdown.
    let _ = tx.net.send(msg);
}

pub(crate) fn send_hello(
    iface: &mut Interface,
    tx: &InstanceTx,
    holdtime: u16,
    sr_interval: u8,
) {
    let packet = Packet::Hello(iface.hello(holdtime, sr_interval));
    send_packet(iface, tx, ALL_PIM_ROUTERS, packet);
}

pub(crate) fn send_join_prune(
    iface: &mut Interface,
    tx: &InstanceTx,
    upstream_nbr: Ipv4Addr,
    holdtime: u16,
    groups: Vec<GroupEntry>,
) {
    let packet = Packet::JoinPrune(JoinPrune {
        upstream_nbr,
        holdtime,
        groups,
    });
    send_packet(iface, tx, ALL_PIM_ROUTERS, packet);
}

// Grafts are unicast to the upstream neighbor.
pub(crate) fn send_graft(
    iface: &mut Interface,
    tx: &InstanceTx,
    upstream_nbr: Ipv4Addr,
    groups: Vec<GroupEntry>,
) {
    let packet = Packet::Graft(JoinPrune {
        upstream_nbr,
        holdtime: 0,
        groups,
    });
    send_packet(iface, tx, upstream_nbr, packet);
}

// Graft-Acks echo the acknowledged Graft back to its sender.
pub(crate) fn send_graft_ack(
    iface: &mut Interface,
    tx: &InstanceTx,
    dst: Ipv4Addr,
    graft: JoinPrune,
) {
    send_packet(iface, tx, dst, Packet::GraftAck(graft));
}

pub(crate) fn send_assert(
    iface: &mut Interface,
    tx: &InstanceTx,
    sg: &SgPair,
    metric: &AssertMetric,
) {
    let packet = Packet::Assert(Assert {
        group: sg.group,
        source: sg.source,
        metric_preference: metric.metric_preference,
        metric: metric.route_metric,
    });
    send_packet(iface, tx, ALL_PIM_ROUTERS, packet);
}

pub(crate) fn send_state_refresh(
    iface: &mut Interface,
    tx: &InstanceTx,
    msg: StateRefresh,
) {
    send_packet(iface, tx, ALL_PIM_ROUTERS, Packet::StateRefresh(msg));
}

// Builds a Join/Prune group entry for a single (S,G).
pub(crate) fn group_entry(sg: &SgPair, join: bool) -> GroupEntry {
    let (joined, pruned) = if join {
        (vec![sg.source], vec![])
    } else {
        (vec![], vec![sg.source])
    };
    GroupEntry {
        group: sg.group,
        joined,
        pruned,
    }
}
