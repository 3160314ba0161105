//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::time::Duration;

use itertools::Itertools;
use rand::Rng;

use crate::assert::{AssertEvent, AssertMetric, AssertState};
use crate::debug::Debug;
use crate::error::Error;
use crate::instance::{InstanceUpView, RouteInputResult};
use crate::interface::Interfaces;
use crate::neighbor::Neighbor;
use crate::output;
use crate::packet::{
    Assert, DecodeResult, Hello, JoinPrune, Packet, StateRefresh,
    StateRefreshFlags,
};
use crate::rib::UnicastRib;
use crate::sg::{
    GraftPruneState, LocalMembership, Origination, PruneState, SgPair,
    SgTable, SourceGroupState, UpstreamAction, UpstreamEvent,
};
use crate::tasks;
use crate::tasks::messages::input::TimerMsg;
use crate::timer;

// RPF information of a source.
#[derive(Debug, Default)]
struct Rpf {
    iface: Option<String>,
    nbr: Option<Ipv4Addr>,
    originator: bool,
}

// ===== Network packet receipt =====

pub(crate) fn process_packet(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sgs: &mut SgTable,
    ifname: String,
    src: Ipv4Addr,
    packet: DecodeResult<Packet>,
) -> Result<(), Error> {
    // Lookup interface.
    let Some(iface) = interfaces.get_mut(&ifname) else {
        instance.state.statistics.discarded_packets += 1;
        return Err(Error::InterfaceNotFound(ifname));
    };
    if !iface.is_active() {
        instance.state.statistics.discarded_packets += 1;
        return Err(Error::InterfaceInactive(ifname));
    }

    // Check if the packet was decoded successfully.
    let packet = match packet {
        Ok(packet) => packet,
        Err(error) => {
            iface.state.statistics.bad_packets_rcvd += 1;
            instance.state.statistics.decode_errors += 1;
            return Err(Error::PacketDecodeError(ifname, src, error));
        }
    };

    // Ignore packets looped back by the network.
    if src == iface.addr() {
        return Ok(());
    }

    Debug::PacketRx(&ifname, &src, &packet).log();
    iface.state.statistics.msgs_rcvd.update(&packet);

    match packet {
        Packet::Hello(hello) => {
            process_hello(instance, interfaces, sgs, &ifname, src, hello);
        }
        Packet::JoinPrune(msg) => {
            process_join_prune(instance, interfaces, sgs, &ifname, src, msg);
        }
        Packet::Graft(msg) => {
            process_graft(instance, interfaces, sgs, &ifname, src, msg)?;
        }
        Packet::GraftAck(msg) => {
            process_graft_ack(instance, interfaces, sgs, &ifname, src, msg)?;
        }
        Packet::Assert(msg) => {
            process_assert(instance, interfaces, sgs, &ifname, src, msg);
        }
        Packet::StateRefresh(msg) => {
            process_state_refresh(instance, interfaces, sgs, &ifname, src, msg);
        }
    }

    Ok(())
}

fn process_hello(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sgs: &mut SgTable,
    ifname: &str,
    src: Ipv4Addr,
    hello: Hello,
) {
    let Some(iface) = interfaces.get_mut(ifname) else {
        return;
    };
    let holdtime = hello.holdtime.unwrap_or(iface.config.hello_holdtime);

    // A zero holdtime means the neighbor is going away.
    if holdtime == 0 {
        if iface.state.neighbors.contains_key(&src) {
            Debug::NbrGoodbye(ifname, &src).log();
            nbr_remove(instance, interfaces, sgs, ifname, src);
        }
        return;
    }

    // Update or create new neighbor.
    let new_nbr = !iface.state.neighbors.contains_key(&src);
    let nbr = iface.state.neighbors.entry(src).or_insert_with(|| {
        Debug::NbrCreate(ifname, &src).log();
        Neighbor::new(src)
    });
    let restarted =
        nbr.update(ifname, &hello, holdtime, &mut instance.state.sched);
    if restarted {
        Debug::NbrRestart(ifname, &src).log();
    }

    // Let new and restarted neighbors learn about us quickly.
    if new_nbr || restarted {
        iface.triggered_hello_start(
            &mut instance.state.sched,
            &mut instance.state.rng,
        );
    }

    // Forget everything learned from the previous incarnation of the
    // neighbor.
    if restarted {
        for sg_state in sgs.values_mut() {
            let sg = sg_state.sg;
            if let Some(ds) = sg_state.downstream.get_mut(ifname) {
                ds.pruned_nbrs.remove(&src);
                ds.joined_nbrs.remove(&src);
                // The interface was pruned on behalf of this neighbor only.
                if ds.pruned_nbrs.is_empty()
                    && ds.prune_state != PruneState::NoInfo
                {
                    ds.cancel_prune(&sg, ifname, &mut instance.state.sched);
                }
                if ds.assert.winner_addr() == Some(src) {
                    assert_event(
                        instance,
                        interfaces,
                        sg_state,
                        ifname,
                        AssertEvent::WinnerGone,
                    );
                }
            }
            if sg_state.is_rpf_iface(ifname)
                && sg_state.upstream.rpf_nbr == Some(src)
            {
                upstream_event(
                    instance,
                    interfaces,
                    sg_state,
                    UpstreamEvent::RpfNbrRestarted,
                );
            }
        }
    }

    sg_update_all(instance, interfaces, sgs);
}

fn process_join_prune(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sgs: &mut SgTable,
    ifname: &str,
    src: Ipv4Addr,
    msg: JoinPrune,
) {
    let Some(iface) = interfaces.get(ifname) else {
        return;
    };

    // Message addressed to us.
    if msg.upstream_nbr == iface.addr() {
        for group in msg.groups {
            for source in group.joined {
                let sg = SgPair::new(source, group.group);
                downstream_join(instance, interfaces, sgs, ifname, src, sg);
            }
            for source in group.pruned {
                let sg = SgPair::new(source, group.group);
                downstream_prune(
                    instance,
                    interfaces,
                    sgs,
                    ifname,
                    src,
                    sg,
                    msg.holdtime,
                );
            }
        }
        return;
    }

    // Message overheard on a multi-access network, addressed to another
    // router.
    for group in msg.groups {
        let joined = group.joined.iter().map(|source| (source, true));
        let pruned = group.pruned.iter().map(|source| (source, false));
        for (source, join) in joined.chain(pruned) {
            let sg = SgPair::new(*source, group.group);
            let Some(sg_state) = sgs.get_mut(&sg) else {
                continue;
            };
            if !sg_state.upstream.valid
                || !sg_state.is_rpf_iface(ifname)
                || sg_state.upstream.rpf_nbr != Some(msg.upstream_nbr)
            {
                continue;
            }

            let sched = &mut instance.state.sched;
            if join {
                // Another router already overrode the Prune.
                timer::stop(&mut sg_state.upstream.override_timer, sched);
            } else if matches!(
                sg_state.upstream.state,
                GraftPruneState::Forwarding | GraftPruneState::AckPending
            ) {
                // Schedule a Join to override the Prune.
                let max = iface.neighborhood().override_interval.as_millis();
                let delay = Duration::from_millis(
                    instance.state.rng.random_range(0..=max as u64),
                );
                sg_state.upstream.override_start(sg, delay, sched);
            }
        }
    }
}

fn process_graft(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sgs: &mut SgTable,
    ifname: &str,
    src: Ipv4Addr,
    msg: JoinPrune,
) -> Result<(), Error> {
    let Some(iface) = interfaces.get(ifname) else {
        return Ok(());
    };
    if msg.upstream_nbr != iface.addr() {
        instance.state.statistics.discarded_packets += 1;
        return Err(Error::GraftNotForUs(
            ifname.to_owned(),
            src,
            msg.upstream_nbr,
        ));
    }

    for group in &msg.groups {
        for source in &group.joined {
            let sg = SgPair::new(*source, group.group);
            downstream_join(instance, interfaces, sgs, ifname, src, sg);
        }
    }

    // Acknowledge the whole Graft, whatever the outcome for each flow.
    if let Some(iface) = interfaces.get_mut(ifname) {
        output::send_graft_ack(iface, instance.tx, src, msg);
    }

    Ok(())
}

fn process_graft_ack(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sgs: &mut SgTable,
    ifname: &str,
    src: Ipv4Addr,
    msg: JoinPrune,
) -> Result<(), Error> {
    let mut matched = false;
    for group in &msg.groups {
        for source in &group.joined {
            let sg = SgPair::new(*source, group.group);
            let Some(sg_state) = sgs.get_mut(&sg) else {
                continue;
            };
            if !sg_state.is_rpf_iface(ifname)
                || sg_state.upstream.rpf_nbr != Some(src)
            {
                continue;
            }

            matched = true;
            upstream_event(
                instance,
                interfaces,
                sg_state,
                UpstreamEvent::GraftAckRcvd,
            );
            sg_update(instance, interfaces, sgs, sg);
        }
    }

    if !matched {
        return Err(Error::UnexpectedGraftAck(ifname.to_owned(), src));
    }

    Ok(())
}

fn process_assert(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sgs: &mut SgTable,
    ifname: &str,
    src: Ipv4Addr,
    msg: Assert,
) {
    let sg = SgPair::new(msg.source, msg.group);
    let metric = AssertMetric::new(msg.metric_preference, msg.metric, src);
    assert_received(instance, interfaces, sgs, ifname, sg, metric);
}

fn process_state_refresh(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sgs: &mut SgTable,
    ifname: &str,
    src: Ipv4Addr,
    msg: StateRefresh,
) {
    let sg = SgPair::new(msg.source, msg.group);

    // State Refresh messages create state when received from the RPF
    // neighbor.
    if !sgs.get(&sg).is_some_and(|sg_state| sg_state.upstream.valid) {
        let rpf = rpf_lookup(instance.rib, interfaces, sg.source);
        if rpf.iface.as_deref() == Some(ifname) && rpf.nbr == Some(src) {
            sg_activate(instance, interfaces, sgs, sg);
        }
    }

    // State Refresh messages received from any other router are processed
    // as Asserts.
    let Some(sg_state) = sgs.get_mut(&sg) else {
        return;
    };
    if !sg_state.is_rpf_iface(ifname)
        || sg_state.upstream.rpf_nbr != Some(src)
    {
        let metric =
            AssertMetric::new(msg.metric_preference, msg.metric, src);
        assert_received(instance, interfaces, sgs, ifname, sg, metric);
        return;
    }

    // Ignore copies arriving over redundant paths.
    let now = instance.state.sched.now();
    let interval = Duration::from_secs(msg.interval.into());
    if let Some(last) = sg_state.last_state_refresh
        && now < last + interval / 2
    {
        Debug::StateRefreshDuplicate(&sg, &src).log();
        return;
    }
    sg_state.last_state_refresh = Some(now);
    sg_state.sr_ttl = Some(msg.ttl);
    sg_state.upstream.source_active_start(
        sg,
        instance.config.source_lifetime(),
        &mut instance.state.sched,
    );

    let prune_indicator =
        msg.flags.contains(StateRefreshFlags::PRUNE_INDICATOR);
    upstream_event(
        instance,
        interfaces,
        sg_state,
        UpstreamEvent::StateRefreshRcvd { prune_indicator },
    );

    // Propagate the message downstream.
    if msg.ttl > 1 {
        let msg = StateRefresh {
            ttl: msg.ttl - 1,
            flags: StateRefreshFlags::empty(),
            ..msg
        };
        state_refresh_send(instance, interfaces, sg_state, msg, false);
    }

    sg_update(instance, interfaces, sgs, sg);
}

// ===== Multicast data receipt =====

// Processes a multicast data packet. `ifname` is `None` for locally
// originated packets.
pub(crate) fn process_data(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sgs: &mut SgTable,
    ifname: Option<&str>,
    source: Ipv4Addr,
    group: Ipv4Addr,
    ttl: u8,
) -> RouteInputResult {
    let sg = SgPair::new(source, group);

    // RPF check.
    let rpf = rpf_lookup(instance.rib, interfaces, source);
    if ifname != rpf.iface.as_deref() {
        // Data arriving on an outgoing interface means another router is
        // forwarding onto the same network.
        if let Some(ifname) = ifname
            && let Some(sg_state) = sgs.get_mut(&sg)
            && sg_state.upstream.valid
            && instance.state.mrib.get(&sg).is_some_and(|entries| {
                entries.iter().any(|entry| entry.ifname == ifname)
            })
        {
            assert_event(
                instance,
                interfaces,
                sg_state,
                ifname,
                AssertEvent::DataOnOutgoing,
            );
            sg_update(instance, interfaces, sgs, sg);
        }
        return RouteInputResult::Dropped;
    }

    sg_activate(instance, interfaces, sgs, sg);
    let Some(sg_state) = sgs.get_mut(&sg) else {
        return RouteInputResult::Dropped;
    };
    sg_state.data_ttl = Some(ttl);
    sg_state.upstream.source_active_start(
        sg,
        instance.config.source_lifetime(),
        &mut instance.state.sched,
    );
    upstream_event(instance, interfaces, sg_state, UpstreamEvent::DataArrived);
    sg_update(instance, interfaces, sgs, sg);

    if ttl <= 1 {
        return RouteInputResult::Dropped;
    }
    let oifs = instance
        .state
        .mrib
        .get(&sg)
        .into_iter()
        .flatten()
        .map(|entry| entry.ifname.clone())
        .filter(|name| Some(name.as_str()) != ifname)
        .sorted()
        .dedup()
        .collect::<Vec<_>>();
    if oifs.is_empty() {
        return RouteInputResult::Dropped;
    }

    RouteInputResult::Forwarded { interfaces: oifs }
}

// ===== Interface and neighbor events =====

pub(crate) fn process_interface_up(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sgs: &mut SgTable,
    ifname: &str,
) {
    let Some(iface) = interfaces.get_mut(ifname) else {
        return;
    };
    if iface.is_active() {
        return;
    }

    iface.start(
        instance.tx,
        &mut instance.state.sched,
        &mut instance.state.rng,
        instance.config.state_refresh_interval,
    );
    sg_update_all(instance, interfaces, sgs);
}

pub(crate) fn process_interface_down(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sgs: &mut SgTable,
    ifname: &str,
) {
    let Some(iface) = interfaces.get_mut(ifname) else {
        return;
    };
    if !iface.is_active() {
        return;
    }

    let sched = &mut instance.state.sched;
    iface.stop(instance.tx, sched, instance.config.state_refresh_interval);
    for nbr in std::mem::take(&mut iface.state.neighbors).values_mut() {
        nbr.stop(sched);
    }

    let assert_time = iface.config.assert_timeout();
    for sg_state in sgs.values_mut() {
        let sg = sg_state.sg;
        if let Some(ds) = sg_state.downstream.get_mut(ifname) {
            ds.assert.fsm(
                sg,
                ifname,
                AssertEvent::InterfaceDown,
                assert_time,
                sched,
            );
            ds.reset(sched);
        }
    }

    sg_update_all(instance, interfaces, sgs);
}

fn nbr_remove(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sgs: &mut SgTable,
    ifname: &str,
    addr: Ipv4Addr,
) {
    let Some(iface) = interfaces.get_mut(ifname) else {
        return;
    };
    let Some(mut nbr) = iface.state.neighbors.remove(&addr) else {
        return;
    };
    nbr.stop(&mut instance.state.sched);

    for sg_state in sgs.values_mut() {
        let Some(ds) = sg_state.downstream.get_mut(ifname) else {
            continue;
        };
        ds.pruned_nbrs.remove(&addr);
        ds.joined_nbrs.remove(&addr);
        if ds.assert.winner_addr() == Some(addr) {
            assert_event(
                instance,
                interfaces,
                sg_state,
                ifname,
                AssertEvent::WinnerGone,
            );
        }
    }

    sg_update_all(instance, interfaces, sgs);
}

// ===== Downstream Join/Prune =====

fn downstream_join(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sgs: &mut SgTable,
    ifname: &str,
    nbr: Ipv4Addr,
    sg: SgPair,
) {
    sg_activate(instance, interfaces, sgs, sg);
    let Some(sg_state) = sgs.get_mut(&sg) else {
        return;
    };
    if sg_state.is_rpf_iface(ifname) {
        return;
    }

    let ds = sg_state.downstream_mut(ifname);
    ds.pruned_nbrs.remove(&nbr);
    ds.joined_nbrs.insert(nbr);
    ds.cancel_prune(&sg, ifname, &mut instance.state.sched);

    sg_update(instance, interfaces, sgs, sg);
}

fn downstream_prune(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sgs: &mut SgTable,
    ifname: &str,
    nbr: Ipv4Addr,
    sg: SgPair,
    holdtime: u16,
) {
    let Some(sg_state) = sgs.get_mut(&sg) else {
        return;
    };
    if !sg_state.upstream.valid || sg_state.is_rpf_iface(ifname) {
        return;
    }
    let Some(iface) = interfaces.get(ifname) else {
        return;
    };

    let sched = &mut instance.state.sched;
    let ds = sg_state.downstream_mut(ifname);
    ds.joined_nbrs.remove(&nbr);
    ds.pruned_nbrs.insert(nbr);
    let holdtime = Duration::from_secs(holdtime.into());
    ds.prune_timer_start(sg, ifname, holdtime, sched);

    // Wait for other routers to override the Prune before acting on it,
    // unless someone else on the network is known to want the traffic.
    if ds.prune_state == PruneState::NoInfo
        && ds.local_membership == LocalMembership::NoInfo
        && ds.receivers(iface).is_empty()
    {
        let status = iface.neighborhood();
        let max = status.override_interval.as_millis() as u64;
        let delay = status.propagation_delay
            + Duration::from_millis(instance.state.rng.random_range(0..=max));
        ds.prune_pending_timer =
            Some(tasks::prune_pending_timer(sg, ifname, delay, sched));
        ds.set_prune_state(&sg, ifname, PruneState::PrunePending);
    }

    sg_update(instance, interfaces, sgs, sg);
}

// ===== Assert processing =====

fn assert_received(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sgs: &mut SgTable,
    ifname: &str,
    sg: SgPair,
    received: AssertMetric,
) {
    let Some(sg_state) = sgs.get_mut(&sg) else {
        return;
    };
    if !sg_state.upstream.valid {
        return;
    }
    let Some(iface) = interfaces.get(ifname) else {
        return;
    };

    let local = local_metric(instance.rib, interfaces, ifname, sg.source);
    let is_rpf_iface = sg_state.is_rpf_iface(ifname);
    let ds = sg_state.downstream_mut(ifname);
    let event = if received.is_better(&local) {
        // Ignore routers that lose against the current winner.
        if let Some(winner) = ds.assert.winner
            && ds.assert.state == AssertState::Loser
            && winner.addr != received.addr
            && winner.is_better(&received)
        {
            return;
        }
        AssertEvent::RcvPreferred(received)
    } else if is_rpf_iface {
        return;
    } else {
        match ds.assert.state {
            AssertState::Winner => AssertEvent::RcvInferior,
            AssertState::Loser
                if ds.assert.winner_addr() == Some(received.addr) =>
            {
                if ds.could_assert(&sg, iface) {
                    AssertEvent::RcvInferior
                } else {
                    AssertEvent::WinnerGone
                }
            }
            AssertState::NoInfo if ds.could_assert(&sg, iface) => {
                AssertEvent::RcvInferior
            }
            _ => return,
        }
    };

    assert_event(instance, interfaces, sg_state, ifname, event);
    sg_update(instance, interfaces, sgs, sg);
}

// Runs the assert state machine of an interface, sending our own Assert if
// requested.
fn assert_event(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sg_state: &mut SourceGroupState,
    ifname: &str,
    event: AssertEvent,
) {
    let sg = sg_state.sg;
    let metric = local_metric(instance.rib, interfaces, ifname, sg.source);
    let Some(iface) = interfaces.get_mut(ifname) else {
        return;
    };

    let assert_time = iface.config.assert_timeout();
    let ds = sg_state.downstream_mut(ifname);
    let sched = &mut instance.state.sched;
    let send = ds.assert.fsm(sg, ifname, event, assert_time, sched);
    if send && iface.is_active() {
        output::send_assert(iface, instance.tx, &sg, &metric);
    }
}

// Returns the metric advertised by this router in Asserts sent on the given
// interface.
pub(crate) fn local_metric(
    rib: &UnicastRib,
    interfaces: &Interfaces,
    ifname: &str,
    source: Ipv4Addr,
) -> AssertMetric {
    let Some(iface) = interfaces.get(ifname) else {
        return AssertMetric::INFINITE;
    };
    if interfaces.values().any(|iface| iface.addr() == source) {
        return AssertMetric::new(0, 0, iface.addr());
    }
    rib.route_metric(ifname, source, iface.addr())
}

// ===== State Refresh =====

// Sends a State Refresh on every downstream interface that can take it.
// Pruned interfaces get the Prune Indicator set and their Prune Timer reset.
fn state_refresh_send(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sg_state: &mut SourceGroupState,
    template: StateRefresh,
    originate: bool,
) {
    let sg = sg_state.sg;
    let rpf_iface = sg_state.upstream.rpf_iface.clone();
    for (ifname, ds) in sg_state.downstream.iter_mut() {
        if rpf_iface.as_ref() == Some(ifname) {
            continue;
        }
        let metric = local_metric(instance.rib, interfaces, ifname, sg.source);
        let Some(iface) = interfaces.get_mut(ifname) else {
            continue;
        };
        if !iface.is_active()
            || !iface.config.state_refresh_capable
            || iface.state.neighbors.is_empty()
            || ds.assert.state == AssertState::Loser
            || metric.is_infinite()
        {
            continue;
        }

        let mut msg = StateRefresh {
            metric_preference: metric.metric_preference,
            metric: metric.route_metric,
            ..template
        };
        if originate {
            msg.originator = iface.addr();
        }
        if ds.prune_state == PruneState::Pruned {
            msg.flags.insert(StateRefreshFlags::PRUNE_INDICATOR);
            let holdtime =
                Duration::from_secs(iface.config.prune_holdtime.into());
            let sched = &mut instance.state.sched;
            ds.prune_timer_start(sg, ifname, holdtime, sched);
        }
        output::send_state_refresh(iface, instance.tx, msg);
    }
}

// ===== (S,G) state =====

// Creates the (S,G) state, or revives an expired one.
fn sg_activate(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sgs: &mut SgTable,
    sg: SgPair,
) {
    match sgs.get_mut(&sg) {
        Some(sg_state) if sg_state.upstream.valid => return,
        Some(sg_state) => {
            Debug::SgCreate(&sg).log();
            sg_state.upstream.valid = true;
        }
        None => {
            sgs.insert(sg, SourceGroupState::new(sg, interfaces));
        }
    }

    if let Some(sg_state) = sgs.get_mut(&sg) {
        sg_state.upstream.source_active_start(
            sg,
            instance.config.source_lifetime(),
            &mut instance.state.sched,
        );
    }
    sg_update(instance, interfaces, sgs, sg);
}

pub(crate) fn sg_update_all(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sgs: &mut SgTable,
) {
    let keys = sgs.keys().copied().collect::<Vec<_>>();
    for sg in keys {
        sg_update(instance, interfaces, sgs, sg);
    }
}

// Re-evaluates the RPF information and the outgoing interface list of a flow,
// feeding the resulting events to the upstream state machine and updating
// the multicast forwarding table accordingly.
pub(crate) fn sg_update(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sgs: &mut SgTable,
    sg: SgPair,
) {
    let Some(sg_state) = sgs.get_mut(&sg) else {
        return;
    };
    if !sg_state.upstream.valid {
        instance.state.mrib.remove(&sg);
        return;
    }

    // Update RPF information.
    let sched = &mut instance.state.sched;
    let rpf = rpf_lookup(instance.rib, interfaces, sg.source);
    let old_iface = sg_state.upstream.rpf_iface.clone();
    let old_nbr = sg_state.upstream.rpf_nbr;
    if rpf.iface != old_iface {
        if let Some(old_iface) = &old_iface {
            sg_state.downstream_mut(old_iface).assert.reset(sched);
        }
        if let Some(new_iface) = &rpf.iface {
            sg_state.downstream_mut(new_iface).reset(sched);
        }
        sg_state.upstream.rpf_iface = rpf.iface.clone();
    }
    // The assert winner on the RPF interface becomes the RPF neighbor.
    let rpf_nbr = rpf
        .iface
        .as_ref()
        .and_then(|ifname| sg_state.downstream.get(ifname))
        .and_then(|ds| ds.assert.winner_addr())
        .or(rpf.nbr);
    sg_state.upstream.rpf_nbr = rpf_nbr;
    if rpf.iface != old_iface || rpf_nbr != old_nbr {
        Debug::RpfChange(&sg, rpf.iface.as_deref(), rpf_nbr.as_ref()).log();
    }

    if rpf.originator {
        let upstream = &mut sg_state.upstream;
        upstream.origination = Origination::Originator;
        upstream.graft_suppressed = false;
        timer::stop(&mut upstream.graft_retry_timer, sched);
        timer::stop(&mut upstream.override_timer, sched);
        timer::stop(&mut upstream.prune_limit_timer, sched);
        if upstream.state != GraftPruneState::Forwarding {
            Debug::UpstreamTransition(
                &sg,
                &upstream.state,
                &GraftPruneState::Forwarding,
            )
            .log();
            upstream.state = GraftPruneState::Forwarding;
        }
        if upstream.state_refresh_timer.is_none() {
            let interval = instance.config.state_refresh_interval();
            upstream.state_refresh_timer =
                Some(tasks::state_refresh_timer(sg, interval, sched));
        }
    } else {
        sg_state.upstream.origination = Origination::NotOriginator;
        timer::stop(&mut sg_state.upstream.state_refresh_timer, sched);

        if rpf_nbr != old_nbr {
            upstream_event(
                instance,
                interfaces,
                sg_state,
                UpstreamEvent::RpfNbrChanged,
            );
        }
        if sg_state.upstream.graft_suppressed && rpf_nbr.is_some() {
            upstream_event(
                instance,
                interfaces,
                sg_state,
                UpstreamEvent::RouteAvailable,
            );
        }
        let event = if sg_state.olist_is_null(interfaces) {
            UpstreamEvent::OlistNull
        } else {
            UpstreamEvent::OlistNonNull
        };
        upstream_event(instance, interfaces, sg_state, event);
    }

    // Update the multicast forwarding table. Without an RPF interface every
    // interface would look like a downstream one.
    if sg_state.upstream.state == GraftPruneState::Forwarding
        && (rpf.originator || rpf.iface.is_some())
    {
        instance.state.mrib.update(&sg, sg_state.branches(interfaces));
    } else {
        instance.state.mrib.remove(&sg);
    }
    debug_assert!(
        !instance.state.mrib.contains(&sg)
            || sg_state.upstream.state == GraftPruneState::Forwarding,
        "multicast route installed for {sg} while not forwarding"
    );
}

// Runs the upstream state machine, sending whatever message it requests.
fn upstream_event(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sg_state: &mut SourceGroupState,
    event: UpstreamEvent,
) {
    // Originators always forward.
    if sg_state.is_originator() {
        return;
    }

    let olist_null = sg_state.olist_is_null(interfaces);
    let graft_retry = sg_state
        .upstream
        .rpf_iface
        .as_ref()
        .and_then(|ifname| interfaces.get(ifname))
        .map(|iface| iface.config.graft_retry_period())
        .unwrap_or_else(|| {
            instance.config.interface_defaults.graft_retry_period()
        });
    let Some(action) = sg_state.upstream.fsm(
        sg_state.sg,
        event,
        olist_null,
        graft_retry,
        instance,
    ) else {
        return;
    };

    let sg = sg_state.sg;
    let (Some(ifname), Some(nbr)) =
        (&sg_state.upstream.rpf_iface, sg_state.upstream.rpf_nbr)
    else {
        return;
    };
    let Some(iface) = interfaces.get_mut(ifname) else {
        return;
    };
    if !iface.is_active() {
        return;
    }

    let holdtime = iface.config.prune_holdtime;
    match action {
        UpstreamAction::SendPrune => {
            let groups = vec![output::group_entry(&sg, false)];
            output::send_join_prune(iface, instance.tx, nbr, holdtime, groups);
        }
        UpstreamAction::SendJoin => {
            let groups = vec![output::group_entry(&sg, true)];
            output::send_join_prune(iface, instance.tx, nbr, holdtime, groups);
        }
        UpstreamAction::SendGraft => {
            let groups = vec![output::group_entry(&sg, true)];
            output::send_graft(iface, instance.tx, nbr, groups);
        }
    }
}

// Looks up the RPF interface and neighbor of a source.
//
// Sources attached to a local interface or to a directly connected network
// are originated by this router.
fn rpf_lookup(
    rib: &UnicastRib,
    interfaces: &Interfaces,
    source: Ipv4Addr,
) -> Rpf {
    if interfaces.values().any(|iface| iface.addr() == source) {
        return Rpf {
            iface: None,
            nbr: None,
            originator: true,
        };
    }

    match rib.lookup(source) {
        Some(route) => Rpf {
            iface: Some(route.ifname.clone()),
            nbr: route.nexthop,
            originator: route.nexthop.is_none(),
        },
        None => Rpf::default(),
    }
}

// ===== Timer expiration =====

pub(crate) fn process_timer(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sgs: &mut SgTable,
    id: u64,
    msg: TimerMsg,
) {
    match msg {
        TimerMsg::HelloInterval { ifname } => {
            let Some(iface) = interfaces.get_mut(&ifname) else {
                return;
            };
            if !timer::expired(&mut iface.state.hello_interval_task, id) {
                return;
            }
            let holdtime = iface.config.hello_holdtime;
            let sr_interval = instance.config.state_refresh_interval;
            output::send_hello(iface, instance.tx, holdtime, sr_interval);
            iface.hello_interval_start(&mut instance.state.sched);
        }
        TimerMsg::TriggeredHello { ifname } => {
            let Some(iface) = interfaces.get_mut(&ifname) else {
                return;
            };
            if !timer::expired(&mut iface.state.triggered_hello_task, id) {
                return;
            }
            let holdtime = iface.config.hello_holdtime;
            let sr_interval = instance.config.state_refresh_interval;
            output::send_hello(iface, instance.tx, holdtime, sr_interval);
        }
        TimerMsg::NbrTimeout { ifname, addr } => {
            let Some(nbr) = interfaces
                .get_mut(&ifname)
                .and_then(|iface| iface.state.neighbors.get_mut(&addr))
            else {
                return;
            };
            if !timer::expired(&mut nbr.liveness_timer, id) {
                return;
            }
            Debug::NbrTimeout(&ifname, &addr).log();
            nbr_remove(instance, interfaces, sgs, &ifname, addr);
        }
        TimerMsg::AssertTimer { sg, ifname } => {
            let Some(sg_state) = sgs.get_mut(&sg) else {
                return;
            };
            let Some(ds) = sg_state.downstream.get_mut(&ifname) else {
                return;
            };
            if !timer::expired(&mut ds.assert.timer, id) {
                return;
            }
            let could_assert = interfaces
                .get(&ifname)
                .is_some_and(|iface| ds.could_assert(&sg, iface));
            let event = if could_assert {
                AssertEvent::TimerExpired
            } else {
                AssertEvent::CouldAssertLost
            };
            assert_event(instance, interfaces, sg_state, &ifname, event);
            sg_update(instance, interfaces, sgs, sg);
        }
        TimerMsg::PrunePending { sg, ifname } => {
            process_prune_pending_timer(
                instance, interfaces, sgs, id, sg, &ifname,
            );
        }
        TimerMsg::PruneTimer { sg, ifname } => {
            let Some(sg_state) = sgs.get_mut(&sg) else {
                return;
            };
            let Some(ds) = sg_state.downstream.get_mut(&ifname) else {
                return;
            };
            if !timer::expired(&mut ds.prune_timer, id) {
                return;
            }
            let sched = &mut instance.state.sched;
            timer::stop(&mut ds.prune_pending_timer, sched);
            ds.pruned_nbrs.clear();
            ds.set_prune_state(&sg, &ifname, PruneState::NoInfo);
            sg_update(instance, interfaces, sgs, sg);
        }
        TimerMsg::DownstreamPruneLimit { sg, ifname } => {
            if let Some(ds) = sgs
                .get_mut(&sg)
                .and_then(|sg_state| sg_state.downstream.get_mut(&ifname))
            {
                timer::expired(&mut ds.prune_limit_timer, id);
            }
        }
        TimerMsg::GraftRetry { sg } => {
            let Some(sg_state) = sgs.get_mut(&sg) else {
                return;
            };
            if !timer::expired(&mut sg_state.upstream.graft_retry_timer, id) {
                return;
            }
            upstream_event(
                instance,
                interfaces,
                sg_state,
                UpstreamEvent::GraftRetryExpired,
            );
            sg_update(instance, interfaces, sgs, sg);
        }
        TimerMsg::Override { sg } => {
            let Some(sg_state) = sgs.get_mut(&sg) else {
                return;
            };
            if !timer::expired(&mut sg_state.upstream.override_timer, id) {
                return;
            }
            upstream_event(
                instance,
                interfaces,
                sg_state,
                UpstreamEvent::OverrideExpired,
            );
        }
        TimerMsg::UpstreamPruneLimit { sg } => {
            if let Some(sg_state) = sgs.get_mut(&sg) {
                timer::expired(&mut sg_state.upstream.prune_limit_timer, id);
            }
        }
        TimerMsg::SourceActive { sg } => {
            process_source_active_timer(instance, sgs, id, sg);
        }
        TimerMsg::StateRefresh { sg } => {
            let Some(sg_state) = sgs.get_mut(&sg) else {
                return;
            };
            let upstream = &mut sg_state.upstream;
            if !timer::expired(&mut upstream.state_refresh_timer, id)
                || upstream.origination != Origination::Originator
            {
                return;
            }

            if let Some(ttl) = sg_state.data_ttl {
                let msg = StateRefresh {
                    group: sg.group,
                    source: sg.source,
                    originator: Ipv4Addr::UNSPECIFIED,
                    metric_preference: 0,
                    metric: 0,
                    masklen: 32,
                    ttl,
                    flags: StateRefreshFlags::empty(),
                    interval: instance.config.state_refresh_interval,
                };
                state_refresh_send(instance, interfaces, sg_state, msg, true);
            }

            let interval = instance.config.state_refresh_interval();
            sg_state.upstream.state_refresh_timer = Some(
                tasks::state_refresh_timer(
                    sg,
                    interval,
                    &mut instance.state.sched,
                ),
            );
        }
    }
}

fn process_prune_pending_timer(
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Interfaces,
    sgs: &mut SgTable,
    id: u64,
    sg: SgPair,
    ifname: &str,
) {
    let Some(sg_state) = sgs.get_mut(&sg) else {
        return;
    };
    let Some(ds) = sg_state.downstream.get_mut(ifname) else {
        return;
    };
    if !timer::expired(&mut ds.prune_pending_timer, id) {
        return;
    }
    ds.set_prune_state(&sg, ifname, PruneState::Pruned);

    // Echo the Prune so that downstream routers that missed the original
    // one get a chance to override it.
    if let Some(iface) = interfaces.get_mut(ifname)
        && iface.state.neighbors.len() > 1
        && ds.prune_limit_timer.is_none()
    {
        let addr = iface.addr();
        let holdtime = iface.config.prune_holdtime;
        let groups = vec![output::group_entry(&sg, false)];
        output::send_join_prune(iface, instance.tx, addr, holdtime, groups);
        ds.prune_limit_timer = Some(tasks::downstream_prune_limit_timer(
            sg,
            ifname,
            instance.config.prune_limit(),
            &mut instance.state.sched,
        ));
    }

    sg_update(instance, interfaces, sgs, sg);
}

fn process_source_active_timer(
    instance: &mut InstanceUpView<'_>,
    sgs: &mut SgTable,
    id: u64,
    sg: SgPair,
) {
    let Some(sg_state) = sgs.get_mut(&sg) else {
        return;
    };
    let sched = &mut instance.state.sched;
    if !timer::expired(&mut sg_state.upstream.source_active_timer, id) {
        return;
    }

    // Keep the state while a Join is about to be sent.
    if sg_state.upstream.override_timer.is_some() {
        sg_state.upstream.source_active_start(
            sg,
            instance.config.source_lifetime(),
            sched,
        );
        return;
    }

    Debug::SgExpire(&sg).log();
    sg_state.stop_timers(sched);
    let upstream = &mut sg_state.upstream;
    upstream.state = GraftPruneState::NoInfo;
    upstream.origination = Origination::NotOriginator;
    upstream.valid = false;
    upstream.rpf_iface = None;
    upstream.rpf_nbr = None;
    upstream.graft_retries = 0;
    upstream.graft_suppressed = false;
    sg_state.data_ttl = None;
    sg_state.sr_ttl = None;
    sg_state.last_state_refresh = None;
    instance.state.mrib.remove(&sg);
}
