//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::time::Duration;

use ipnetwork::Ipv4Network;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::assert::AssertMetric;
use crate::config::InstanceCfg;
use crate::debug::Debug;
use crate::error::Error;
use crate::events;
use crate::interface::{Interface, Interfaces};
use crate::mrib::{MulticastRoute, RoutingMulticastTable};
use crate::neighbor::Neighbor;
use crate::rib::{UnicastRib, UnicastRoute};
use crate::sg::{
    DownstreamState, LocalMembership, SgPair, SgTable, SourceGroupState,
};
use crate::tasks::messages::ProtocolInputMsg;
use crate::tasks::messages::input::TimerMsg;
use crate::tasks::messages::output::NetTxPacketMsg;
use crate::timer::Scheduler;

// TTL of locally originated multicast data.
pub const ORIGINATE_TTL: u8 = 64;

#[derive(Debug)]
pub struct Instance {
    // Instance name.
    pub name: String,
    // Instance configuration data.
    pub config: InstanceCfg,
    // Instance state data.
    pub state: InstanceState,
    // Instance interfaces.
    pub interfaces: Interfaces,
    // Per-flow state.
    pub sgs: SgTable,
    // Unicast routing table used for RPF checks.
    pub rib: UnicastRib,
    // Instance Tx channels.
    pub tx: InstanceTx,
}

#[derive(Debug)]
pub struct InstanceState {
    // Multicast forwarding table.
    pub mrib: RoutingMulticastTable,
    // Protocol timers.
    pub sched: Scheduler<TimerMsg>,
    // Random source for generation IDs and randomized timers.
    pub rng: StdRng,
    // Error statistics.
    pub statistics: ErrorStatistics,
}

#[derive(Debug, Default)]
#[derive(Deserialize, Serialize)]
pub struct ErrorStatistics {
    pub decode_errors: u32,
    pub discarded_packets: u32,
}

#[derive(Clone, Debug)]
pub struct InstanceTx {
    pub net: UnboundedSender<NetTxPacketMsg>,
}

pub struct InstanceUpView<'a> {
    pub name: &'a str,
    pub config: &'a InstanceCfg,
    pub rib: &'a UnicastRib,
    pub state: &'a mut InstanceState,
    pub tx: &'a InstanceTx,
}

// Outcome of a multicast data packet submitted to the instance.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum RouteInputResult {
    // Not a multicast packet, or received on an unknown interface.
    NotHandled,
    // Accepted but not forwarded anywhere.
    Dropped,
    // Forwarded out of the listed interfaces.
    Forwarded { interfaces: Vec<String> },
}

// Entry points used by the forwarding plane.
pub trait RouteInput {
    fn route_input(
        &mut self,
        ifname: &str,
        source: Ipv4Addr,
        group: Ipv4Addr,
        ttl: u8,
    ) -> RouteInputResult;

    fn notify_interface_up(&mut self, ifname: &str);

    fn notify_interface_down(&mut self, ifname: &str);
}

// ===== impl Instance =====

impl Instance {
    pub fn new(
        name: &str,
        config: InstanceCfg,
        net_tx: UnboundedSender<NetTxPacketMsg>,
    ) -> Instance {
        Debug::InstanceStart(name).log();

        let rng = StdRng::seed_from_u64(config.rng_seed);
        Instance {
            name: name.to_owned(),
            config,
            state: InstanceState {
                mrib: Default::default(),
                sched: Scheduler::new(),
                rng,
                statistics: Default::default(),
            },
            interfaces: Default::default(),
            sgs: Default::default(),
            rib: Default::default(),
            tx: InstanceTx { net: net_tx },
        }
    }

    // Adds an interface and brings it up. The attached network is installed
    // in the unicast routing table as a connected route.
    pub fn add_interface(&mut self, ifname: &str, addr: Ipv4Network) {
        if self.interfaces.contains_key(ifname) {
            return;
        }

        let config = self.config.interface(ifname).clone();
        let iface = Interface::new(ifname, config, addr);
        self.interfaces.insert(ifname.to_owned(), iface);
        self.rib
            .add(addr, UnicastRoute::new(ifname.to_owned(), None, 0, 0));
        for sg_state in self.sgs.values_mut() {
            sg_state
                .downstream
                .insert(ifname.to_owned(), DownstreamState::default());
        }

        self.notify_interface_up(ifname);
    }

    // Signals that a local receiver joined the group on the interface.
    pub fn add_local_member(
        &mut self,
        ifname: &str,
        group: Ipv4Addr,
    ) -> Result<(), Error> {
        self.local_membership_update(ifname, group, LocalMembership::Include)
    }

    // Signals that the last local receiver left the group on the interface.
    pub fn remove_local_member(
        &mut self,
        ifname: &str,
        group: Ipv4Addr,
    ) -> Result<(), Error> {
        self.local_membership_update(ifname, group, LocalMembership::NoInfo)
    }

    fn local_membership_update(
        &mut self,
        ifname: &str,
        group: Ipv4Addr,
        membership: LocalMembership,
    ) -> Result<(), Error> {
        let Some(iface) = self.interfaces.get_mut(ifname) else {
            return Err(Error::InterfaceNotFound(ifname.to_owned()));
        };
        match membership {
            LocalMembership::Include => iface.state.local_members.insert(group),
            LocalMembership::NoInfo => iface.state.local_members.remove(&group),
        };

        let sgs = self
            .sgs
            .values_mut()
            .filter(|sg_state| sg_state.sg.group == group)
            .map(|sg_state| {
                sg_state.downstream_mut(ifname).local_membership = membership;
                sg_state.sg
            })
            .collect::<Vec<_>>();

        let (mut instance, interfaces, sgs_table) = self.as_up();
        for sg in sgs {
            events::sg_update(&mut instance, interfaces, sgs_table, sg);
        }
        Ok(())
    }

    // Installs a unicast route and re-evaluates the RPF information of all
    // flows.
    pub fn route_add(
        &mut self,
        prefix: Ipv4Network,
        ifname: &str,
        nexthop: Option<Ipv4Addr>,
        metric: u32,
    ) {
        let route = UnicastRoute::new(
            ifname.to_owned(),
            nexthop,
            metric,
            self.config.metric_preference,
        );
        self.rib.add(prefix, route);

        let (mut instance, interfaces, sgs) = self.as_up();
        events::sg_update_all(&mut instance, interfaces, sgs);
    }

    // Removes a unicast route and re-evaluates the RPF information of all
    // flows.
    pub fn route_del(&mut self, prefix: Ipv4Network) {
        if self.rib.remove(&prefix).is_none() {
            return;
        }

        let (mut instance, interfaces, sgs) = self.as_up();
        events::sg_update_all(&mut instance, interfaces, sgs);
    }

    // Originates a multicast data packet from one of the local addresses.
    pub fn originate(
        &mut self,
        source: Ipv4Addr,
        group: Ipv4Addr,
    ) -> RouteInputResult {
        if !group.is_multicast()
            || !self.interfaces.values().any(|iface| iface.addr() == source)
        {
            return RouteInputResult::NotHandled;
        }

        let (mut instance, interfaces, sgs) = self.as_up();
        events::process_data(
            &mut instance,
            interfaces,
            sgs,
            None,
            source,
            group,
            ORIGINATE_TTL,
        )
    }

    // Processes a PIM-DM control packet or a multicast data packet.
    pub fn process_protocol_msg(&mut self, msg: ProtocolInputMsg) {
        let result = match msg {
            // Received network packet.
            ProtocolInputMsg::NetRxPacket(msg) => {
                let (mut instance, interfaces, sgs) = self.as_up();
                events::process_packet(
                    &mut instance,
                    interfaces,
                    sgs,
                    msg.ifname,
                    msg.src,
                    msg.packet,
                )
            }
            // Received multicast data packet.
            ProtocolInputMsg::DataRx(msg) => {
                self.route_input(&msg.ifname, msg.source, msg.group, msg.ttl);
                Ok(())
            }
        };

        if let Err(error) = result {
            error.log();
        }
    }

    // Processes a multicast data packet received on the given interface.
    pub fn process_data_packet(
        &mut self,
        ifname: &str,
        source: Ipv4Addr,
        group: Ipv4Addr,
        ttl: u8,
    ) -> RouteInputResult {
        self.route_input(ifname, source, group, ttl)
    }

    // Runs all timers expiring up to the given time.
    pub fn advance_to(&mut self, time: Duration) {
        while let Some((id, msg)) = self.state.sched.pop_expired(time) {
            let (mut instance, interfaces, sgs) = self.as_up();
            events::process_timer(&mut instance, interfaces, sgs, id, msg);
        }
        self.state.sched.advance(time);
    }

    pub fn advance(&mut self, duration: Duration) {
        self.advance_to(self.now() + duration);
    }

    pub fn now(&self) -> Duration {
        self.state.sched.now()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.state.sched.next_deadline()
    }

    // Returns a snapshot of the multicast forwarding table.
    pub fn routing_table_entries(&self) -> Vec<MulticastRoute> {
        self.state.mrib.entries()
    }

    // Returns the metric this router would advertise in an Assert sent on
    // the given interface.
    pub fn route_metric(&self, ifname: &str, source: Ipv4Addr) -> AssertMetric {
        events::local_metric(&self.rib, &self.interfaces, ifname, source)
    }

    pub fn upstream_interface(&self, source: Ipv4Addr) -> Option<&str> {
        self.rib.upstream_interface(source)
    }

    pub fn sg_state(&self, sg: &SgPair) -> Option<&SourceGroupState> {
        self.sgs.get(sg)
    }

    pub fn interface(&self, ifname: &str) -> Option<&Interface> {
        self.interfaces.get(ifname)
    }

    pub fn neighbor(&self, ifname: &str, addr: Ipv4Addr) -> Option<&Neighbor> {
        self.interfaces
            .get(ifname)
            .and_then(|iface| iface.state.neighbors.get(&addr))
    }

    pub fn mrib(&self) -> &RoutingMulticastTable {
        &self.state.mrib
    }

    pub fn statistics(&self) -> &ErrorStatistics {
        &self.state.statistics
    }

    pub(crate) fn as_up(
        &mut self,
    ) -> (InstanceUpView<'_>, &mut Interfaces, &mut SgTable) {
        let instance = InstanceUpView {
            name: &self.name,
            config: &self.config,
            rib: &self.rib,
            state: &mut self.state,
            tx: &self.tx,
        };
        (instance, &mut self.interfaces, &mut self.sgs)
    }
}

impl RouteInput for Instance {
    fn route_input(
        &mut self,
        ifname: &str,
        source: Ipv4Addr,
        group: Ipv4Addr,
        ttl: u8,
    ) -> RouteInputResult {
        if !group.is_multicast()
            || !self
                .interfaces
                .get(ifname)
                .is_some_and(|iface| iface.is_active())
        {
            return RouteInputResult::NotHandled;
        }

        let (mut instance, interfaces, sgs) = self.as_up();
        events::process_data(
            &mut instance,
            interfaces,
            sgs,
            Some(ifname),
            source,
            group,
            ttl,
        )
    }

    fn notify_interface_up(&mut self, ifname: &str) {
        let (mut instance, interfaces, sgs) = self.as_up();
        events::process_interface_up(&mut instance, interfaces, sgs, ifname);
    }

    fn notify_interface_down(&mut self, ifname: &str) {
        let (mut instance, interfaces, sgs) = self.as_up();
        events::process_interface_down(&mut instance, interfaces, sgs, ifname);
    }
}

// ===== unit tests =====
