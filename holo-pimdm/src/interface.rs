//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::time::Duration;

use ipnetwork::Ipv4Network;
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::config::InterfaceCfg;
use crate::debug::Debug;
use crate::instance::InstanceTx;
use crate::neighbor::{Neighbor, NeighborhoodStatus};
use crate::output;
use crate::packet::{Hello, LanPruneDelay, Packet, StateRefreshCapable};
use crate::tasks;
use crate::tasks::messages::input::TimerMsg;
use crate::timer::{self, Scheduler, TimeoutTask};

// Type aliases.
pub type Interfaces = BTreeMap<String, Interface>;

#[derive(Debug)]
pub struct Interface {
    pub name: String,
    pub config: InterfaceCfg,
    pub state: InterfaceState,
}

#[derive(Debug)]
pub struct InterfaceState {
    pub active: bool,
    pub addr: Ipv4Network,
    // Generation ID advertised in our Hellos. Changes on every restart.
    pub generation_id: u32,
    pub neighbors: BTreeMap<Ipv4Addr, Neighbor>,
    // Groups with local receivers attached to this interface.
    pub local_members: BTreeSet<Ipv4Addr>,
    pub hello_interval_task: Option<TimeoutTask>,
    pub triggered_hello_task: Option<TimeoutTask>,
    pub statistics: InterfaceStatistics,
}

#[derive(Debug, Default)]
#[derive(Deserialize, Serialize)]
pub struct InterfaceStatistics {
    pub msgs_rcvd: MessageStatistics,
    pub msgs_sent: MessageStatistics,
    pub bad_packets_rcvd: u32,
}

#[derive(Debug, Default)]
#[derive(Deserialize, Serialize)]
pub struct MessageStatistics {
    pub total: u32,
    pub hello: u32,
    pub join_prune: u32,
    pub graft: u32,
    pub graft_ack: u32,
    pub assert: u32,
    pub state_refresh: u32,
}

// ===== impl Interface =====

impl Interface {
    pub(crate) fn new(
        name: &str,
        config: InterfaceCfg,
        addr: Ipv4Network,
    ) -> Interface {
        Interface {
            name: name.to_owned(),
            config,
            state: InterfaceState {
                active: false,
                addr,
                generation_id: 0,
                neighbors: Default::default(),
                local_members: Default::default(),
                hello_interval_task: None,
                triggered_hello_task: None,
                statistics: Default::default(),
            },
        }
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.state.addr.ip()
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    // Starts the interface: picks a fresh generation ID, announces ourselves
    // and starts the periodic Hello timer.
    pub(crate) fn start(
        &mut self,
        tx: &InstanceTx,
        sched: &mut Scheduler<TimerMsg>,
        rng: &mut StdRng,
        state_refresh_interval: u8,
    ) {
        Debug::InterfaceStart(&self.name).log();

        self.state.active = true;
        self.state.generation_id = rng.random();
        let holdtime = self.config.hello_holdtime;
        output::send_hello(self, tx, holdtime, state_refresh_interval);
        self.hello_interval_start(sched);
    }

    // Stops the interface, sending a Hello with a zero holdtime so that
    // neighbors can forget about us right away.
    pub(crate) fn stop(
        &mut self,
        tx: &InstanceTx,
        sched: &mut Scheduler<TimerMsg>,
        state_refresh_interval: u8,
    ) {
        if !self.state.active {
            return;
        }

        Debug::InterfaceStop(&self.name).log();

        output::send_hello(self, tx, 0, state_refresh_interval);
        timer::stop(&mut self.state.hello_interval_task, sched);
        timer::stop(&mut self.state.triggered_hello_task, sched);
        self.state.active = false;
    }

    pub(crate) fn hello_interval_start(
        &mut self,
        sched: &mut Scheduler<TimerMsg>,
    ) {
        timer::stop(&mut self.state.hello_interval_task, sched);
        let interval = self.config.hello_period();
        let task = tasks::hello_interval(&self.name, interval, sched);
        self.state.hello_interval_task = Some(task);
    }

    // Schedules a triggered Hello after a random delay, unless one is already
    // pending.
    pub(crate) fn triggered_hello_start(
        &mut self,
        sched: &mut Scheduler<TimerMsg>,
        rng: &mut StdRng,
    ) {
        if self.state.triggered_hello_task.is_some() {
            return;
        }
        let max = self.config.triggered_hello_max().as_millis() as u64;
        let delay = Duration::from_millis(rng.random_range(0..=max));
        let task = tasks::triggered_hello(&self.name, delay, sched);
        self.state.triggered_hello_task = Some(task);
    }

    // Builds a Hello message carrying the given holdtime.
    pub(crate) fn hello(&self, holdtime: u16, sr_interval: u8) -> Hello {
        Hello {
            holdtime: Some(holdtime),
            lan_prune_delay: self.config.lan_prune_delay.then_some(
                LanPruneDelay {
                    t_bit: false,
                    propagation_delay: self.config.propagation_delay,
                    override_interval: self.config.override_interval,
                },
            ),
            generation_id: Some(self.state.generation_id),
            state_refresh: self.config.state_refresh_capable.then_some(
                StateRefreshCapable {
                    version: 1,
                    interval: sr_interval,
                },
            ),
        }
    }

    // Returns the effective LAN delays of this interface.
    pub fn neighborhood(&self) -> NeighborhoodStatus {
        NeighborhoodStatus::compute(&self.config, &self.state.neighbors)
    }
}

// ===== impl MessageStatistics =====

impl MessageStatistics {
    pub(crate) fn update(&mut self, packet: &Packet) {
        self.total += 1;
        let counter = match packet {
            Packet::Hello(_) => &mut self.hello,
            Packet::JoinPrune(_) => &mut self.join_prune,
            Packet::Graft(_) => &mut self.graft,
            Packet::GraftAck(_) => &mut self.graft_ack,
            Packet::Assert(_) => &mut self.assert,
            Packet::StateRefresh(_) => &mut self.state_refresh,
        };
        *counter += 1;
    }
}
