//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::InterfaceCfg;
use crate::packet::{Hello, LanPruneDelay, StateRefreshCapable};
use crate::tasks;
use crate::tasks::messages::input::TimerMsg;
use crate::timer::{self, Scheduler, TimeoutTask};

// Holdtime value meaning "never time out".
pub const HOLDTIME_INFINITE: u16 = 0xffff;

#[derive(Debug)]
pub struct Neighbor {
    pub addr: Ipv4Addr,
    pub generation_id: Option<u32>,
    pub holdtime: u16,
    pub lan_prune_delay: Option<LanPruneDelay>,
    pub state_refresh: Option<StateRefreshCapable>,
    pub liveness_timer: Option<TimeoutTask>,
}

// Timing parameters negotiated among all neighbors of an interface.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct NeighborhoodStatus {
    pub propagation_delay: Duration,
    pub override_interval: Duration,
    pub lan_delay_enabled: bool,
}

// ===== impl Neighbor =====

impl Neighbor {
    pub(crate) fn new(addr: Ipv4Addr) -> Neighbor {
        Neighbor {
            addr,
            generation_id: None,
            holdtime: 0,
            lan_prune_delay: None,
            state_refresh: None,
            liveness_timer: None,
        }
    }

    // Updates the neighbor using the contents of a received Hello.
    //
    // Returns whether the neighbor restarted, which is detected by a change
    // of its generation ID.
    pub(crate) fn update(
        &mut self,
        ifname: &str,
        hello: &Hello,
        holdtime: u16,
        sched: &mut Scheduler<TimerMsg>,
    ) -> bool {
        let restarted = matches!(
            (self.generation_id, hello.generation_id),
            (Some(old), Some(new)) if old != new
        );
        self.generation_id = hello.generation_id;
        self.holdtime = holdtime;
        self.lan_prune_delay = hello.lan_prune_delay;
        self.state_refresh = hello.state_refresh;

        // (Re)start the Neighbor Liveness Timer.
        timer::stop(&mut self.liveness_timer, sched);
        if holdtime != HOLDTIME_INFINITE {
            let timeout = Duration::from_secs(holdtime.into());
            self.liveness_timer =
                Some(tasks::nbr_timeout(ifname, self.addr, timeout, sched));
        }

        restarted
    }

    pub(crate) fn stop(&mut self, sched: &mut Scheduler<TimerMsg>) {
        timer::stop(&mut self.liveness_timer, sched);
    }
}

// ===== impl NeighborhoodStatus =====

impl NeighborhoodStatus {
    // Computes the effective propagation delay and override interval of an
    // interface.
    //
    // The values advertised by the neighbors are only taken into account when
    // every neighbor (and this router) advertises the LAN Prune Delay option.
    pub fn compute(
        config: &InterfaceCfg,
        neighbors: &BTreeMap<Ipv4Addr, Neighbor>,
    ) -> NeighborhoodStatus {
        let mut status = NeighborhoodStatus {
            propagation_delay: Duration::from_millis(
                config.propagation_delay.into(),
            ),
            override_interval: Duration::from_millis(
                config.override_interval.into(),
            ),
            lan_delay_enabled: false,
        };

        if !config.lan_prune_delay
            || neighbors.is_empty()
            || neighbors.values().any(|nbr| nbr.lan_prune_delay.is_none())
        {
            return status;
        }

        status.lan_delay_enabled = true;
        for lpd in neighbors.values().filter_map(|nbr| nbr.lan_prune_delay) {
            status.propagation_delay = std::cmp::max(
                status.propagation_delay,
                Duration::from_millis(lpd.propagation_delay.into()),
            );
            status.override_interval = std::cmp::max(
                status.override_interval,
                Duration::from_millis(lpd.override_interval.into()),
            );
        }

        status
    }
}

// ===== unit tests =====
