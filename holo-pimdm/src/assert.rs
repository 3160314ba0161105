//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::time::Duration;

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::debug::Debug;
use crate::sg::SgPair;
use crate::tasks;
use crate::tasks::messages::input::TimerMsg;
use crate::timer::{self, Scheduler, TimeoutTask};

/// Assert metric.
///
/// Metrics are ordered by metric preference, then by route metric, then by
/// address, all ascending. A lower metric is a better metric, so `a > b`
/// means that `a` loses against `b`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, new)]
#[derive(Deserialize, Serialize)]
pub struct AssertMetric {
    pub metric_preference: u32,
    pub route_metric: u32,
    pub addr: Ipv4Addr,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum AssertState {
    #[default]
    NoInfo,
    Loser,
    Winner,
}

// Per-interface assert information of an (S,G) entry.
#[derive(Debug, Default)]
pub struct AssertInfo {
    pub state: AssertState,
    // Metric of the current assert winner.
    pub winner: Option<AssertMetric>,
    // Assert Timer. Only runs in the Winner state.
    pub timer: Option<TimeoutTask>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum AssertEvent {
    // Received an assert with a metric better than ours.
    RcvPreferred(AssertMetric),
    // Received an assert with a metric worse than ours.
    RcvInferior,
    // Data arrived on an interface that is in the outgoing list.
    DataOnOutgoing,
    TimerExpired,
    // This router no longer forwards onto the interface.
    CouldAssertLost,
    // The current winner went away (neighbor timeout or restart).
    WinnerGone,
    InterfaceDown,
}

// ===== impl AssertMetric =====

impl AssertMetric {
    // Metric of an unreachable source. Loses against every other metric.
    pub const INFINITE: AssertMetric = AssertMetric {
        metric_preference: 0x7fff_ffff,
        route_metric: u32::MAX,
        addr: Ipv4Addr::BROADCAST,
    };

    pub fn is_better(&self, other: &AssertMetric) -> bool {
        self < other
    }

    pub fn is_infinite(&self) -> bool {
        self.metric_preference == Self::INFINITE.metric_preference
            && self.route_metric == Self::INFINITE.route_metric
    }
}

// ===== impl AssertInfo =====

impl AssertInfo {
    // Runs the assert state machine. Returns whether our own assert should be
    // sent on the interface.
    pub(crate) fn fsm(
        &mut self,
        sg: SgPair,
        ifname: &str,
        event: AssertEvent,
        assert_time: Duration,
        sched: &mut Scheduler<TimerMsg>,
    ) -> bool {
        let old_state = self.state;
        let mut send_assert = false;

        let new_state = match (self.state, event) {
            // State: any
            // Event: preferred assert received
            // Action: record the winner, stop the Assert Timer
            (_, AssertEvent::RcvPreferred(metric)) => {
                timer::stop(&mut self.timer, sched);
                self.winner = Some(metric);
                Some(AssertState::Loser)
            }

            // State: NoInfo or Loser
            // Event: inferior assert received or data on an outgoing
            //        interface
            // Action: send assert, start the Assert Timer
            (
                AssertState::NoInfo,
                AssertEvent::RcvInferior | AssertEvent::DataOnOutgoing,
            )
            | (AssertState::Loser, AssertEvent::RcvInferior) => {
                self.winner = None;
                send_assert = true;
                self.start_timer(sg, ifname, assert_time, sched);
                Some(AssertState::Winner)
            }

            // State: Winner
            // Event: inferior assert, data on an outgoing interface or timer
            //        expiration
            // Action: resend assert, restart the Assert Timer
            (
                AssertState::Winner,
                AssertEvent::RcvInferior
                | AssertEvent::DataOnOutgoing
                | AssertEvent::TimerExpired,
            ) => {
                send_assert = true;
                self.start_timer(sg, ifname, assert_time, sched);
                None
            }

            // State: Winner
            // Event: nothing left to forward onto the interface
            // Action: stop the Assert Timer
            (AssertState::Winner, AssertEvent::CouldAssertLost) => {
                timer::stop(&mut self.timer, sched);
                Some(AssertState::NoInfo)
            }

            // State: Loser
            // Event: winner went away
            // Action: forget the winner
            (AssertState::Loser, AssertEvent::WinnerGone) => {
                self.winner = None;
                Some(AssertState::NoInfo)
            }

            // State: any
            // Event: interface down
            // Action: stop the Assert Timer
            (_, AssertEvent::InterfaceDown) => {
                timer::stop(&mut self.timer, sched);
                self.winner = None;
                Some(AssertState::NoInfo)
            }

            _ => None,
        };

        if let Some(new_state) = new_state
            && new_state != old_state
        {
            Debug::AssertTransition(&sg, ifname, &old_state, &new_state).log();
            self.state = new_state;
        }

        send_assert
    }

    // Returns the address of the assert winner, if it's someone else.
    pub fn winner_addr(&self) -> Option<Ipv4Addr> {
        match self.state {
            AssertState::Loser => self.winner.map(|winner| winner.addr),
            _ => None,
        }
    }

    pub(crate) fn reset(&mut self, sched: &mut Scheduler<TimerMsg>) {
        timer::stop(&mut self.timer, sched);
        self.winner = None;
        self.state = AssertState::NoInfo;
    }

    fn start_timer(
        &mut self,
        sg: SgPair,
        ifname: &str,
        assert_time: Duration,
        sched: &mut Scheduler<TimerMsg>,
    ) {
        timer::stop(&mut self.timer, sched);
        self.timer = Some(tasks::assert_timer(sg, ifname, assert_time, sched));
    }
}

// ===== unit tests =====
