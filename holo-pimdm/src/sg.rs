//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::time::Duration;

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::assert::{AssertInfo, AssertState};
use crate::debug::Debug;
use crate::instance::InstanceUpView;
use crate::interface::{Interface, Interfaces};
use crate::mrib::MulticastEntry;
use crate::tasks;
use crate::tasks::messages::input::TimerMsg;
use crate::timer::{self, Scheduler, TimeoutTask};

// Type aliases.
pub type SgTable = BTreeMap<SgPair, SourceGroupState>;

// Source-group pair identifying a multicast flow.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, new)]
#[derive(Deserialize, Serialize)]
pub struct SgPair {
    pub source: Ipv4Addr,
    pub group: Ipv4Addr,
}

// (S,G) state of one flow.
#[derive(Debug)]
pub struct SourceGroupState {
    pub sg: SgPair,
    pub upstream: UpstreamState,
    // Per-interface state. The entry of the RPF interface only carries assert
    // information.
    pub downstream: BTreeMap<String, DownstreamState>,
    // TTL of the last data packet received for this flow.
    pub data_ttl: Option<u8>,
    // TTL of the last State Refresh received for this flow.
    pub sr_ttl: Option<u8>,
    // Reception time of the last accepted State Refresh.
    pub last_state_refresh: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct DownstreamState {
    pub local_membership: LocalMembership,
    pub prune_state: PruneState,
    pub assert: AssertInfo,
    // Neighbors that sent a Prune for this flow.
    pub pruned_nbrs: BTreeSet<Ipv4Addr>,
    // Neighbors that sent a Join or Graft for this flow.
    pub joined_nbrs: BTreeSet<Ipv4Addr>,
    pub prune_pending_timer: Option<TimeoutTask>,
    pub prune_timer: Option<TimeoutTask>,
    // Rate-limits Prune Echoes.
    pub prune_limit_timer: Option<TimeoutTask>,
}

#[derive(Debug)]
pub struct UpstreamState {
    pub state: GraftPruneState,
    pub origination: Origination,
    pub valid: bool,
    pub rpf_iface: Option<String>,
    pub rpf_nbr: Option<Ipv4Addr>,
    // Graft retransmissions since the last Graft was originated.
    pub graft_retries: u32,
    // Set when a Graft couldn't be sent for lack of a route to the source.
    pub graft_suppressed: bool,
    pub graft_retry_timer: Option<TimeoutTask>,
    pub override_timer: Option<TimeoutTask>,
    pub prune_limit_timer: Option<TimeoutTask>,
    pub source_active_timer: Option<TimeoutTask>,
    pub state_refresh_timer: Option<TimeoutTask>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LocalMembership {
    #[default]
    NoInfo,
    Include,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum PruneState {
    #[default]
    NoInfo,
    PrunePending,
    Pruned,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum GraftPruneState {
    #[default]
    NoInfo,
    Pruned,
    Forwarding,
    AckPending,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Origination {
    #[default]
    NotOriginator,
    Originator,
}

// Upstream state machine events.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum UpstreamEvent {
    OlistNull,
    OlistNonNull,
    DataArrived,
    GraftAckRcvd,
    GraftRetryExpired,
    RouteAvailable,
    RpfNbrChanged,
    RpfNbrRestarted,
    StateRefreshRcvd { prune_indicator: bool },
    OverrideExpired,
}

// Messages requested by the upstream state machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum UpstreamAction {
    SendPrune,
    SendGraft,
    SendJoin,
}

// ===== impl SgPair =====

impl std::fmt::Display for SgPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.source, self.group)
    }
}

// ===== impl SourceGroupState =====

impl SourceGroupState {
    pub(crate) fn new(sg: SgPair, interfaces: &Interfaces) -> Self {
        Debug::SgCreate(&sg).log();

        let downstream = interfaces
            .values()
            .map(|iface| {
                let mut ds = DownstreamState::default();
                if iface.state.local_members.contains(&sg.group) {
                    ds.local_membership = LocalMembership::Include;
                }
                (iface.name.clone(), ds)
            })
            .collect();

        SourceGroupState {
            sg,
            upstream: UpstreamState::default(),
            downstream,
            data_ttl: None,
            sr_ttl: None,
            last_state_refresh: None,
        }
    }

    pub fn is_rpf_iface(&self, ifname: &str) -> bool {
        self.upstream.rpf_iface.as_deref() == Some(ifname)
    }

    pub fn is_originator(&self) -> bool {
        self.upstream.origination == Origination::Originator
    }

    pub(crate) fn downstream_mut(
        &mut self,
        ifname: &str,
    ) -> &mut DownstreamState {
        self.downstream.entry(ifname.to_owned()).or_default()
    }

    // Computes the downstream branches of this flow.
    pub fn branches(
        &self,
        interfaces: &Interfaces,
    ) -> BTreeSet<MulticastEntry> {
        self.downstream
            .iter()
            .filter(|(ifname, _)| !self.is_rpf_iface(ifname))
            .filter_map(|(ifname, ds)| {
                interfaces.get(ifname).map(|iface| (iface, ds))
            })
            .flat_map(|(iface, ds)| ds.branches(&self.sg, iface, true))
            .collect()
    }

    // Returns whether no downstream interface wants this flow.
    pub fn olist_is_null(&self, interfaces: &Interfaces) -> bool {
        self.branches(interfaces).is_empty()
    }

    // Stops every timer of this flow.
    pub(crate) fn stop_timers(&mut self, sched: &mut Scheduler<TimerMsg>) {
        for ds in self.downstream.values_mut() {
            ds.reset(sched);
        }
        self.upstream.stop_timers(sched);
    }
}

// ===== impl DownstreamState =====

impl DownstreamState {
    // Neighbors on the interface that still want the flow.
    pub fn receivers(&self, iface: &Interface) -> BTreeSet<Ipv4Addr> {
        iface
            .state
            .neighbors
            .keys()
            .chain(self.joined_nbrs.iter())
            .filter(|addr| !self.pruned_nbrs.contains(addr))
            .copied()
            .collect()
    }

    // Computes the branches of this interface.
    //
    // While a prune is pending the pruning neighbors keep receiving traffic.
    // Interfaces that lost an assert election don't forward, unless
    // `honor_assert` is false.
    pub(crate) fn branches(
        &self,
        sg: &SgPair,
        iface: &Interface,
        honor_assert: bool,
    ) -> BTreeSet<MulticastEntry> {
        if !iface.is_active()
            || self.prune_state == PruneState::Pruned
            || (honor_assert && self.assert.state == AssertState::Loser)
        {
            return BTreeSet::new();
        }

        let mut nbrs = iface
            .state
            .neighbors
            .keys()
            .chain(self.joined_nbrs.iter())
            .copied()
            .collect::<BTreeSet<_>>();
        if self.prune_state == PruneState::NoInfo {
            nbrs.retain(|addr| !self.pruned_nbrs.contains(addr));
        }

        let mut branches = nbrs
            .into_iter()
            .map(|nbr| MulticastEntry::new(sg.source, nbr, iface.name.clone()))
            .collect::<BTreeSet<_>>();
        if self.local_membership == LocalMembership::Include {
            branches.insert(MulticastEntry::new(
                sg.source,
                sg.group,
                iface.name.clone(),
            ));
        }
        branches
    }

    // Returns whether this router would forward onto the interface if it
    // weren't for the assert election.
    pub(crate) fn could_assert(&self, sg: &SgPair, iface: &Interface) -> bool {
        !self.branches(sg, iface, false).is_empty()
    }

    pub(crate) fn set_prune_state(
        &mut self,
        sg: &SgPair,
        ifname: &str,
        new_state: PruneState,
    ) {
        if self.prune_state != new_state {
            Debug::PruneTransition(sg, ifname, &self.prune_state, &new_state)
                .log();
            self.prune_state = new_state;
        }
    }

    // Cancels any pending or active prune.
    pub(crate) fn cancel_prune(
        &mut self,
        sg: &SgPair,
        ifname: &str,
        sched: &mut Scheduler<TimerMsg>,
    ) {
        timer::stop(&mut self.prune_pending_timer, sched);
        timer::stop(&mut self.prune_timer, sched);
        self.set_prune_state(sg, ifname, PruneState::NoInfo);
    }

    // (Re)starts the Prune Timer unless it's already running for longer.
    pub(crate) fn prune_timer_start(
        &mut self,
        sg: SgPair,
        ifname: &str,
        holdtime: Duration,
        sched: &mut Scheduler<TimerMsg>,
    ) {
        if let Some(task) = &self.prune_timer
            && sched.remaining(task) >= holdtime
        {
            return;
        }
        timer::stop(&mut self.prune_timer, sched);
        self.prune_timer =
            Some(tasks::prune_timer(sg, ifname, holdtime, sched));
    }

    // Stops all timers and forgets everything learned from neighbors.
    pub(crate) fn reset(&mut self, sched: &mut Scheduler<TimerMsg>) {
        timer::stop(&mut self.prune_pending_timer, sched);
        timer::stop(&mut self.prune_timer, sched);
        timer::stop(&mut self.prune_limit_timer, sched);
        self.assert.reset(sched);
        self.prune_state = PruneState::NoInfo;
        self.pruned_nbrs.clear();
        self.joined_nbrs.clear();
    }
}

// ===== impl UpstreamState =====

impl UpstreamState {
    // Runs the upstream (Graft/Prune) state machine.
    pub(crate) fn fsm(
        &mut self,
        sg: SgPair,
        event: UpstreamEvent,
        olist_null: bool,
        graft_retry: Duration,
        instance: &mut InstanceUpView<'_>,
    ) -> Option<UpstreamAction> {
        let prune_limit = instance.config.prune_limit();
        let retry_limit = instance.config.graft_retry_limit;
        let sched = &mut instance.state.sched;
        let route = self.rpf_nbr.is_some();
        let old_state = self.state;
        let mut action = None;

        let new_state = match (self.state, event) {
            // State: Forwarding or AckPending
            // Event: olist becomes null
            // Action: send Prune, start PLT
            (
                GraftPruneState::Forwarding | GraftPruneState::AckPending,
                UpstreamEvent::OlistNull,
            ) => {
                timer::stop(&mut self.graft_retry_timer, sched);
                timer::stop(&mut self.override_timer, sched);
                self.prune_limit_start(sg, prune_limit, sched);
                action = Some(UpstreamAction::SendPrune);
                Some(GraftPruneState::Pruned)
            }

            // State: NoInfo
            // Event: data arrives and olist is null
            // Action: send Prune, start PLT
            (GraftPruneState::NoInfo, UpstreamEvent::DataArrived)
                if olist_null =>
            {
                self.prune_limit_start(sg, prune_limit, sched);
                action = Some(UpstreamAction::SendPrune);
                Some(GraftPruneState::Pruned)
            }

            // State: NoInfo
            // Event: olist becomes non-null or data arrives
            // Action: none
            (
                GraftPruneState::NoInfo,
                UpstreamEvent::OlistNonNull | UpstreamEvent::DataArrived,
            ) if !olist_null && route => Some(GraftPruneState::Forwarding),

            // State: Pruned
            // Event: olist becomes non-null
            // Action: send Graft, start GRT
            (GraftPruneState::Pruned, UpstreamEvent::OlistNonNull) => {
                if route {
                    timer::stop(&mut self.prune_limit_timer, sched);
                    self.graft_start(sg, graft_retry, sched);
                    action = Some(UpstreamAction::SendGraft);
                    Some(GraftPruneState::AckPending)
                } else {
                    self.graft_suppressed = true;
                    None
                }
            }

            // State: Pruned
            // Event: data arrives, olist is null and PLT isn't running
            // Action: send Prune, start PLT
            (GraftPruneState::Pruned, UpstreamEvent::DataArrived)
                if olist_null && self.prune_limit_timer.is_none() =>
            {
                self.prune_limit_start(sg, prune_limit, sched);
                action = Some(UpstreamAction::SendPrune);
                None
            }

            // State: AckPending
            // Event: Graft-Ack received
            // Action: stop GRT
            (GraftPruneState::AckPending, UpstreamEvent::GraftAckRcvd) => {
                timer::stop(&mut self.graft_retry_timer, sched);
                self.graft_retries = 0;
                Some(GraftPruneState::Forwarding)
            }

            // State: AckPending
            // Event: GRT expires
            // Action: retransmit the Graft unless the route is gone or the
            //         retry limit was reached
            (GraftPruneState::AckPending, UpstreamEvent::GraftRetryExpired) => {
                if !route {
                    self.graft_suppressed = true;
                    None
                } else if retry_limit
                    .is_some_and(|limit| self.graft_retries >= limit)
                {
                    Debug::GraftRetryLimit(&sg, self.graft_retries).log();
                    self.graft_retries = 0;
                    Some(GraftPruneState::Forwarding)
                } else {
                    self.graft_retries += 1;
                    self.graft_retry_timer =
                        Some(tasks::graft_retry_timer(sg, graft_retry, sched));
                    action = Some(UpstreamAction::SendGraft);
                    None
                }
            }

            // State: Pruned or AckPending
            // Event: route to the source available again
            // Action: resume the suppressed Graft
            (
                GraftPruneState::Pruned | GraftPruneState::AckPending,
                UpstreamEvent::RouteAvailable,
            ) if self.graft_suppressed => {
                self.graft_suppressed = false;
                if self.state == GraftPruneState::AckPending || !olist_null {
                    timer::stop(&mut self.prune_limit_timer, sched);
                    self.graft_start(sg, graft_retry, sched);
                    action = Some(UpstreamAction::SendGraft);
                    Some(GraftPruneState::AckPending)
                } else {
                    None
                }
            }

            // State: Forwarding or AckPending
            // Event: RPF neighbor changes
            // Action: send Graft to the new neighbor, start GRT
            (
                GraftPruneState::Forwarding | GraftPruneState::AckPending,
                UpstreamEvent::RpfNbrChanged,
            ) if !olist_null && route => {
                timer::stop(&mut self.override_timer, sched);
                self.graft_start(sg, graft_retry, sched);
                action = Some(UpstreamAction::SendGraft);
                Some(GraftPruneState::AckPending)
            }

            // State: Forwarding or AckPending
            // Event: route to the source lost
            // Action: stop GRT and OT, graft back once the route returns
            (
                GraftPruneState::Forwarding | GraftPruneState::AckPending,
                UpstreamEvent::RpfNbrChanged,
            ) if !route => {
                timer::stop(&mut self.graft_retry_timer, sched);
                timer::stop(&mut self.override_timer, sched);
                self.graft_retries = 0;
                self.graft_suppressed = true;
                Some(GraftPruneState::Pruned)
            }

            // State: Pruned
            // Event: RPF neighbor changes or restarts
            // Action: stop PLT so the next data packet triggers a Prune
            (
                GraftPruneState::Pruned,
                UpstreamEvent::RpfNbrChanged | UpstreamEvent::RpfNbrRestarted,
            ) => {
                timer::stop(&mut self.prune_limit_timer, sched);
                None
            }

            // State: AckPending
            // Event: RPF neighbor restarts
            // Action: retransmit the Graft, restart GRT
            (GraftPruneState::AckPending, UpstreamEvent::RpfNbrRestarted)
                if route =>
            {
                self.graft_start(sg, graft_retry, sched);
                action = Some(UpstreamAction::SendGraft);
                None
            }

            // State: Pruned
            // Event: State Refresh with the Prune Indicator set
            // Action: restart PLT
            (
                GraftPruneState::Pruned,
                UpstreamEvent::StateRefreshRcvd {
                    prune_indicator: true,
                },
            ) => {
                self.prune_limit_start(sg, prune_limit, sched);
                None
            }

            // State: Pruned
            // Event: State Refresh with the Prune Indicator clear
            // Action: send Prune if PLT isn't running
            (
                GraftPruneState::Pruned,
                UpstreamEvent::StateRefreshRcvd {
                    prune_indicator: false,
                },
            ) if olist_null && self.prune_limit_timer.is_none() => {
                self.prune_limit_start(sg, prune_limit, sched);
                action = Some(UpstreamAction::SendPrune);
                None
            }

            // State: AckPending
            // Event: State Refresh with the Prune Indicator clear
            // Action: stop GRT (acts as an implicit Graft-Ack)
            (
                GraftPruneState::AckPending,
                UpstreamEvent::StateRefreshRcvd {
                    prune_indicator: false,
                },
            ) => {
                timer::stop(&mut self.graft_retry_timer, sched);
                self.graft_retries = 0;
                Some(GraftPruneState::Forwarding)
            }

            // State: Forwarding
            // Event: State Refresh with the Prune Indicator set
            // Action: the upstream router believes we're pruned, send Graft
            (
                GraftPruneState::Forwarding,
                UpstreamEvent::StateRefreshRcvd {
                    prune_indicator: true,
                },
            ) if !olist_null && route => {
                self.graft_start(sg, graft_retry, sched);
                action = Some(UpstreamAction::SendGraft);
                Some(GraftPruneState::AckPending)
            }

            // State: Forwarding or AckPending
            // Event: OT expires
            // Action: send Join to override a Prune seen on the link
            (
                GraftPruneState::Forwarding | GraftPruneState::AckPending,
                UpstreamEvent::OverrideExpired,
            ) if route => {
                action = Some(UpstreamAction::SendJoin);
                None
            }

            _ => None,
        };

        if let Some(new_state) = new_state
            && new_state != old_state
        {
            Debug::UpstreamTransition(&sg, &old_state, &new_state).log();
            self.state = new_state;
        }

        action
    }

    // (Re)starts the Source Active Timer.
    pub(crate) fn source_active_start(
        &mut self,
        sg: SgPair,
        timeout: Duration,
        sched: &mut Scheduler<TimerMsg>,
    ) {
        timer::stop(&mut self.source_active_timer, sched);
        self.source_active_timer =
            Some(tasks::source_active_timer(sg, timeout, sched));
    }

    pub(crate) fn override_start(
        &mut self,
        sg: SgPair,
        timeout: Duration,
        sched: &mut Scheduler<TimerMsg>,
    ) {
        if self.override_timer.is_some() {
            return;
        }
        self.override_timer = Some(tasks::override_timer(sg, timeout, sched));
    }

    pub(crate) fn stop_timers(&mut self, sched: &mut Scheduler<TimerMsg>) {
        timer::stop(&mut self.graft_retry_timer, sched);
        timer::stop(&mut self.override_timer, sched);
        timer::stop(&mut self.prune_limit_timer, sched);
        timer::stop(&mut self.source_active_timer, sched);
        timer::stop(&mut self.state_refresh_timer, sched);
    }

    fn prune_limit_start(
        &mut self,
        sg: SgPair,
        timeout: Duration,
        sched: &mut Scheduler<TimerMsg>,
    ) {
        timer::stop(&mut self.prune_limit_timer, sched);
        self.prune_limit_timer =
            Some(tasks::upstream_prune_limit_timer(sg, timeout, sched));
    }

    fn graft_start(
        &mut self,
        sg: SgPair,
        timeout: Duration,
        sched: &mut Scheduler<TimerMsg>,
    ) {
        timer::stop(&mut self.graft_retry_timer, sched);
        self.graft_retries = 0;
        self.graft_retry_timer =
            Some(tasks::graft_retry_timer(sg, timeout, sched));
    }
}

impl Default for UpstreamState {
    fn default() -> UpstreamState {
        UpstreamState {
            state: GraftPruneState::NoInfo,
            origination: Origination::NotOriginator,
            valid: true,
            rpf_iface: None,
            rpf_nbr: None,
            graft_retries: 0,
            graft_suppressed: false,
            graft_retry_timer: None,
            override_timer: None,
            prune_limit_timer: None,
            source_active_timer: None,
            state_refresh_timer: None,
        }
    }
}
