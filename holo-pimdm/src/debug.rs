//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use tracing::{debug, debug_span};

use crate::assert::AssertState;
use crate::mrib::MulticastEntry;
use crate::packet::Packet;
use crate::sg::{GraftPruneState, PruneState, SgPair};

// PIM-DM debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    InstanceStart(&'a str),
    InterfaceStart(&'a str),
    InterfaceStop(&'a str),
    // Neighbors
    NbrCreate(&'a str, &'a Ipv4Addr),
    NbrRestart(&'a str, &'a Ipv4Addr),
    NbrTimeout(&'a str, &'a Ipv4Addr),
    NbrGoodbye(&'a str, &'a Ipv4Addr),
    // Network
    PacketRx(&'a str, &'a Ipv4Addr, &'a Packet),
    PacketTx(&'a str, &'a Ipv4Addr, &'a Packet),
    // (S,G) state
    SgCreate(&'a SgPair),
    SgExpire(&'a SgPair),
    RpfChange(&'a SgPair, Option<&'a str>, Option<&'a Ipv4Addr>),
    UpstreamTransition(&'a SgPair, &'a GraftPruneState, &'a GraftPruneState),
    PruneTransition(&'a SgPair, &'a str, &'a PruneState, &'a PruneState),
    AssertTransition(&'a SgPair, &'a str, &'a AssertState, &'a AssertState),
    GraftRetryLimit(&'a SgPair, u32),
    StateRefreshDuplicate(&'a SgPair, &'a Ipv4Addr),
    // Multicast routing table
    MribUpdate(&'a SgPair, &'a BTreeSet<MulticastEntry>),
    MribRemove(&'a SgPair),
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::InstanceStart(name) => {
                debug!(%name, "{}", self);
            }
            Debug::InterfaceStart(name) | Debug::InterfaceStop(name) => {
                debug_span!("interface", %name).in_scope(|| {
                    debug!("{}", self);
                })
            }
            Debug::NbrCreate(ifname, addr)
            | Debug::NbrRestart(ifname, addr)
            | Debug::NbrTimeout(ifname, addr)
            | Debug::NbrGoodbye(ifname, addr) => {
                debug_span!("interface", name = %ifname).in_scope(|| {
                    debug_span!("neighbor", %addr).in_scope(|| {
                        debug!("{}", self);
                    })
                })
            }
            Debug::PacketRx(ifname, src, packet) => {
                debug_span!("network").in_scope(|| {
                    debug_span!("input").in_scope(|| {
                        let data = serde_json::to_string(&packet).unwrap();
                        debug!(interface = %ifname, %src, %data, "{}", self);
                    })
                })
            }
            Debug::PacketTx(ifname, dst, packet) => {
                debug_span!("network").in_scope(|| {
                    debug_span!("output").in_scope(|| {
                        let data = serde_json::to_string(&packet).unwrap();
                        debug!(interface = %ifname, %dst, %data, "{}", self);
                    })
                })
            }
            Debug::SgCreate(sg)
            | Debug::SgExpire(sg)
            | Debug::MribRemove(sg) => {
                debug_span!("sg", %sg).in_scope(|| {
                    debug!("{}", self);
                })
            }
            Debug::RpfChange(sg, ifname, nbr) => {
                debug_span!("sg", %sg).in_scope(|| {
                    debug!(interface = ?ifname, neighbor = ?nbr, "{}", self);
                })
            }
            Debug::UpstreamTransition(sg, old_state, new_state) => {
                debug_span!("sg", %sg).in_scope(|| {
                    debug!(?old_state, ?new_state, "{}", self);
                })
            }
            Debug::PruneTransition(sg, ifname, old_state, new_state) => {
                debug_span!("sg", %sg).in_scope(|| {
                    debug!(
                        interface = %ifname, ?old_state, ?new_state,
                        "{}", self
                    );
                })
            }
            Debug::AssertTransition(sg, ifname, old_state, new_state) => {
                debug_span!("sg", %sg).in_scope(|| {
                    debug!(
                        interface = %ifname, ?old_state, ?new_state,
                        "{}", self
                    );
                })
            }
            Debug::GraftRetryLimit(sg, retries) => {
                debug_span!("sg", %sg).in_scope(|| {
                    debug!(%retries, "{}", self);
                })
            }
            Debug::StateRefreshDuplicate(sg, src) => {
                debug_span!("sg", %sg).in_scope(|| {
                    debug!(%src, "{}", self);
                })
            }
            Debug::MribUpdate(sg, entries) => {
                debug_span!("sg", %sg).in_scope(|| {
                    let data = serde_json::to_string(&entries).unwrap();
                    debug!(%data, "{}", self);
                })
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::InstanceStart(..) => {
                write!(f, "starting instance")
            }
            Debug::InterfaceStart(..) => {
                write!(f, "starting interface")
            }
            Debug::InterfaceStop(..) => {
                write!(f, "stopping interface")
            }
            Debug::NbrCreate(..) => {
                write!(f, "neighbor created")
            }
            Debug::NbrRestart(..) => {
                write!(f, "neighbor restarted (generation ID changed)")
            }
            Debug::NbrTimeout(..) => {
                write!(f, "neighbor timed out")
            }
            Debug::NbrGoodbye(..) => {
                write!(f, "neighbor is shutting down")
            }
            Debug::PacketRx(..) | Debug::PacketTx(..) => {
                write!(f, "packet")
            }
            Debug::SgCreate(..) => {
                write!(f, "(S,G) state created")
            }
            Debug::SgExpire(..) => {
                write!(f, "(S,G) state expired")
            }
            Debug::RpfChange(..) => {
                write!(f, "RPF information changed")
            }
            Debug::UpstreamTransition(..) => {
                write!(f, "upstream state transition")
            }
            Debug::PruneTransition(..) => {
                write!(f, "downstream prune state transition")
            }
            Debug::AssertTransition(..) => {
                write!(f, "assert state transition")
            }
            Debug::GraftRetryLimit(..) => {
                write!(f, "graft retry limit reached")
            }
            Debug::StateRefreshDuplicate(..) => {
                write!(f, "ignoring duplicate State Refresh")
            }
            Debug::MribUpdate(..) => {
                write!(f, "multicast route updated")
            }
            Debug::MribRemove(..) => {
                write!(f, "multicast route removed")
            }
        }
    }
}
