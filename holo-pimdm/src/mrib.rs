//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::debug::Debug;
use crate::sg::SgPair;

// Multicast forwarding table.
//
// The table is a projection of the (S,G) state machines: entries are only
// installed or removed as part of an (S,G) state update.
#[derive(Debug, Default)]
pub struct RoutingMulticastTable {
    groups: BTreeMap<Ipv4Addr, BTreeMap<Ipv4Addr, BTreeSet<MulticastEntry>>>,
}

// Downstream branch of an (S,G) distribution tree.
//
// Branches towards local receivers use the group address as next hop.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, new)]
#[derive(Deserialize, Serialize)]
pub struct MulticastEntry {
    pub source: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub ifname: String,
}

// Routing table snapshot row.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct MulticastRoute {
    pub group: Ipv4Addr,
    pub source: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub ifname: String,
}

// ===== impl RoutingMulticastTable =====

impl RoutingMulticastTable {
    // Installs the given set of branches for an (S,G), replacing any previous
    // ones. An empty set removes the entry.
    pub(crate) fn update(
        &mut self,
        sg: &SgPair,
        entries: BTreeSet<MulticastEntry>,
    ) {
        if entries.is_empty() {
            self.remove(sg);
            return;
        }

        let sources = self.groups.entry(sg.group).or_default();
        if sources.get(&sg.source) == Some(&entries) {
            return;
        }
        Debug::MribUpdate(sg, &entries).log();
        sources.insert(sg.source, entries);
    }

    pub(crate) fn remove(&mut self, sg: &SgPair) {
        let Some(sources) = self.groups.get_mut(&sg.group) else {
            return;
        };
        if sources.remove(&sg.source).is_some() {
            Debug::MribRemove(sg).log();
        }
        if sources.is_empty() {
            self.groups.remove(&sg.group);
        }
    }

    pub fn get(&self, sg: &SgPair) -> Option<&BTreeSet<MulticastEntry>> {
        self.groups
            .get(&sg.group)
            .and_then(|sources| sources.get(&sg.source))
    }

    pub fn contains(&self, sg: &SgPair) -> bool {
        self.get(sg).is_some()
    }

    // Iterates over all installed (S,G) pairs.
    pub fn sg_pairs(&self) -> impl Iterator<Item = SgPair> + '_ {
        self.groups.iter().flat_map(|(group, sources)| {
            sources.keys().map(|source| SgPair::new(*source, *group))
        })
    }

    // Returns an ordered copy of the table contents.
    pub fn entries(&self) -> Vec<MulticastRoute> {
        self.groups
            .iter()
            .flat_map(|(group, sources)| {
                sources.values().flatten().map(|entry| MulticastRoute {
                    group: *group,
                    source: entry.source,
                    next_hop: entry.next_hop,
                    ifname: entry.ifname.clone(),
                })
            })
            .collect()
    }
}

// ===== unit tests =====
