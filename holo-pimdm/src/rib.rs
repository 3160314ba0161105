//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use derive_new::new;
use ipnetwork::Ipv4Network;
use prefix_trie::map::PrefixMap;
use serde::{Deserialize, Serialize};

use crate::assert::AssertMetric;

// Unicast routing table consulted for RPF checks and Assert metrics.
#[derive(Debug)]
pub struct UnicastRib {
    routes: PrefixMap<Ipv4Network, UnicastRoute>,
}

#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct UnicastRoute {
    pub ifname: String,
    // Next hop towards the destination. `None` for directly connected
    // networks.
    pub nexthop: Option<Ipv4Addr>,
    pub metric: u32,
    pub preference: u32,
}

// ===== impl UnicastRib =====

impl UnicastRib {
    pub fn add(
        &mut self,
        prefix: Ipv4Network,
        route: UnicastRoute,
    ) -> Option<UnicastRoute> {
        self.routes.insert(apply_mask(&prefix), route)
    }

    pub fn remove(&mut self, prefix: &Ipv4Network) -> Option<UnicastRoute> {
        self.routes.remove(&apply_mask(prefix))
    }

    // Longest-prefix match lookup.
    pub fn lookup(&self, addr: Ipv4Addr) -> Option<&UnicastRoute> {
        self.routes
            .get_lpm(&Ipv4Network::from(addr))
            .map(|(_, route)| route)
    }

    // Returns the interface used to reach the given source.
    pub fn upstream_interface(&self, source: Ipv4Addr) -> Option<&str> {
        self.lookup(source).map(|route| route.ifname.as_str())
    }

    // Returns the metric of the route towards the given source as seen from
    // `ifname`. An unreachable source yields the infinite metric, which
    // loses every comparison.
    pub fn route_metric(
        &self,
        ifname: &str,
        source: Ipv4Addr,
        addr: Ipv4Addr,
    ) -> AssertMetric {
        match self.lookup(source) {
            Some(route) if route.ifname != ifname => {
                AssertMetric::new(route.preference, route.metric, addr)
            }
            _ => AssertMetric::INFINITE,
        }
    }
}

impl Default for UnicastRib {
    fn default() -> UnicastRib {
        UnicastRib {
            routes: PrefixMap::new(),
        }
    }
}

// ===== helper functions =====

fn apply_mask(prefix: &Ipv4Network) -> Ipv4Network {
    Ipv4Network::new(prefix.network(), prefix.prefix()).unwrap_or(*prefix)
}

// ===== unit tests =====
