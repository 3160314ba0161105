//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::derivable_impls)]

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstanceCfg {
    // Seed of the random source used for the randomized timers and
    // generation IDs.
    pub rng_seed: u64,
    // Maximum number of Graft retransmissions. Unbounded when unset.
    pub graft_retry_limit: Option<u32>,
    // Source Lifetime (seconds).
    pub source_lifetime: u16,
    // State Refresh Interval (seconds).
    pub state_refresh_interval: u8,
    // Prune Limit interval (seconds).
    pub t_limit: u16,
    // Metric preference advertised for routes learned via `route_add`.
    pub metric_preference: u32,
    // Configuration applied to interfaces without a specific entry.
    pub interface_defaults: InterfaceCfg,
    pub interfaces: BTreeMap<String, InterfaceCfg>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterfaceCfg {
    // Hello Period (seconds).
    pub hello_interval: u16,
    // Hello Holdtime (seconds).
    pub hello_holdtime: u16,
    // Triggered Hello Delay (seconds).
    pub triggered_hello_delay: u16,
    // Propagation delay (milliseconds).
    pub propagation_delay: u16,
    // Override interval (milliseconds).
    pub override_interval: u16,
    // Prune Holdtime (seconds).
    pub prune_holdtime: u16,
    // Assert Time (seconds).
    pub assert_time: u16,
    // Graft Retry Period (seconds).
    pub graft_retry_interval: u16,
    pub lan_prune_delay: bool,
    pub state_refresh_capable: bool,
}

// ===== impl InstanceCfg =====

impl InstanceCfg {
    pub fn load(path: &str) -> Result<InstanceCfg, Error> {
        let data = std::fs::read_to_string(path)
            .map_err(|error| Error::ConfigReadError(path.to_owned(), error))?;
        InstanceCfg::from_toml(&data)
    }

    pub fn from_toml(data: &str) -> Result<InstanceCfg, Error> {
        toml::from_str(data).map_err(Error::ConfigParseError)
    }

    // Returns the configuration of the given interface.
    pub fn interface(&self, ifname: &str) -> &InterfaceCfg {
        self.interfaces
            .get(ifname)
            .unwrap_or(&self.interface_defaults)
    }

    pub(crate) fn source_lifetime(&self) -> Duration {
        Duration::from_secs(self.source_lifetime.into())
    }

    pub(crate) fn state_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.state_refresh_interval.into())
    }

    pub(crate) fn prune_limit(&self) -> Duration {
        Duration::from_secs(self.t_limit.into())
    }
}

impl Default for InstanceCfg {
    fn default() -> InstanceCfg {
        InstanceCfg {
            rng_seed: 0,
            graft_retry_limit: None,
            source_lifetime: 210,
            state_refresh_interval: 60,
            t_limit: 210,
            metric_preference: 101,
            interface_defaults: Default::default(),
            interfaces: Default::default(),
        }
    }
}

// ===== impl InterfaceCfg =====

impl InterfaceCfg {
    pub(crate) fn hello_period(&self) -> Duration {
        Duration::from_secs(self.hello_interval.into())
    }

    pub(crate) fn triggered_hello_max(&self) -> Duration {
        Duration::from_secs(self.triggered_hello_delay.into())
    }

    pub(crate) fn assert_timeout(&self) -> Duration {
        Duration::from_secs(self.assert_time.into())
    }

    pub(crate) fn graft_retry_period(&self) -> Duration {
        Duration::from_secs(self.graft_retry_interval.into())
    }
}

impl Default for InterfaceCfg {
    fn default() -> InterfaceCfg {
        InterfaceCfg {
            hello_interval: 30,
            hello_holdtime: 105,
            triggered_hello_delay: 5,
            propagation_delay: 500,
            override_interval: 2500,
            prune_holdtime: 210,
            assert_time: 180,
            graft_retry_interval: 3,
            lan_prune_delay: true,
            state_refresh_capable: true,
        }
    }
}

// ===== unit tests =====
