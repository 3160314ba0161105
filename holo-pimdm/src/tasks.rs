//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::sync::mpsc::Receiver;
use tokio::time::Instant;
use tracing::{Instrument, debug_span};

use crate::instance::Instance;
use crate::sg::SgPair;
use crate::tasks::messages::ProtocolInputMsg;
use crate::tasks::messages::input::TimerMsg;
use crate::timer::{Scheduler, TimeoutTask};

//
// PIM-DM tasks diagram:
//
//                                  +--------------+
//                  net_rx (Nx) ->  |              |
//                 data_rx (Nx) ->  |              |
//          hello_interval (Nx) ->  |              |
//         triggered_hello (Nx) ->  |              |
//             nbr_timeout (Nx) ->  |              |
//            assert_timer (Nx) ->  |              |
//           prune_pending (Nx) ->  |   instance   | -> (Nx) net_tx
//             prune_timer (Nx) ->  |              |
//        prune_limit_down (Nx) ->  |              |
//             graft_retry (Nx) ->  |              |
//          override_timer (Nx) ->  |              |
//          prune_limit_up (Nx) ->  |              |
//           source_active (Nx) ->  |              |
//           state_refresh (Nx) ->  |              |
//                                  +--------------+
//
// Timers are kept in a discrete-event scheduler owned by the instance. The
// `run` task maps the scheduler deadlines onto the tokio clock.
//

// PIM-DM inter-task message types.
pub mod messages {
    use serde::{Deserialize, Serialize};

    // Type aliases.
    pub type ProtocolInputMsg = input::ProtocolMsg;

    // Input messages (child task -> main task).
    pub mod input {
        use std::net::Ipv4Addr;

        use super::*;
        use crate::packet::{DecodeResult, Packet};
        use crate::sg::SgPair;

        #[derive(Debug, Deserialize, Serialize)]
        pub enum ProtocolMsg {
            NetRxPacket(NetRxPacketMsg),
            DataRx(DataRxMsg),
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct NetRxPacketMsg {
            pub ifname: String,
            pub src: Ipv4Addr,
            pub packet: DecodeResult<Packet>,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct DataRxMsg {
            pub ifname: String,
            pub source: Ipv4Addr,
            pub group: Ipv4Addr,
            pub ttl: u8,
        }

        // Timer expiration messages.
        #[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
        pub enum TimerMsg {
            HelloInterval { ifname: String },
            TriggeredHello { ifname: String },
            NbrTimeout { ifname: String, addr: Ipv4Addr },
            AssertTimer { sg: SgPair, ifname: String },
            PrunePending { sg: SgPair, ifname: String },
            PruneTimer { sg: SgPair, ifname: String },
            DownstreamPruneLimit { sg: SgPair, ifname: String },
            GraftRetry { sg: SgPair },
            Override { sg: SgPair },
            UpstreamPruneLimit { sg: SgPair },
            SourceActive { sg: SgPair },
            StateRefresh { sg: SgPair },
        }
    }

    // Output messages (main task -> child task).
    pub mod output {
        use std::net::Ipv4Addr;

        use super::*;
        use crate::packet::Packet;

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct NetTxPacketMsg {
            pub ifname: String,
            pub dst: Ipv4Addr,
            pub packet: Packet,
        }
    }
}

// ===== PIM-DM tasks =====

// Drives the instance using the tokio clock.
//
// Input messages are processed as they arrive and timers fire when their
// virtual deadline is reached. Returns the instance once the input channel is
// closed.
pub async fn run(
    mut instance: Instance,
    mut input_rx: Receiver<ProtocolInputMsg>,
) -> Instance {
    let span = debug_span!("instance", name = %instance.name);
    async move {
        let start = Instant::now()
            .checked_sub(instance.now())
            .unwrap_or_else(Instant::now);

        loop {
            let deadline = instance.next_deadline().map(|time| start + time);
            tokio::select! {
                msg = input_rx.recv() => {
                    let Some(msg) = msg else {
                        break;
                    };
                    instance.advance_to(start.elapsed());
                    instance.process_protocol_msg(msg);
                }
                _ = sleep_until(deadline) => {
                    instance.advance_to(start.elapsed());
                }
            }
        }

        instance
    }
    .instrument(span)
    .await
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// Periodic Hello timer.
pub(crate) fn hello_interval(
    ifname: &str,
    interval: Duration,
    sched: &mut Scheduler<TimerMsg>,
) -> TimeoutTask {
    let ifname = ifname.to_owned();
    sched.schedule(interval, TimerMsg::HelloInterval { ifname })
}

// Triggered Hello timer.
pub(crate) fn triggered_hello(
    ifname: &str,
    delay: Duration,
    sched: &mut Scheduler<TimerMsg>,
) -> TimeoutTask {
    let ifname = ifname.to_owned();
    sched.schedule(delay, TimerMsg::TriggeredHello { ifname })
}

// Neighbor Liveness Timer.
pub(crate) fn nbr_timeout(
    ifname: &str,
    addr: Ipv4Addr,
    holdtime: Duration,
    sched: &mut Scheduler<TimerMsg>,
) -> TimeoutTask {
    let ifname = ifname.to_owned();
    sched.schedule(holdtime, TimerMsg::NbrTimeout { ifname, addr })
}

// Assert Timer (AT).
pub(crate) fn assert_timer(
    sg: SgPair,
    ifname: &str,
    timeout: Duration,
    sched: &mut Scheduler<TimerMsg>,
) -> TimeoutTask {
    let ifname = ifname.to_owned();
    sched.schedule(timeout, TimerMsg::AssertTimer { sg, ifname })
}

// Prune-Pending Timer (PPT).
pub(crate) fn prune_pending_timer(
    sg: SgPair,
    ifname: &str,
    timeout: Duration,
    sched: &mut Scheduler<TimerMsg>,
) -> TimeoutTask {
    let ifname = ifname.to_owned();
    sched.schedule(timeout, TimerMsg::PrunePending { sg, ifname })
}

// Prune Timer (PT).
pub(crate) fn prune_timer(
    sg: SgPair,
    ifname: &str,
    timeout: Duration,
    sched: &mut Scheduler<TimerMsg>,
) -> TimeoutTask {
    let ifname = ifname.to_owned();
    sched.schedule(timeout, TimerMsg::PruneTimer { sg, ifname })
}

// Downstream Prune Limit Timer, rate-limiting Prune Echoes.
pub(crate) fn downstream_prune_limit_timer(
    sg: SgPair,
    ifname: &str,
    timeout: Duration,
    sched: &mut Scheduler<TimerMsg>,
) -> TimeoutTask {
    let ifname = ifname.to_owned();
    sched.schedule(timeout, TimerMsg::DownstreamPruneLimit { sg, ifname })
}

// Graft Retry Timer (GRT).
pub(crate) fn graft_retry_timer(
    sg: SgPair,
    timeout: Duration,
    sched: &mut Scheduler<TimerMsg>,
) -> TimeoutTask {
    sched.schedule(timeout, TimerMsg::GraftRetry { sg })
}

// Override Timer (OT).
pub(crate) fn override_timer(
    sg: SgPair,
    timeout: Duration,
    sched: &mut Scheduler<TimerMsg>,
) -> TimeoutTask {
    sched.schedule(timeout, TimerMsg::Override { sg })
}

// Upstream Prune Limit Timer (PLT).
pub(crate) fn upstream_prune_limit_timer(
    sg: SgPair,
    timeout: Duration,
    sched: &mut Scheduler<TimerMsg>,
) -> TimeoutTask {
    sched.schedule(timeout, TimerMsg::UpstreamPruneLimit { sg })
}

// Source Active Timer (SAT).
pub(crate) fn source_active_timer(
    sg: SgPair,
    timeout: Duration,
    sched: &mut Scheduler<TimerMsg>,
) -> TimeoutTask {
    sched.schedule(timeout, TimerMsg::SourceActive { sg })
}

// State Refresh Timer (SRT).
pub(crate) fn state_refresh_timer(
    sg: SgPair,
    timeout: Duration,
    sched: &mut Scheduler<TimerMsg>,
) -> TimeoutTask {
    sched.schedule(timeout, TimerMsg::StateRefresh { sg })
}
