//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use const_addrs::ip4;
use holo_pimdm::config::InstanceCfg;
use holo_pimdm::instance::Instance;
use holo_pimdm::packet::{Hello, Packet};
use holo_pimdm::tasks;
use holo_pimdm::tasks::messages::ProtocolInputMsg;
use holo_pimdm::tasks::messages::input::NetRxPacketMsg;
use tokio::sync::mpsc;

use super::init_tracing;

#[tokio::test(start_paused = true)]
async fn run_instance_task() {
    init_tracing();

    let (net_tx, mut net_rx) = mpsc::unbounded_channel();
    let mut instance = Instance::new("r1", InstanceCfg::default(), net_tx);
    instance.add_interface("eth0", "10.0.0.1/24".parse().unwrap());

    let (input_tx, input_rx) = mpsc::channel(4);
    let handle = tokio::spawn(tasks::run(instance, input_rx));

    let hello = Hello {
        holdtime: Some(105),
        lan_prune_delay: None,
        generation_id: Some(0xdeadbeef),
        state_refresh: None,
    };
    let msg = NetRxPacketMsg {
        ifname: "eth0".to_owned(),
        src: ip4!("10.0.0.2"),
        packet: Ok(Packet::Hello(hello)),
    };
    input_tx
        .send(ProtocolInputMsg::NetRxPacket(msg))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(31)).await;

    drop(input_tx);
    let instance = handle.await.unwrap();
    let nbr = instance.neighbor("eth0", ip4!("10.0.0.2")).unwrap();
    assert_eq!(nbr.generation_id, Some(0xdeadbeef));

    // Initial Hello, triggered Hello for the new neighbor and the first
    // periodic one.
    let mut hellos = 0;
    while let Ok(msg) = net_rx.try_recv() {
        assert_eq!(msg.ifname, "eth0");
        if matches!(msg.packet, Packet::Hello(_)) {
            hellos += 1;
        }
    }
    assert_eq!(hellos, 3);
}
