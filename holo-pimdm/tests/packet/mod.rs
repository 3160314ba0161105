//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//
use std::sync::LazyLock as Lazy;

use const_addrs::ip4;
use holo_pimdm::packet::{
    Assert, DecodeError, GroupEntry, Hello, JoinPrune, LanPruneDelay, Packet,
    StateRefresh, StateRefreshCapable, StateRefreshFlags,
};

static HELLO1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x20, 0x00, 0x69, 0xbc, 0x00, 0x01, 0x00, 0x02, 0x00, 0x69, 0x00,
            0x02, 0x00, 0x04, 0x01, 0xf4, 0x09, 0xc4, 0x00, 0x14, 0x00, 0x04,
            0x12, 0x34, 0x56, 0x78, 0x00, 0x15, 0x00, 0x04, 0x01, 0x3c, 0x00,
            0x00,
        ],
        Packet::Hello(Hello {
            holdtime: Some(105),
            lan_prune_delay: Some(LanPruneDelay {
                t_bit: false,
                propagation_delay: 500,
                override_interval: 2500,
            }),
            generation_id: Some(0x12345678),
            state_refresh: Some(StateRefreshCapable {
                version: 1,
                interval: 60,
            }),
        }),
    )
});

static HELLO_UNKNOWN_OPTION1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x20, 0x00, 0x41, 0xe8, 0x00, 0x01, 0x00, 0x02, 0x00, 0x69, 0xff,
            0xf0, 0x00, 0x04, 0xde, 0xad, 0xbe, 0xef, 0x00, 0x14, 0x00, 0x04,
            0x00, 0x00, 0x00, 0x01,
        ],
        Packet::Hello(Hello {
            holdtime: Some(105),
            lan_prune_delay: None,
            generation_id: Some(1),
            state_refresh: None,
        }),
    )
});

static JOINPRUNE1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x23, 0x00, 0xd3, 0x83, 0x01, 0x00, 0x0a, 0x00, 0x00, 0x01, 0x00,
            0x01, 0x00, 0xd2, 0x01, 0x00, 0x00, 0x20, 0xef, 0x01, 0x01, 0x01,
            0x00, 0x00, 0x00, 0x01, 0x01, 0x00, 0x00, 0x20, 0x0a, 0x00, 0x01,
            0x64,
        ],
        Packet::JoinPrune(JoinPrune {
            upstream_nbr: ip4!("10.0.0.1"),
            holdtime: 210,
            groups: vec![GroupEntry {
                group: ip4!("239.1.1.1"),
                joined: vec![],
                pruned: vec![ip4!("10.0.1.100")],
            }],
        }),
    )
});

static GRAFT1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x26, 0x00, 0xd1, 0x55, 0x01, 0x00, 0x0a, 0x00, 0x00, 0x01, 0x00,
            0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x20, 0xef, 0x01, 0x01, 0x01,
            0x00, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x20, 0x0a, 0x00, 0x01,
            0x64,
        ],
        Packet::Graft(JoinPrune {
            upstream_nbr: ip4!("10.0.0.1"),
            holdtime: 0,
            groups: vec![GroupEntry {
                group: ip4!("239.1.1.1"),
                joined: vec![ip4!("10.0.1.100")],
                pruned: vec![],
            }],
        }),
    )
});

static ASSERT1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x25, 0x00, 0xdd, 0x09, 0x01, 0x00, 0x00, 0x20, 0xef, 0x01, 0x01,
            0x01, 0x01, 0x00, 0x0a, 0x00, 0x01, 0x64, 0x00, 0x00, 0x00, 0x65,
            0x00, 0x00, 0x00, 0x0a,
        ],
        Packet::Assert(Assert {
            group: ip4!("239.1.1.1"),
            source: ip4!("10.0.1.100"),
            metric_preference: 101,
            metric: 10,
        }),
    )
});

static STATEREFRESH1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x29, 0x00, 0x2c, 0x8d, 0x01, 0x00, 0x00, 0x20, 0xef, 0x01, 0x01,
            0x01, 0x01, 0x00, 0x0a, 0x00, 0x01, 0x64, 0x01, 0x00, 0x0a, 0x00,
            0x01, 0x01, 0x00, 0x00, 0x00, 0x65, 0x00, 0x00, 0x00, 0x0a, 0x20,
            0x3f, 0x80, 0x3c,
        ],
        Packet::StateRefresh(StateRefresh {
            group: ip4!("239.1.1.1"),
            source: ip4!("10.0.1.100"),
            originator: ip4!("10.0.1.1"),
            metric_preference: 101,
            metric: 10,
            masklen: 32,
            ttl: 63,
            flags: StateRefreshFlags::PRUNE_INDICATOR,
            interval: 60,
        }),
    )
});

fn test_decode_packet(bytes: &[u8], packet_expected: &Packet) {
    let packet_actual = Packet::decode(bytes).unwrap();
    assert_eq!(*packet_expected, packet_actual);
}

fn test_encode_packet(bytes_expected: &[u8], packet: &Packet) {
    let bytes_actual = packet.encode();
    assert_eq_hex!(bytes_expected, bytes_actual);
}

fn test_decode_error(bytes: &[u8], error_expected: DecodeError) {
    let error_actual = Packet::decode(bytes).unwrap_err();
    assert_eq!(error_expected, error_actual);
}

#[test]
fn test_decode_hello() {
    let (ref bytes, ref packet_expected) = *HELLO1;
    test_decode_packet(bytes, packet_expected);
}

#[test]
fn test_encode_hello() {
    let (ref bytes_expected, ref packet) = *HELLO1;
    test_encode_packet(bytes_expected, packet);
}

#[test]
fn test_decode_hello_unknown_option() {
    let (ref bytes, ref packet_expected) = *HELLO_UNKNOWN_OPTION1;
    test_decode_packet(bytes, packet_expected);
}

#[test]
fn test_decode_join_prune() {
    let (ref bytes, ref packet_expected) = *JOINPRUNE1;
    test_decode_packet(bytes, packet_expected);
}

#[test]
fn test_encode_join_prune() {
    let (ref bytes_expected, ref packet) = *JOINPRUNE1;
    test_encode_packet(bytes_expected, packet);
}

#[test]
fn test_decode_graft() {
    let (ref bytes, ref packet_expected) = *GRAFT1;
    test_decode_packet(bytes, packet_expected);
}

#[test]
fn test_encode_graft() {
    let (ref bytes_expected, ref packet) = *GRAFT1;
    test_encode_packet(bytes_expected, packet);
}

#[test]
fn test_decode_assert() {
    let (ref bytes, ref packet_expected) = *ASSERT1;
    test_decode_packet(bytes, packet_expected);
}

#[test]
fn test_encode_assert() {
    let (ref bytes_expected, ref packet) = *ASSERT1;
    test_encode_packet(bytes_expected, packet);
}

#[test]
fn test_decode_state_refresh() {
    let (ref bytes, ref packet_expected) = *STATEREFRESH1;
    test_decode_packet(bytes, packet_expected);
}

#[test]
fn test_encode_state_refresh() {
    let (ref bytes_expected, ref packet) = *STATEREFRESH1;
    test_encode_packet(bytes_expected, packet);
}

#[test]
fn test_decode_bad_checksum() {
    let (ref bytes, _) = *ASSERT1;
    let mut bytes = bytes.clone();
    bytes[3] ^= 0x01;
    test_decode_error(&bytes, DecodeError::InvalidChecksum);
}

#[test]
fn test_decode_bad_version() {
    let bytes = [0x30, 0x00, 0xcf, 0x93, 0x00, 0x01, 0x00, 0x02, 0x00, 0x69];
    test_decode_error(&bytes, DecodeError::InvalidVersion(3));
}

#[test]
fn test_decode_bad_address_family() {
    let bytes = [
        0x25, 0x00, 0xdc, 0x09, 0x01, 0x00, 0x00, 0x20, 0xef, 0x01, 0x01, 0x01,
        0x02, 0x00, 0x0a, 0x00, 0x01, 0x64, 0x00, 0x00, 0x00, 0x65, 0x00, 0x00,
        0x00, 0x0a,
    ];
    test_decode_error(&bytes, DecodeError::InvalidAddressFamily(2));
}

#[test]
fn test_decode_bad_group() {
    let bytes = [
        0x25, 0x00, 0xc2, 0x0a, 0x01, 0x00, 0x00, 0x20, 0x0a, 0x01, 0x01, 0x01,
        0x01, 0x00, 0x0a, 0x00, 0x01, 0x64, 0x00, 0x00, 0x00, 0x65, 0x00, 0x00,
        0x00, 0x0a,
    ];
    test_decode_error(
        &bytes,
        DecodeError::InvalidGroupAddress(ip4!("10.1.1.1")),
    );
}

#[test]
fn test_decode_truncated() {
    let bytes = [
        0x25, 0x00, 0xdd, 0x13, 0x01, 0x00, 0x00, 0x20, 0xef, 0x01, 0x01, 0x01,
        0x01, 0x00, 0x0a, 0x00, 0x01, 0x64, 0x00, 0x00, 0x00, 0x65,
    ];
    test_decode_error(&bytes, DecodeError::InsufficientData);
}

#[test]
fn test_decode_short_header() {
    test_decode_error(&[0x20, 0x00], DecodeError::InsufficientData);
}
