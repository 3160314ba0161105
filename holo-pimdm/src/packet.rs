//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use enum_as_inner::EnumAsInner;
use internet_checksum::Checksum;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

// Type aliases.
pub type DecodeResult<T> = Result<T, DecodeError>;

// PIM protocol version.
pub const PIM_VERSION: u8 = 2;

// All-PIM-Routers multicast group.
pub const ALL_PIM_ROUTERS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 13);

// Decode errors.
#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum DecodeError {
    InsufficientData,
    InvalidChecksum,
    InvalidVersion(u8),
    UnknownPacketType(u8),
    InvalidAddressFamily(u8),
    InvalidEncodingType(u8),
    InvalidOptionLength(u16, u16),
    InvalidGroupAddress(Ipv4Addr),
}

// PIM message types used by Dense Mode.
//
// IANA registry:
// https://www.iana.org/assignments/pim-parameters/pim-parameters.xhtml#message-types
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum PacketType {
    Hello = 0,
    JoinPrune = 3,
    Assert = 5,
    Graft = 6,
    GraftAck = 7,
    StateRefresh = 9,
}

// Hello option types.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum HelloOptionType {
    Holdtime = 1,
    LanPruneDelay = 2,
    GenerationId = 20,
    StateRefreshCapable = 21,
}

// Address family numbers.
//
// IANA registry:
// https://www.iana.org/assignments/address-family-numbers/address-family-numbers.xhtml
const AF_IPV4: u8 = 1;
// Native encoding type for the address family.
const ENCODING_NATIVE: u8 = 0;

//
// PIM-DM packet.
//
// Encoding format (common header):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |PIM Ver| Type  |   Reserved    |           Checksum            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
// Graft and Graft-Ack messages use the Join/Prune message format.
//
#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Packet {
    Hello(Hello),
    JoinPrune(JoinPrune),
    Graft(JoinPrune),
    GraftAck(JoinPrune),
    Assert(Assert),
    StateRefresh(StateRefresh),
}

//
// Hello message.
//
// Encoding format (body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |          Option Type          |         Option Length         |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                         Option Value                          |
// |                              ...                              |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                               .                               |
// |                               .                               |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Hello {
    pub holdtime: Option<u16>,
    pub lan_prune_delay: Option<LanPruneDelay>,
    pub generation_id: Option<u32>,
    pub state_refresh: Option<StateRefreshCapable>,
}

// LAN Prune Delay option value. Both delays are in milliseconds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LanPruneDelay {
    pub t_bit: bool,
    pub propagation_delay: u16,
    pub override_interval: u16,
}

// State Refresh Capable option value. The interval is in seconds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct StateRefreshCapable {
    pub version: u8,
    pub interval: u8,
}

//
// Join/Prune message.
//
// Encoding format (body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |        Upstream Neighbor Address (Encoded-Unicast format)     |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  Reserved     | Num groups    |          Hold Time            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |       Multicast Group Address 1 (Encoded-Group format)        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |   Number of Joined Sources    |   Number of Pruned Sources    |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |        Joined Source Address 1 (Encoded-Source format)        |
// |                             ...                               |
// |        Pruned Source Address 1 (Encoded-Source format)        |
// |                             ...                               |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct JoinPrune {
    pub upstream_nbr: Ipv4Addr,
    pub holdtime: u16,
    pub groups: Vec<GroupEntry>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct GroupEntry {
    pub group: Ipv4Addr,
    pub joined: Vec<Ipv4Addr>,
    pub pruned: Vec<Ipv4Addr>,
}

//
// Assert message.
//
// Encoding format (body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |            Multicast Group Address (Encoded-Group format)     |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |             Source Address (Encoded-Unicast format)           |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |R|                     Metric Preference                       |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                             Metric                            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Assert {
    pub group: Ipv4Addr,
    pub source: Ipv4Addr,
    pub metric_preference: u32,
    pub metric: u32,
}

//
// State Refresh message.
//
// Encoding format (body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |         Multicast Group Address (Encoded-Group Format)        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |             Source Address (Encoded-Unicast Format)           |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |           Originator Address (Encoded-Unicast Format)         |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |R|                     Metric Preference                       |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                             Metric                            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  Masklength   |      TTL      |P|N|O|Reserved |   Interval    |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct StateRefresh {
    pub group: Ipv4Addr,
    pub source: Ipv4Addr,
    pub originator: Ipv4Addr,
    pub metric_preference: u32,
    pub metric: u32,
    pub masklen: u8,
    pub ttl: u8,
    pub flags: StateRefreshFlags,
    pub interval: u8,
}

// State Refresh flags.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct StateRefreshFlags: u8 {
        const PRUNE_INDICATOR = 0x80;
        const PRUNE_NOW = 0x40;
        const ASSERT_OVERRIDE = 0x20;
    }
}

// IPv4 extension methods for Bytes and BytesMut.
trait BytesIpv4Ext {
    fn get_ipv4(&mut self) -> Ipv4Addr;
}

trait BytesMutIpv4Ext {
    fn put_ipv4(&mut self, addr: &Ipv4Addr);
}

// ===== impl Packet =====

impl Packet {
    pub const HDR_LENGTH: usize = 4;

    // Decodes PIM-DM packet from a bytes buffer.
    pub fn decode(data: &[u8]) -> DecodeResult<Self> {
        if data.len() < Self::HDR_LENGTH {
            return Err(DecodeError::InsufficientData);
        }

        // Validate the checksum over the whole message.
        verify_cksum(data)?;

        let mut buf = Bytes::copy_from_slice(data);
        let ver_type = buf.get_u8();
        let version = ver_type >> 4;
        if version != PIM_VERSION {
            return Err(DecodeError::InvalidVersion(version));
        }
        let pkt_type = ver_type & 0x0f;
        let Some(pkt_type) = PacketType::from_u8(pkt_type) else {
            return Err(DecodeError::UnknownPacketType(pkt_type));
        };
        let _reserved = buf.get_u8();
        let _cksum = buf.get_u16();

        let packet = match pkt_type {
            PacketType::Hello => Packet::Hello(Hello::decode(&mut buf)?),
            PacketType::JoinPrune => {
                Packet::JoinPrune(JoinPrune::decode(&mut buf)?)
            }
            PacketType::Graft => Packet::Graft(JoinPrune::decode(&mut buf)?),
            PacketType::GraftAck => {
                Packet::GraftAck(JoinPrune::decode(&mut buf)?)
            }
            PacketType::Assert => Packet::Assert(Assert::decode(&mut buf)?),
            PacketType::StateRefresh => {
                Packet::StateRefresh(StateRefresh::decode(&mut buf)?)
            }
        };

        Ok(packet)
    }

    // Encodes PIM-DM packet into a bytes buffer.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(128);

        // Common header. The checksum is filled in at the end.
        buf.put_u8((PIM_VERSION << 4) | self.packet_type() as u8);
        buf.put_u8(0);
        buf.put_u16(0);

        match self {
            Packet::Hello(msg) => msg.encode(&mut buf),
            Packet::JoinPrune(msg)
            | Packet::Graft(msg)
            | Packet::GraftAck(msg) => msg.encode(&mut buf),
            Packet::Assert(msg) => msg.encode(&mut buf),
            Packet::StateRefresh(msg) => msg.encode(&mut buf),
        }

        update_cksum(&mut buf);
        buf
    }

    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Hello(_) => PacketType::Hello,
            Packet::JoinPrune(_) => PacketType::JoinPrune,
            Packet::Graft(_) => PacketType::Graft,
            Packet::GraftAck(_) => PacketType::GraftAck,
            Packet::Assert(_) => PacketType::Assert,
            Packet::StateRefresh(_) => PacketType::StateRefresh,
        }
    }
}

// ===== impl Hello =====

impl Hello {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let mut hello = Hello::default();

        while buf.remaining() >= 4 {
            let opt_type = buf.get_u16();
            let opt_len = buf.get_u16();
            if buf.remaining() < opt_len as usize {
                return Err(DecodeError::InsufficientData);
            }
            let mut buf_opt = buf.copy_to_bytes(opt_len as usize);

            let Some(opt_type_known) = HelloOptionType::from_u16(opt_type)
            else {
                // Ignore unknown options.
                continue;
            };
            let expected_len = match opt_type_known {
                HelloOptionType::Holdtime => 2,
                HelloOptionType::LanPruneDelay
                | HelloOptionType::GenerationId
                | HelloOptionType::StateRefreshCapable => 4,
            };
            if opt_len != expected_len {
                return Err(DecodeError::InvalidOptionLength(opt_type, opt_len));
            }

            match opt_type_known {
                HelloOptionType::Holdtime => {
                    hello.holdtime = Some(buf_opt.get_u16());
                }
                HelloOptionType::LanPruneDelay => {
                    let field = buf_opt.get_u16();
                    hello.lan_prune_delay = Some(LanPruneDelay {
                        t_bit: field & 0x8000 != 0,
                        propagation_delay: field & 0x7fff,
                        override_interval: buf_opt.get_u16(),
                    });
                }
                HelloOptionType::GenerationId => {
                    hello.generation_id = Some(buf_opt.get_u32());
                }
                HelloOptionType::StateRefreshCapable => {
                    let version = buf_opt.get_u8();
                    let interval = buf_opt.get_u8();
                    let _reserved = buf_opt.get_u16();
                    hello.state_refresh =
                        Some(StateRefreshCapable { version, interval });
                }
            }
        }

        Ok(hello)
    }

    fn encode(&self, buf: &mut BytesMut) {
        if let Some(holdtime) = self.holdtime {
            buf.put_u16(HelloOptionType::Holdtime as u16);
            buf.put_u16(2);
            buf.put_u16(holdtime);
        }
        if let Some(lpd) = &self.lan_prune_delay {
            let mut field = lpd.propagation_delay & 0x7fff;
            if lpd.t_bit {
                field |= 0x8000;
            }
            buf.put_u16(HelloOptionType::LanPruneDelay as u16);
            buf.put_u16(4);
            buf.put_u16(field);
            buf.put_u16(lpd.override_interval);
        }
        if let Some(generation_id) = self.generation_id {
            buf.put_u16(HelloOptionType::GenerationId as u16);
            buf.put_u16(4);
            buf.put_u32(generation_id);
        }
        if let Some(sr) = &self.state_refresh {
            buf.put_u16(HelloOptionType::StateRefreshCapable as u16);
            buf.put_u16(4);
            buf.put_u8(sr.version);
            buf.put_u8(sr.interval);
            buf.put_u16(0);
        }
    }
}

// ===== impl JoinPrune =====

impl JoinPrune {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let upstream_nbr = decode_encoded_unicast(buf)?;
        if buf.remaining() < 4 {
            return Err(DecodeError::InsufficientData);
        }
        let _reserved = buf.get_u8();
        let num_groups = buf.get_u8();
        let holdtime = buf.get_u16();

        let mut groups = vec![];
        for _ in 0..num_groups {
            let group = decode_encoded_group(buf)?;
            if buf.remaining() < 4 {
                return Err(DecodeError::InsufficientData);
            }
            let num_joined = buf.get_u16();
            let num_pruned = buf.get_u16();
            let joined = (0..num_joined)
                .map(|_| decode_encoded_source(buf))
                .collect::<DecodeResult<Vec<_>>>()?;
            let pruned = (0..num_pruned)
                .map(|_| decode_encoded_source(buf))
                .collect::<DecodeResult<Vec<_>>>()?;
            groups.push(GroupEntry {
                group,
                joined,
                pruned,
            });
        }

        Ok(JoinPrune {
            upstream_nbr,
            holdtime,
            groups,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        encode_encoded_unicast(buf, &self.upstream_nbr);
        buf.put_u8(0);
        buf.put_u8(self.groups.len() as u8);
        buf.put_u16(self.holdtime);
        for entry in &self.groups {
            encode_encoded_group(buf, &entry.group);
            buf.put_u16(entry.joined.len() as u16);
            buf.put_u16(entry.pruned.len() as u16);
            for source in entry.joined.iter().chain(entry.pruned.iter()) {
                encode_encoded_source(buf, source);
            }
        }
    }
}

// ===== impl Assert =====

impl Assert {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let group = decode_encoded_group(buf)?;
        let source = decode_encoded_unicast(buf)?;
        if buf.remaining() < 8 {
            return Err(DecodeError::InsufficientData);
        }
        // The RPT bit is always clear in Dense Mode.
        let metric_preference = buf.get_u32() & 0x7fff_ffff;
        let metric = buf.get_u32();

        Ok(Assert {
            group,
            source,
            metric_preference,
            metric,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        encode_encoded_group(buf, &self.group);
        encode_encoded_unicast(buf, &self.source);
        buf.put_u32(self.metric_preference & 0x7fff_ffff);
        buf.put_u32(self.metric);
    }
}

// ===== impl StateRefresh =====

impl StateRefresh {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let group = decode_encoded_group(buf)?;
        let source = decode_encoded_unicast(buf)?;
        let originator = decode_encoded_unicast(buf)?;
        if buf.remaining() < 12 {
            return Err(DecodeError::InsufficientData);
        }
        let metric_preference = buf.get_u32() & 0x7fff_ffff;
        let metric = buf.get_u32();
        let masklen = buf.get_u8();
        let ttl = buf.get_u8();
        let flags = StateRefreshFlags::from_bits_truncate(buf.get_u8());
        let interval = buf.get_u8();

        Ok(StateRefresh {
            group,
            source,
            originator,
            metric_preference,
            metric,
            masklen,
            ttl,
            flags,
            interval,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        encode_encoded_group(buf, &self.group);
        encode_encoded_unicast(buf, &self.source);
        encode_encoded_unicast(buf, &self.originator);
        buf.put_u32(self.metric_preference & 0x7fff_ffff);
        buf.put_u32(self.metric);
        buf.put_u8(self.masklen);
        buf.put_u8(self.ttl);
        buf.put_u8(self.flags.bits());
        buf.put_u8(self.interval);
    }
}

// ===== impl DecodeError =====

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::InsufficientData => {
                write!(f, "not enough data")
            }
            DecodeError::InvalidChecksum => {
                write!(f, "invalid checksum")
            }
            DecodeError::InvalidVersion(version) => {
                write!(f, "invalid version: {version}")
            }
            DecodeError::UnknownPacketType(pkt_type) => {
                write!(f, "unknown packet type: {pkt_type}")
            }
            DecodeError::InvalidAddressFamily(family) => {
                write!(f, "invalid address family: {family}")
            }
            DecodeError::InvalidEncodingType(enc_type) => {
                write!(f, "invalid encoding type: {enc_type}")
            }
            DecodeError::InvalidOptionLength(opt_type, opt_len) => {
                write!(f, "invalid length {opt_len} for option {opt_type}")
            }
            DecodeError::InvalidGroupAddress(addr) => {
                write!(f, "invalid group address: {addr}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

// ===== impl Bytes =====

impl BytesIpv4Ext for Bytes {
    fn get_ipv4(&mut self) -> Ipv4Addr {
        Ipv4Addr::from(self.get_u32())
    }
}

// ===== impl BytesMut =====

impl BytesMutIpv4Ext for BytesMut {
    fn put_ipv4(&mut self, addr: &Ipv4Addr) {
        self.put_slice(&addr.octets())
    }
}

// ===== helper functions =====

const CKSUM_RANGE: std::ops::Range<usize> = 2..4;

fn update_cksum(buf: &mut BytesMut) {
    let mut cksum = Checksum::new();
    cksum.add_bytes(buf);
    buf[CKSUM_RANGE].copy_from_slice(&cksum.checksum());
}

fn verify_cksum(data: &[u8]) -> DecodeResult<()> {
    let mut cksum = Checksum::new();
    cksum.add_bytes(data);
    if cksum.checksum() != [0, 0] {
        return Err(DecodeError::InvalidChecksum);
    }
    Ok(())
}

fn decode_addr_prefix(buf: &mut Bytes) -> DecodeResult<()> {
    let family = buf.get_u8();
    if family != AF_IPV4 {
        return Err(DecodeError::InvalidAddressFamily(family));
    }
    let enc_type = buf.get_u8();
    if enc_type != ENCODING_NATIVE {
        return Err(DecodeError::InvalidEncodingType(enc_type));
    }
    Ok(())
}

//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  Addr Family  | Encoding Type |     Unicast Address
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+...
fn decode_encoded_unicast(buf: &mut Bytes) -> DecodeResult<Ipv4Addr> {
    if buf.remaining() < 6 {
        return Err(DecodeError::InsufficientData);
    }
    decode_addr_prefix(buf)?;
    Ok(buf.get_ipv4())
}

fn encode_encoded_unicast(buf: &mut BytesMut, addr: &Ipv4Addr) {
    buf.put_u8(AF_IPV4);
    buf.put_u8(ENCODING_NATIVE);
    buf.put_ipv4(addr);
}

//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  Addr Family  | Encoding Type |B| Reserved  |Z|  Mask Len     |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                Group multicast Address
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+...
fn decode_encoded_group(buf: &mut Bytes) -> DecodeResult<Ipv4Addr> {
    if buf.remaining() < 8 {
        return Err(DecodeError::InsufficientData);
    }
    decode_addr_prefix(buf)?;
    let _flags = buf.get_u8();
    let _masklen = buf.get_u8();
    let group = buf.get_ipv4();
    if !group.is_multicast() {
        return Err(DecodeError::InvalidGroupAddress(group));
    }
    Ok(group)
}

fn encode_encoded_group(buf: &mut BytesMut, group: &Ipv4Addr) {
    buf.put_u8(AF_IPV4);
    buf.put_u8(ENCODING_NATIVE);
    buf.put_u8(0);
    buf.put_u8(32);
    buf.put_ipv4(group);
}

//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// | Addr Family   | Encoding Type | Rsrvd   |S|W|R|  Mask Len     |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                        Source Address
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+...
fn decode_encoded_source(buf: &mut Bytes) -> DecodeResult<Ipv4Addr> {
    if buf.remaining() < 8 {
        return Err(DecodeError::InsufficientData);
    }
    decode_addr_prefix(buf)?;
    // The S, W and R bits are ignored in Dense Mode.
    let _flags = buf.get_u8();
    let _masklen = buf.get_u8();
    Ok(buf.get_ipv4())
}

fn encode_encoded_source(buf: &mut BytesMut, source: &Ipv4Addr) {
    buf.put_u8(AF_IPV4);
    buf.put_u8(ENCODING_NATIVE);
    buf.put_u8(0);
    buf.put_u8(32);
    buf.put_ipv4(source);
}
