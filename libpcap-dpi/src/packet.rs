//! Link, network and transport header dissection
//!
//! `dissect` turns the raw bytes of one record into a `PacketDescriptor`. Only
//! Ethernet II carrying IPv4 is understood; anything else, or any header that does
//! not fit in the captured bytes, is reported as `Malformed` and skipped by callers.

use libpcap_tools::{FiveTuple, Timestamp};
use pnet_base::MacAddr;
use pnet_packet::ethernet::{EtherTypes, EthernetPacket};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::tcp::TcpPacket;
use pnet_packet::udp::UdpPacket;
use std::fmt;
use std::net::Ipv4Addr;

pub const ETHERNET_HEADER_LEN: usize = 14;
const IPV4_MIN_HEADER_LEN: usize = 20;
const TCP_MIN_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

/// Display name of an IP protocol number
pub fn protocol_name(proto: u8) -> &'static str {
    match proto {
        1 => "ICMP",
        2 => "IGMP",
        6 => "TCP",
        17 => "UDP",
        47 => "GRE",
        50 => "ESP",
        51 => "AH",
        132 => "SCTP",
        _ => "OTHER",
    }
}

/// TCP flag byte (offset 13 of the TCP header)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TcpFlags(pub u8);

impl TcpFlags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;

    #[inline]
    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag != 0
    }
}

/// Space-separated symbolic names, always in SYN ACK FIN RST PSH URG order
impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const ORDER: [(u8, &str); 6] = [
            (TcpFlags::SYN, "SYN"),
            (TcpFlags::ACK, "ACK"),
            (TcpFlags::FIN, "FIN"),
            (TcpFlags::RST, "RST"),
            (TcpFlags::PSH, "PSH"),
            (TcpFlags::URG, "URG"),
        ];
        let mut first = true;
        for (bit, name) in ORDER.iter() {
            if self.contains(*bit) {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Transport layer details
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transport {
    Tcp {
        seq: u32,
        ack: u32,
        flags: TcpFlags,
        window: u16,
        header_len: usize,
    },
    Udp {
        length: u16,
    },
    /// Protocol without transport parsing (ICMP, GRE, ...)
    None,
}

/// Structured view of one packet's headers
///
/// Invariant: `payload_offset + payload_len` never exceeds the record length.
#[derive(Clone, Debug)]
pub struct PacketDescriptor {
    /// Index of the record in the capture (starting at 1)
    pub index: usize,
    pub ts: Timestamp,
    /// Captured length of the record
    pub length: usize,
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub proto: u8,
    pub ttl: u8,
    pub ip_total_length: u16,
    /// 0 when the transport has no ports
    pub src_port: u16,
    pub dst_port: u16,
    pub transport: Transport,
    pub payload_offset: usize,
    pub payload_len: usize,
    pub five_tuple: FiveTuple,
}

impl PacketDescriptor {
    pub fn protocol_name(&self) -> &'static str {
        protocol_name(self.proto)
    }

    pub fn tcp_flags(&self) -> Option<TcpFlags> {
        match self.transport {
            Transport::Tcp { flags, .. } => Some(flags),
            _ => None,
        }
    }

    #[inline]
    pub fn is_tcp(&self) -> bool {
        matches!(self.transport, Transport::Tcp { .. })
    }

    #[inline]
    pub fn is_udp(&self) -> bool {
        matches!(self.transport, Transport::Udp { .. })
    }

    /// Payload bytes of the record this descriptor was built from
    pub fn payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        data.get(self.payload_offset..self.payload_offset + self.payload_len)
            .unwrap_or(&[])
    }
}

/// Reason a packet could not be dissected
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Malformed(pub &'static str);

impl fmt::Display for Malformed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "malformed packet: {}", self.0)
    }
}

/// Dissect the Ethernet, IPv4 and transport headers of `data`
///
/// `index` and `ts` are copied into the descriptor; no state is kept across calls.
pub fn dissect(data: &[u8], index: usize, ts: Timestamp) -> Result<PacketDescriptor, Malformed> {
    let eth = EthernetPacket::new(data).ok_or(Malformed("frame shorter than ethernet header"))?;
    if eth.get_ethertype() != EtherTypes::Ipv4 {
        return Err(Malformed("not ipv4"));
    }

    let l3 = &data[ETHERNET_HEADER_LEN..];
    let ipv4 = Ipv4Packet::new(l3).ok_or(Malformed("truncated ipv4 header"))?;
    if ipv4.get_version() != 4 {
        return Err(Malformed("bad ip version"));
    }
    let ip_header_len = ipv4.get_header_length() as usize * 4;
    if ip_header_len < IPV4_MIN_HEADER_LEN || ip_header_len > l3.len() {
        return Err(Malformed("bad ipv4 header length"));
    }
    let l4_proto = ipv4.get_next_level_protocol();
    let l4_offset = ETHERNET_HEADER_LEN + ip_header_len;
    let l4 = &data[l4_offset..];

    let (transport, src_port, dst_port, l4_header_len) = match l4_proto {
        IpNextHeaderProtocols::Tcp => {
            let tcp = TcpPacket::new(l4).ok_or(Malformed("truncated tcp header"))?;
            let header_len = tcp.get_data_offset() as usize * 4;
            if header_len < TCP_MIN_HEADER_LEN || header_len > l4.len() {
                return Err(Malformed("bad tcp data offset"));
            }
            let transport = Transport::Tcp {
                seq: tcp.get_sequence(),
                ack: tcp.get_acknowledgement(),
                // read the raw byte: NS/CWR/ECE are not reported
                flags: TcpFlags(l4[13]),
                window: tcp.get_window(),
                header_len,
            };
            (transport, tcp.get_source(), tcp.get_destination(), header_len)
        }
        IpNextHeaderProtocols::Udp => {
            let udp = UdpPacket::new(l4).ok_or(Malformed("truncated udp header"))?;
            let transport = Transport::Udp {
                length: udp.get_length(),
            };
            (transport, udp.get_source(), udp.get_destination(), UDP_HEADER_LEN)
        }
        _ => (Transport::None, 0, 0, 0),
    };

    let payload_offset = l4_offset + l4_header_len;
    let payload_len = data.len().saturating_sub(payload_offset);
    let (src_ip, dst_ip) = (ipv4.get_source(), ipv4.get_destination());
    let proto = l4_proto.0;

    trace!(
        "#{} {} {}:{} -> {}:{} payload {}",
        index,
        protocol_name(proto),
        src_ip,
        src_port,
        dst_ip,
        dst_port,
        payload_len
    );

    Ok(PacketDescriptor {
        index,
        ts,
        length: data.len(),
        src_mac: eth.get_source(),
        dst_mac: eth.get_destination(),
        src_ip,
        dst_ip,
        proto,
        ttl: ipv4.get_ttl(),
        ip_total_length: ipv4.get_total_length(),
        src_port,
        dst_port,
        transport,
        payload_offset,
        payload_len,
        five_tuple: FiveTuple::new(proto, src_ip, src_port, dst_ip, dst_port),
    })
}
