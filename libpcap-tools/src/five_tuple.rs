use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;

/// Flow key: layer 4 protocol, addresses and ports
///
/// Ports are 0 when the transport layer has none (e.g ICMP).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub struct FiveTuple {
    pub proto: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl FiveTuple {
    pub fn new(proto: u8, src: Ipv4Addr, src_port: u16, dst: Ipv4Addr, dst_port: u16) -> Self {
        FiveTuple {
            proto,
            src,
            dst,
            src_port,
            dst_port,
        }
    }

    /// Test if either endpoint uses this address
    pub fn has_addr(&self, addr: Ipv4Addr) -> bool {
        self.src == addr || self.dst == addr
    }
}

impl Default for FiveTuple {
    fn default() -> Self {
        FiveTuple::new(0, Ipv4Addr::UNSPECIFIED, 0, Ipv4Addr::UNSPECIFIED, 0)
    }
}

/// Formats as `srcIP:srcPort-dstIP:dstPort-proto`
impl fmt::Display for FiveTuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}-{}",
            self.src, self.src_port, self.dst, self.dst_port, self.proto
        )
    }
}
