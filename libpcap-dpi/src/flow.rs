use crate::dpi::{DpiResult, APP_UNKNOWN};
use crate::packet::PacketDescriptor;
use fnv::FnvBuildHasher;
use indexmap::map::Entry;
use indexmap::IndexMap;
use libpcap_tools::{FiveTuple, Timestamp};
use serde::Serialize;
use std::net::Ipv4Addr;
use std::ops::{Index, IndexMut};

/// Flow identifier: position of the flow in its table
pub type FlowID = usize;

/// Aggregated state of all packets sharing a five-tuple
#[derive(Clone, Debug, Serialize)]
pub struct Flow {
    #[serde(skip)]
    pub five_tuple: FiveTuple,
    /// `srcIP:srcPort-dstIP:dstPort-proto`
    pub key: String,
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_ip: Ipv4Addr,
    pub dst_port: u16,
    pub protocol: &'static str,
    /// First name detected on this flow
    pub name: Option<String>,
    pub app: String,
    pub packets: u64,
    pub bytes: u64,
    /// Sticky: once set, never cleared
    pub blocked: bool,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
}

impl Flow {
    pub fn new(desc: &PacketDescriptor) -> Self {
        Flow {
            five_tuple: desc.five_tuple,
            key: desc.five_tuple.to_string(),
            src_ip: desc.src_ip,
            src_port: desc.src_port,
            dst_ip: desc.dst_ip,
            dst_port: desc.dst_port,
            protocol: desc.protocol_name(),
            name: None,
            app: APP_UNKNOWN.to_owned(),
            packets: 0,
            bytes: 0,
            blocked: false,
            first_seen: desc.ts,
            last_seen: desc.ts,
        }
    }

    /// Account for one more packet
    pub fn update(&mut self, desc: &PacketDescriptor) {
        self.packets += 1;
        self.bytes += desc.length as u64;
        if desc.ts > self.last_seen {
            self.last_seen = desc.ts;
        }
    }

    /// Adopt the name and label of `dpi` if the flow is not identified yet
    ///
    /// The first name wins and is never replaced. Before any name is seen, a port
    /// label may replace `Unknown`, but not another label.
    pub fn adopt(&mut self, dpi: &DpiResult) -> bool {
        if self.name.is_some() {
            return false;
        }
        if let Some(name) = dpi.domain() {
            self.name = Some(name.to_owned());
            self.app.clone_from(&dpi.app);
            return true;
        }
        if self.app == APP_UNKNOWN && dpi.app != APP_UNKNOWN {
            self.app.clone_from(&dpi.app);
            return true;
        }
        false
    }

    /// Name and label to evaluate rules against for a packet of this flow
    ///
    /// An identified flow imposes its own; otherwise the packet's result is used.
    pub fn effective<'a>(&'a self, dpi: &'a DpiResult) -> (Option<&'a str>, &'a str) {
        match &self.name {
            Some(name) => (Some(name.as_str()), self.app.as_str()),
            None => (dpi.domain(), dpi.app.as_str()),
        }
    }

    /// Mark the flow blocked. There is no way back.
    #[inline]
    pub fn block(&mut self) {
        self.blocked = true;
    }
}

/// Flows of one run, in order of first appearance
#[derive(Default)]
pub struct FlowTable {
    flows: IndexMap<FiveTuple, Flow, FnvBuildHasher>,
}

impl FlowTable {
    pub fn new() -> Self {
        FlowTable::default()
    }

    /// Return the flow ID for the packet's five-tuple, creating the flow if needed
    ///
    /// The boolean is true if the flow was created.
    pub fn lookup_or_insert(&mut self, desc: &PacketDescriptor) -> (FlowID, bool) {
        match self.flows.entry(desc.five_tuple) {
            Entry::Occupied(e) => (e.index(), false),
            Entry::Vacant(e) => {
                let id = e.index();
                trace!("new flow {}: {}", id, desc.five_tuple);
                e.insert(Flow::new(desc));
                (id, true)
            }
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flow> {
        self.flows.values()
    }

    pub fn into_flows(self) -> Vec<Flow> {
        self.flows.into_values().collect()
    }
}

impl Index<FlowID> for FlowTable {
    type Output = Flow;

    fn index(&self, id: FlowID) -> &Flow {
        &self.flows[id]
    }
}

impl IndexMut<FlowID> for FlowTable {
    fn index_mut(&mut self, id: FlowID) -> &mut Flow {
        &mut self.flows[id]
    }
}
