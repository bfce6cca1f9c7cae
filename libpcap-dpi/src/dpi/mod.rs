//! Deep packet inspection: application names from payloads
//!
//! The inspector extracts at most one name per packet (TLS SNI, HTTP Host or DNS
//! query, depending on transport and ports), then maps it to an application label
//! with the shared `AppTable`. Malformed payloads never raise: they just give no
//! name, and the label falls back to port heuristics.

mod classify;
pub mod dns;
pub mod http;
pub mod tls;

pub use classify::{AppEntry, AppTable};

use crate::packet::PacketDescriptor;
use std::fmt;
use std::sync::Arc;

pub const APP_UNKNOWN: &str = "Unknown";
pub const APP_HTTPS: &str = "HTTPS";
pub const APP_HTTP: &str = "HTTP";
pub const APP_DNS: &str = "DNS";

const PORT_HTTPS: u16 = 443;
const PORT_HTTP: u16 = 80;
const PORT_DNS: u16 = 53;
/// ClientHello parsing needs more than the record header
const MIN_TLS_PAYLOAD: usize = 5;

/// Name found in a payload, tagged with its origin
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectedName {
    Sni(String),
    HttpHost(String),
    DnsQuery(String),
}

impl DetectedName {
    pub fn as_str(&self) -> &str {
        match self {
            DetectedName::Sni(s) | DetectedName::HttpHost(s) | DetectedName::DnsQuery(s) => s,
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            DetectedName::Sni(_) => "sni",
            DetectedName::HttpHost(_) => "http_host",
            DetectedName::DnsQuery(_) => "dns_query",
        }
    }
}

impl fmt::Display for DetectedName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inspection result for one packet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DpiResult {
    pub detected: Option<DetectedName>,
    pub app: String,
}

impl DpiResult {
    /// Extracted name, whatever its source
    pub fn domain(&self) -> Option<&str> {
        self.detected.as_ref().map(DetectedName::as_str)
    }

    pub fn sni(&self) -> Option<&str> {
        match &self.detected {
            Some(DetectedName::Sni(s)) => Some(s),
            _ => None,
        }
    }

    pub fn http_host(&self) -> Option<&str> {
        match &self.detected {
            Some(DetectedName::HttpHost(s)) => Some(s),
            _ => None,
        }
    }

    pub fn dns_query(&self) -> Option<&str> {
        match &self.detected {
            Some(DetectedName::DnsQuery(s)) => Some(s),
            _ => None,
        }
    }
}

/// Label derived from ports alone
pub fn port_label(desc: &PacketDescriptor) -> &'static str {
    if desc.dst_port == PORT_HTTPS {
        APP_HTTPS
    } else if desc.dst_port == PORT_HTTP {
        APP_HTTP
    } else if desc.src_port == PORT_DNS || desc.dst_port == PORT_DNS {
        APP_DNS
    } else {
        APP_UNKNOWN
    }
}

/// Packet inspector, sharing a read-only application table
#[derive(Clone, Debug)]
pub struct Inspector {
    table: Arc<AppTable>,
}

impl Default for Inspector {
    fn default() -> Self {
        Inspector::new(Arc::new(AppTable::default()))
    }
}

impl Inspector {
    pub fn new(table: Arc<AppTable>) -> Self {
        Inspector { table }
    }

    pub fn table(&self) -> &AppTable {
        &self.table
    }

    /// Inspect the payload of the record `data`, described by `desc`
    pub fn inspect(&self, data: &[u8], desc: &PacketDescriptor) -> DpiResult {
        let payload = desc.payload(data);
        let detected = if payload.is_empty() {
            None
        } else {
            extract_name(payload, desc)
        };
        let app = match &detected {
            Some(DetectedName::Sni(name)) => self.table.classify(name).unwrap_or(APP_HTTPS),
            Some(DetectedName::HttpHost(name)) => self.table.classify(name).unwrap_or(APP_HTTP),
            // the query name is still reported, but the label does not depend on it
            Some(DetectedName::DnsQuery(_)) => APP_DNS,
            None => port_label(desc),
        };
        if let Some(name) = &detected {
            debug!("#{} {} {} -> {}", desc.index, name.source(), name, app);
        }
        DpiResult {
            app: app.to_owned(),
            detected,
        }
    }
}

fn extract_name(payload: &[u8], desc: &PacketDescriptor) -> Option<DetectedName> {
    if desc.is_tcp() && desc.dst_port == PORT_HTTPS {
        if payload.len() > MIN_TLS_PAYLOAD {
            return tls::extract_sni(payload).map(DetectedName::Sni);
        }
        None
    } else if desc.is_tcp() && desc.dst_port == PORT_HTTP {
        http::extract_host(payload).map(DetectedName::HttpHost)
    } else if desc.is_udp() && (desc.src_port == PORT_DNS || desc.dst_port == PORT_DNS) {
        dns::extract_query(payload).map(DetectedName::DnsQuery)
    } else {
        None
    }
}
