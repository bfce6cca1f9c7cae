//! Analysis results and their store
//!
//! A run's result is created `pending`, moves to `processing` when the run starts,
//! and ends either `completed` (fully populated) or `failed` (with an error message).

use crate::error::AnalysisError;
use crate::flow::{Flow, FlowID};
use indexmap::IndexMap;
use libpcap_tools::{CaptureInfo, Timestamp};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use time::OffsetDateTime;

pub type RunId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Processing => "processing",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    /// Completed and failed runs never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current time, as unix seconds
pub(crate) fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Global header information of the analyzed capture
#[derive(Clone, Debug, Default, Serialize)]
pub struct CaptureMeta {
    /// `major.minor`
    pub version: String,
    pub link_type: i32,
    pub snaplen: u32,
    pub big_endian: bool,
    pub first_packet: Option<Timestamp>,
    pub last_packet: Option<Timestamp>,
    /// Seconds between first and last packet
    pub duration: f64,
}

impl From<&CaptureInfo> for CaptureMeta {
    fn from(info: &CaptureInfo) -> Self {
        CaptureMeta {
            version: format!("{}.{}", info.version_major, info.version_minor),
            link_type: info.link_type,
            snaplen: info.snaplen,
            big_endian: info.big_endian,
            ..CaptureMeta::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Records in the capture
    pub total_packets: u64,
    /// Records whose headers could be dissected
    pub parsed_packets: u64,
    /// Bytes of parsed packets
    pub total_bytes: u64,
    pub tcp: u64,
    pub udp: u64,
    pub icmp: u64,
    pub other: u64,
    pub flow_count: u64,
    pub forwarded: u64,
    pub dropped: u64,
    /// Decoding stopped on a corrupted record
    pub truncated: bool,
}

/// Name seen in the capture, with the label of the packet it was first seen in
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DetectedDomain {
    pub domain: String,
    pub app: String,
    /// `sni`, `http_host` or `dns_query`
    pub source: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct PacketSummary {
    pub index: usize,
    pub ts: Timestamp,
    pub length: usize,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: &'static str,
    pub ttl: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
    pub payload_len: usize,
    pub app: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_query: Option<String>,
    /// Position of the flow in `AnalysisResult::flows`
    pub flow: FlowID,
    pub blocked: bool,
}

/// Description of the input of a run
#[derive(Clone, Debug, Default)]
pub struct RunMetadata {
    pub filename: String,
}

impl RunMetadata {
    pub fn for_path(path: &Path) -> Self {
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        RunMetadata { filename }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct AnalysisResult {
    pub id: RunId,
    pub filename: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub progress: u8,
    pub created_at: i64,
    pub completed_at: Option<i64>,
    pub capture: Option<CaptureMeta>,
    pub summary: Summary,
    pub applications: IndexMap<String, u64>,
    pub protocols: IndexMap<String, u64>,
    pub domains: Vec<DetectedDomain>,
    pub flows: Vec<Flow>,
    pub packets: Vec<PacketSummary>,
}

impl AnalysisResult {
    pub fn pending(id: RunId, meta: RunMetadata) -> Self {
        AnalysisResult {
            id,
            filename: meta.filename,
            status: RunStatus::Pending,
            error: None,
            progress: 0,
            created_at: unix_now(),
            completed_at: None,
            capture: None,
            summary: Summary::default(),
            applications: IndexMap::new(),
            protocols: IndexMap::new(),
            domains: Vec::new(),
            flows: Vec::new(),
            packets: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Change applied to a stored result
#[derive(Debug)]
pub enum ResultPatch {
    Processing,
    Progress(u8),
    Completed(Box<AnalysisResult>),
    Failed(String),
}

/// Storage for run results
pub trait ResultStore: Send + Sync {
    /// Create a pending result and return its identifier
    fn create_pending(&self, meta: RunMetadata) -> RunId;
    fn update(&self, id: RunId, patch: ResultPatch) -> Result<(), AnalysisError>;
    fn get(&self, id: RunId) -> Option<AnalysisResult>;
}

/// Result store held in memory
#[derive(Debug)]
pub struct MemoryResultStore {
    next_id: AtomicU64,
    results: Mutex<HashMap<RunId, AnalysisResult>>,
}

impl Default for MemoryResultStore {
    fn default() -> Self {
        MemoryResultStore {
            next_id: AtomicU64::new(1),
            results: Mutex::new(HashMap::new()),
        }
    }
}

impl MemoryResultStore {
    pub fn new() -> Self {
        MemoryResultStore::default()
    }

    pub fn len(&self) -> usize {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultStore for MemoryResultStore {
    fn create_pending(&self, meta: RunMetadata) -> RunId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let result = AnalysisResult::pending(id, meta);
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, result);
        id
    }

    fn update(&self, id: RunId, patch: ResultPatch) -> Result<(), AnalysisError> {
        let mut results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = results.get_mut(&id).ok_or(AnalysisError::UnknownRun(id))?;
        if entry.status.is_terminal() {
            warn!("run {} is {}, ignoring update {}", id, entry.status, patch_name(&patch));
            return Ok(());
        }
        match patch {
            ResultPatch::Processing => entry.status = RunStatus::Processing,
            ResultPatch::Progress(p) => entry.progress = p.min(100),
            ResultPatch::Completed(result) => {
                let created_at = entry.created_at;
                *entry = *result;
                entry.id = id;
                entry.created_at = created_at;
                entry.status = RunStatus::Completed;
                entry.error = None;
                entry.progress = 100;
                if entry.completed_at.is_none() {
                    entry.completed_at = Some(unix_now());
                }
            }
            ResultPatch::Failed(msg) => {
                entry.status = RunStatus::Failed;
                entry.error = Some(msg);
                entry.completed_at = Some(unix_now());
            }
        }
        Ok(())
    }

    fn get(&self, id: RunId) -> Option<AnalysisResult> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }
}

fn patch_name(patch: &ResultPatch) -> &'static str {
    match patch {
        ResultPatch::Processing => "processing",
        ResultPatch::Progress(_) => "progress",
        ResultPatch::Completed(_) => "completed",
        ResultPatch::Failed(_) => "failed",
    }
}
