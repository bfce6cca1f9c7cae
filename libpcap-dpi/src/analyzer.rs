use crate::dpi::Inspector;
use crate::flow::FlowTable;
use crate::packet::{dissect, PacketDescriptor, IPPROTO_ICMP, IPPROTO_TCP, IPPROTO_UDP};
use crate::progress::{ProgressEvent, ProgressSender, ProgressTracker};
use crate::result::*;
use crate::rules::RuleSet;
use fnv::FnvHashSet;
use indexmap::IndexMap;
use libpcap_tools::{CaptureInfo, Config, Error, PacketRecord, ParseContext, PcapAnalyzer, Timestamp};
use std::sync::Arc;

pub const DEFAULT_PACKET_SUMMARY_LIMIT: usize = 5000;
pub const DEFAULT_PROGRESS_STEP: u8 = 10;

/// Per-run analysis options
#[derive(Clone, Debug)]
pub struct AnalyzerOptions {
    /// Packets beyond this count are aggregated but not listed individually
    pub packet_summary_limit: usize,
    /// Progress is reported every `progress_step_percent` percent of records
    pub progress_step_percent: u8,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        AnalyzerOptions {
            packet_summary_limit: DEFAULT_PACKET_SUMMARY_LIMIT,
            progress_step_percent: DEFAULT_PROGRESS_STEP,
        }
    }
}

impl AnalyzerOptions {
    pub fn from_config(config: &Config) -> Self {
        let default = AnalyzerOptions::default();
        let packet_summary_limit = config
            .get_usize("packet_summary_limit")
            .unwrap_or(default.packet_summary_limit);
        let progress_step_percent = config
            .get_usize("progress_step_percent")
            .map(|p| p.clamp(1, 100) as u8)
            .unwrap_or(default.progress_step_percent);
        AnalyzerOptions {
            packet_summary_limit,
            progress_step_percent,
        }
    }
}

/// Single-pass analyzer for one run
///
/// Packets are dissected, inspected, grouped in flows and checked against the
/// run's rule snapshot, strictly in file order.
pub struct DpiAnalyzer {
    run_id: RunId,
    options: AnalyzerOptions,
    inspector: Inspector,
    rules: RuleSet,
    progress: ProgressSender,
    results: Option<Arc<dyn ResultStore>>,
    tracker: ProgressTracker,

    capture: Option<CaptureMeta>,
    first_ts: Option<Timestamp>,
    last_ts: Option<Timestamp>,
    summary: Summary,
    flows: FlowTable,
    applications: IndexMap<String, u64>,
    protocols: IndexMap<String, u64>,
    domains: Vec<DetectedDomain>,
    seen_domains: FnvHashSet<String>,
    packets: Vec<PacketSummary>,
}

impl DpiAnalyzer {
    pub fn new(run_id: RunId, inspector: Inspector, rules: RuleSet, options: AnalyzerOptions) -> Self {
        let tracker = ProgressTracker::new(0, options.progress_step_percent);
        DpiAnalyzer {
            run_id,
            options,
            inspector,
            rules,
            progress: ProgressSender::disabled(),
            results: None,
            tracker,
            capture: None,
            first_ts: None,
            last_ts: None,
            summary: Summary::default(),
            flows: FlowTable::new(),
            applications: IndexMap::new(),
            protocols: IndexMap::new(),
            domains: Vec::new(),
            seen_domains: FnvHashSet::default(),
            packets: Vec::new(),
        }
    }

    pub fn with_progress(self, progress: ProgressSender) -> Self {
        DpiAnalyzer { progress, ..self }
    }

    /// Record progress on the run's stored result at each progress step
    pub fn with_result_store(self, results: Arc<dyn ResultStore>) -> Self {
        DpiAnalyzer {
            results: Some(results),
            ..self
        }
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn flows(&self) -> &FlowTable {
        &self.flows
    }

    fn handle_descriptor(&mut self, data: &[u8], desc: &PacketDescriptor) {
        self.summary.parsed_packets += 1;
        self.summary.total_bytes += desc.length as u64;
        match desc.proto {
            IPPROTO_TCP => self.summary.tcp += 1,
            IPPROTO_UDP => self.summary.udp += 1,
            IPPROTO_ICMP => self.summary.icmp += 1,
            _ => self.summary.other += 1,
        }
        *self
            .protocols
            .entry(desc.protocol_name().to_owned())
            .or_insert(0) += 1;

        let dpi = self.inspector.inspect(data, desc);

        let (flow_id, created) = self.flows.lookup_or_insert(desc);
        let flow = &mut self.flows[flow_id];
        flow.update(desc);
        if flow.adopt(&dpi) && !created {
            trace!("flow {} identified as {}", flow_id, flow.app);
        }

        let (name, app) = flow.effective(&dpi);
        let label = app.to_owned();
        let matched = if flow.blocked {
            None
        } else {
            self.rules.check(desc, name, app)
        };
        if let Some(rule) = matched {
            debug!(
                "#{} flow {} blocked by rule {} {}",
                desc.index, flow.key, rule, rule.description
            );
            flow.block();
        }
        let blocked = flow.blocked;

        if blocked {
            self.summary.dropped += 1;
        } else {
            self.summary.forwarded += 1;
        }

        if let Some(name) = &dpi.detected {
            if !self.seen_domains.contains(name.as_str()) {
                self.seen_domains.insert(name.as_str().to_owned());
                self.domains.push(DetectedDomain {
                    domain: name.as_str().to_owned(),
                    app: dpi.app.clone(),
                    source: name.source(),
                });
            }
        }

        if self.packets.len() < self.options.packet_summary_limit {
            self.packets.push(PacketSummary {
                index: desc.index,
                ts: desc.ts,
                length: desc.length,
                src_ip: desc.src_ip,
                dst_ip: desc.dst_ip,
                src_port: desc.src_port,
                dst_port: desc.dst_port,
                protocol: desc.protocol_name(),
                ttl: desc.ttl,
                flags: desc.tcp_flags().map(|f| f.to_string()),
                payload_len: desc.payload_len,
                app: label.clone(),
                domain: dpi.domain().map(|s| s.to_owned()),
                dns_query: dpi.dns_query().map(|s| s.to_owned()),
                flow: flow_id,
                blocked,
            });
        }

        *self.applications.entry(label).or_insert(0) += 1;
    }

    /// Build the completed result of the run
    pub fn into_result(self, id: RunId, meta: RunMetadata) -> AnalysisResult {
        let mut result = AnalysisResult::pending(id, meta);
        let mut capture = self.capture.unwrap_or_default();
        if let (Some(first), Some(last)) = (self.first_ts, self.last_ts) {
            capture.first_packet = Some(first);
            capture.last_packet = Some(last);
            capture.duration = (last - first).as_secs_f64();
        }
        let mut summary = self.summary;
        summary.flow_count = self.flows.len() as u64;
        result.status = RunStatus::Completed;
        result.progress = 100;
        result.completed_at = Some(unix_now());
        result.capture = Some(capture);
        result.summary = summary;
        result.applications = self.applications;
        result.protocols = self.protocols;
        result.domains = self.domains;
        result.flows = self.flows.into_flows();
        result.packets = self.packets;
        result
    }
}

impl PcapAnalyzer for DpiAnalyzer {
    fn init(&mut self, info: &CaptureInfo, num_records: usize) -> Result<(), Error> {
        info!(
            "run {}: {} records, pcap v{}.{}",
            self.run_id, num_records, info.version_major, info.version_minor
        );
        self.capture = Some(CaptureMeta::from(info));
        self.tracker = ProgressTracker::new(num_records, self.options.progress_step_percent);
        Ok(())
    }

    fn handle_packet(&mut self, record: &PacketRecord, ctx: &ParseContext) -> Result<(), Error> {
        self.summary.total_packets += 1;
        if self.first_ts.is_none() {
            self.first_ts = Some(record.ts);
        }
        self.last_ts = Some(record.ts);

        match dissect(record.data, ctx.pcap_index, record.ts) {
            Ok(desc) => self.handle_descriptor(record.data, &desc),
            Err(e) => trace!("#{} skipped: {}", ctx.pcap_index, e),
        }

        if let Some(percent) = self.tracker.update(ctx.pcap_index) {
            if let Some(results) = &self.results {
                if let Err(e) = results.update(self.run_id, ResultPatch::Progress(percent)) {
                    debug!("run {}: progress not stored: {}", self.run_id, e);
                }
            }
            self.progress.emit(ProgressEvent::new(
                self.run_id,
                RunStatus::Processing,
                percent,
                format!("Processed {} packets", ctx.pcap_index),
            ));
        }
        Ok(())
    }

    fn teardown(&mut self) {
        let blocked = self.flows.iter().filter(|flow| flow.blocked).count();
        debug!(
            "run {}: {} packets, {} parsed, {} flows ({} blocked), {} dropped",
            self.run_id,
            self.summary.total_packets,
            self.summary.parsed_packets,
            self.flows.len(),
            blocked,
            self.summary.dropped
        );
        if self.flows.is_empty() && self.summary.total_packets > 0 {
            warn!("run {}: no packet could be dissected", self.run_id);
        }
    }
}
