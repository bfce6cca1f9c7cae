//! Filtered re-export of a capture
//!
//! Records are checked against a fresh rule snapshot and written, unchanged, to a
//! new capture unless blocked. Verdicts follow the same flow logic as the
//! analysis (first name wins, blocking is sticky), so a packet dropped in the
//! analysis result is also dropped from the export.

use crate::dpi::Inspector;
use crate::flow::FlowTable;
use crate::packet::dissect;
use crate::rules::RuleSet;
use libpcap_tools::{CaptureInfo, Error, PacketRecord, ParseContext, PcapAnalyzer, PcapWriter};
use serde::Serialize;
use std::io::Write;

/// Verdict for one record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Drop,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    pub total: u64,
    /// Records written, including unparsed ones
    pub forwarded: u64,
    pub dropped: u64,
    /// Records that could not be dissected (always kept)
    pub unparsed: u64,
}

/// Analyzer writing every accepted record to a `PcapWriter`
pub struct ExportFilter<W: Write> {
    writer: PcapWriter<W>,
    inspector: Inspector,
    rules: RuleSet,
    flows: FlowTable,
    stats: ExportStats,
}

impl<W: Write> ExportFilter<W> {
    pub fn new(w: W, inspector: Inspector, rules: RuleSet) -> Self {
        ExportFilter {
            writer: PcapWriter::new(w),
            inspector,
            rules,
            flows: FlowTable::new(),
            stats: ExportStats::default(),
        }
    }

    pub fn stats(&self) -> &ExportStats {
        &self.stats
    }

    /// Flush and return the underlying writer
    pub fn into_inner(self) -> Result<W, Error> {
        self.writer.into_inner()
    }

    fn verdict(&mut self, record: &PacketRecord, ctx: &ParseContext) -> Verdict {
        let data = record.data;
        let desc = match dissect(data, ctx.pcap_index, record.ts) {
            Ok(desc) => desc,
            Err(e) => {
                trace!("#{} kept unparsed: {}", ctx.pcap_index, e);
                self.stats.unparsed += 1;
                return Verdict::Accept;
            }
        };
        let dpi = self.inspector.inspect(data, &desc);
        let (id, _) = self.flows.lookup_or_insert(&desc);
        let flow = &mut self.flows[id];
        flow.adopt(&dpi);
        if !flow.blocked {
            let (name, app) = flow.effective(&dpi);
            if self.rules.check(&desc, name, app).is_some() {
                flow.block();
            }
        }
        if flow.blocked {
            Verdict::Drop
        } else {
            Verdict::Accept
        }
    }
}

impl<W: Write> PcapAnalyzer for ExportFilter<W> {
    fn init(&mut self, _info: &CaptureInfo, _num_records: usize) -> Result<(), Error> {
        self.writer.init_file()?;
        Ok(())
    }

    fn handle_packet(&mut self, record: &PacketRecord, ctx: &ParseContext) -> Result<(), Error> {
        self.stats.total += 1;
        match self.verdict(record, ctx) {
            Verdict::Accept => {
                self.writer.write_record(record)?;
                self.stats.forwarded += 1;
            }
            Verdict::Drop => {
                trace!("#{} dropped", ctx.pcap_index);
                self.stats.dropped += 1;
            }
        }
        Ok(())
    }
}
