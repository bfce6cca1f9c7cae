use crate::analyzer::PcapAnalyzer;
use crate::cancel::CancelToken;
use crate::capture::{self, CaptureInfo};
use crate::context::ParseContext;
use crate::error::Error;

/// Capture analyzer engine
///
/// `PcapEngine` decodes a capture held in memory, and calls the wrapped
/// `PcapAnalyzer` for each record, strictly in file order.
///
/// ## example
///
/// ```
/// use libpcap_tools::{Error, PacketRecord, ParseContext, PcapAnalyzer, PcapEngine};
/// #[derive(Default)]
/// pub struct CountAnalyzer {
///     packet_count: usize,
/// }
///
/// impl PcapAnalyzer for CountAnalyzer {
///     fn handle_packet(&mut self, _record: &PacketRecord, _ctx: &ParseContext) -> Result<(), Error> {
///         self.packet_count += 1;
///         Ok(())
///     }
/// }
///
/// let mut engine = PcapEngine::new(CountAnalyzer::default());
/// // not a capture file
/// assert!(engine.run(&[1, 2, 3, 4, 5]).is_err());
/// ```
pub struct PcapEngine<A: PcapAnalyzer> {
    analyzer: A,
    cancel: Option<CancelToken>,
}

/// Outcome of a complete engine run
#[derive(Clone, Debug)]
pub struct RunInfo {
    pub info: CaptureInfo,
    pub num_records: usize,
    pub truncated: bool,
}

impl<A: PcapAnalyzer> PcapEngine<A> {
    pub fn new(analyzer: A) -> Self {
        PcapEngine {
            analyzer,
            cancel: None,
        }
    }

    /// Stop the run with `Error::Cancelled` once `token` is cancelled
    pub fn with_cancel_token(self, token: CancelToken) -> Self {
        PcapEngine {
            cancel: Some(token),
            ..self
        }
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    pub fn analyzer_mut(&mut self) -> &mut A {
        &mut self.analyzer
    }

    pub fn into_analyzer(self) -> A {
        self.analyzer
    }

    /// Main function: decode `data` and call analyzer for each record
    pub fn run(&mut self, data: &[u8]) -> Result<RunInfo, Error> {
        let capture = capture::decode(data)?;
        let num_records = capture.records.len();
        self.analyzer.init(&capture.info, num_records)?;

        let mut ctx = ParseContext::default();
        for record in capture.records.iter() {
            if let Some(token) = &self.cancel {
                if token.is_cancelled() {
                    info!("run cancelled before record {}", ctx.pcap_index + 1);
                    return Err(Error::Cancelled);
                }
            }
            ctx.pcap_index += 1;
            if ctx.pcap_index == 1 {
                ctx.first_packet_ts = record.ts;
            }
            // an underflow is weird but not critical
            ctx.rel_ts = record.ts - ctx.first_packet_ts;
            trace!("record {} time {} (rel {})", ctx.pcap_index, record.ts, ctx.rel_ts);
            self.analyzer.handle_packet(record, &ctx)?;
        }

        self.analyzer.teardown();
        Ok(RunInfo {
            info: capture.info,
            num_records,
            truncated: capture.truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PacketRecord;
    use crate::timestamp::Timestamp;
    use crate::writer::encode;

    #[derive(Default)]
    struct Collect {
        expected: usize,
        seen: Vec<(usize, usize, Timestamp)>,
        torn_down: bool,
    }

    impl PcapAnalyzer for Collect {
        fn init(&mut self, _info: &CaptureInfo, num_records: usize) -> Result<(), Error> {
            self.expected = num_records;
            Ok(())
        }

        fn handle_packet(&mut self, record: &PacketRecord, ctx: &ParseContext) -> Result<(), Error> {
            self.seen.push((ctx.pcap_index, record.data.len(), ctx.rel_ts));
            Ok(())
        }

        fn teardown(&mut self) {
            self.torn_down = true;
        }
    }

    fn sample() -> Vec<u8> {
        let data: [&[u8]; 3] = [b"a", b"bb", b"ccc"];
        let records: Vec<_> = data
            .into_iter()
            .enumerate()
            .map(|(i, d)| PacketRecord {
                ts: Timestamp::new(10 + i as u32, 500_000),
                caplen: d.len() as u32,
                origlen: d.len() as u32,
                data: d,
            })
            .collect();
        encode(&records).expect("encode")
    }

    #[test]
    fn engine_delivers_records_in_order() {
        let file = sample();
        let mut engine = PcapEngine::new(Collect::default());
        let run = engine.run(&file).expect("run");
        assert_eq!(run.num_records, 3);
        assert!(!run.truncated);
        let a = engine.into_analyzer();
        assert_eq!(a.expected, 3);
        assert!(a.torn_down);
        assert_eq!(
            a.seen,
            vec![
                (1, 1, Timestamp::new(0, 0)),
                (2, 2, Timestamp::new(1, 0)),
                (3, 3, Timestamp::new(2, 0)),
            ]
        );
    }

    #[test]
    fn engine_honours_cancel_token() {
        let file = sample();
        let token = CancelToken::new();
        token.cancel();
        let mut engine = PcapEngine::new(Collect::default()).with_cancel_token(token);
        assert!(matches!(engine.run(&file), Err(Error::Cancelled)));
        assert!(engine.analyzer().seen.is_empty());
        assert!(!engine.analyzer().torn_down);
    }
}
