use crate::timestamp::Timestamp;

/// Per-record parsing context
#[derive(Clone, Debug, Default)]
pub struct ParseContext {
    /// Index of current record in the capture file (starting at 1)
    pub pcap_index: usize,
    /// Timestamp of first record seen
    pub first_packet_ts: Timestamp,
    /// Timestamp of current record, relative to the first one
    pub rel_ts: Timestamp,
}
