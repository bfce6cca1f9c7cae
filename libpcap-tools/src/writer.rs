use crate::capture::{PacketRecord, LINKTYPE_ETHERNET, MAX_RECORD_LEN};
use crate::error::Error;
use pcap_parser::{LegacyPcapBlock, Linktype, PcapHeader, ToVec};
use std::io::Write;

/// Writer for the legacy pcap format
///
/// The global header is always normalized (native byte order, version 2.4,
/// snaplen 65535, Ethernet), whatever the source file declared.
pub struct PcapWriter<W>
where
    W: Write,
{
    w: W,
    written: usize,
}

impl<W: Write> PcapWriter<W> {
    pub fn new(w: W) -> Self {
        PcapWriter { w, written: 0 }
    }

    /// Write the global header
    pub fn init_file(&mut self) -> Result<usize, Error> {
        let mut hdr = PcapHeader::new();
        hdr.snaplen = MAX_RECORD_LEN;
        hdr.network = Linktype(LINKTYPE_ETHERNET);
        let s = hdr
            .to_vec_raw()
            .map_err(|e| Error::Serialize(format!("pcap header: {:?}", e)))?;
        self.w.write_all(&s)?;
        Ok(s.len())
    }

    /// Write one record; captured and original lengths are both set to the data length
    pub fn write_record(&mut self, record: &PacketRecord) -> Result<usize, Error> {
        let len = record.data.len() as u32;
        let block = LegacyPcapBlock {
            ts_sec: record.ts.secs,
            ts_usec: record.ts.micros,
            caplen: len,
            origlen: len,
            data: record.data,
        };
        let s = block
            .to_vec_raw()
            .map_err(|e| Error::Serialize(format!("pcap record: {:?}", e)))?;
        self.w.write_all(&s)?;
        self.written += 1;
        Ok(s.len())
    }

    /// Number of records written so far
    pub fn records_written(&self) -> usize {
        self.written
    }

    pub fn into_inner(mut self) -> Result<W, Error> {
        self.w.flush()?;
        Ok(self.w)
    }
}

/// Encode records into a complete, standalone capture file
pub fn encode<'r, 'a: 'r, I>(records: I) -> Result<Vec<u8>, Error>
where
    I: IntoIterator<Item = &'r PacketRecord<'a>>,
{
    let mut writer = PcapWriter::new(Vec::new());
    writer.init_file()?;
    for record in records {
        writer.write_record(record)?;
    }
    writer.into_inner()
}
