use crate::capture::{CaptureInfo, PacketRecord};
use crate::context::ParseContext;
use crate::error::Error;

/// Common trait for capture analyzers
pub trait PcapAnalyzer {
    /// Initialization function, called after the global header was decoded (optional)
    ///
    /// `num_records` is the number of records that will be delivered.
    fn init(&mut self, _info: &CaptureInfo, _num_records: usize) -> Result<(), Error> {
        Ok(())
    }

    /// Callback function for every record, in file order
    fn handle_packet(&mut self, record: &PacketRecord, ctx: &ParseContext) -> Result<(), Error>;

    /// Teardown function, called after the last record (optional)
    fn teardown(&mut self) {}
}
