//! Packet dissection, deep packet inspection and flow analysis of pcap files
//!
//! A run decodes a capture with `libpcap_tools::PcapEngine` and feeds every record
//! to a `DpiAnalyzer`, which builds flows, applies block rules and fills an
//! `AnalysisResult`. `Pipeline` runs analyses in the background, reports progress,
//! and produces filtered copies of captures.

#[macro_use]
extern crate log;

mod analyzer;
pub mod dpi;
mod error;
mod export;
mod flow;
pub mod packet;
mod pipeline;
mod progress;
mod result;
mod rules;

#[doc(hidden)]
pub mod test_utils;

pub use analyzer::*;
pub use error::AnalysisError;
pub use export::*;
pub use flow::*;
pub use pipeline::*;
pub use progress::*;
pub use result::*;
pub use rules::*;
