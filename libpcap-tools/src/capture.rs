//! Legacy pcap container decoding
//!
//! Only the classic format is accepted, with microsecond timestamps, in either
//! byte order. Record data is never copied: every `PacketRecord` borrows from
//! the input buffer.

use crate::error::Error;
use crate::timestamp::Timestamp;
use pcap_parser::{parse_pcap_frame, parse_pcap_frame_be, parse_pcap_header, LegacyPcapBlock};
use serde::Serialize;

/// Magic number of a file written in the reader's byte order (little-endian)
pub const PCAP_MAGIC: u32 = 0xa1b2_c3d4;
/// Magic number of a file written in the opposite byte order (big-endian)
pub const PCAP_MAGIC_SWAPPED: u32 = 0xd4c3_b2a1;
/// Largest record accepted, whatever the declared snapshot length
pub const MAX_RECORD_LEN: u32 = 65535;
/// Link-type code for Ethernet
pub const LINKTYPE_ETHERNET: i32 = 1;

pub const GLOBAL_HEADER_LEN: usize = 24;
pub const RECORD_HEADER_LEN: usize = 16;

/// Global header information, derived from the first 24 bytes of the file
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CaptureInfo {
    pub big_endian: bool,
    pub version_major: u16,
    pub version_minor: u16,
    pub snaplen: u32,
    pub link_type: i32,
}

/// One record of the capture, borrowing its bytes from the file buffer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketRecord<'a> {
    pub ts: Timestamp,
    pub caplen: u32,
    pub origlen: u32,
    pub data: &'a [u8],
}

/// A decoded capture file
#[derive(Debug)]
pub struct PcapCapture<'a> {
    pub info: CaptureInfo,
    pub records: Vec<PacketRecord<'a>>,
    /// true if decoding stopped on a corrupted or incomplete record
    pub truncated: bool,
}

/// Decode a complete capture file held in memory
///
/// A bad magic number or a short global header is an error. A corrupted
/// record (captured length above the snapshot length or `MAX_RECORD_LEN`, or
/// extending past the end of the file) ends the sequence: records decoded so
/// far are returned and `truncated` is set.
pub fn decode(i: &[u8]) -> Result<PcapCapture, Error> {
    if i.len() < GLOBAL_HEADER_LEN {
        return Err(Error::InvalidFormat("file too short for pcap header"));
    }
    let magic = u32::from_le_bytes([i[0], i[1], i[2], i[3]]);
    let big_endian = match magic {
        PCAP_MAGIC => false,
        PCAP_MAGIC_SWAPPED => true,
        _ => return Err(Error::InvalidFormat("bad magic number")),
    };
    let (mut rem, hdr) =
        parse_pcap_header(i).map_err(|_| Error::InvalidFormat("could not parse pcap header"))?;
    let info = CaptureInfo {
        big_endian,
        version_major: hdr.version_major,
        version_minor: hdr.version_minor,
        snaplen: hdr.snaplen,
        link_type: hdr.network.0,
    };
    debug!(
        "pcap v{}.{} snaplen={} linktype={} big_endian={}",
        info.version_major, info.version_minor, info.snaplen, info.link_type, big_endian
    );

    let mut records = Vec::new();
    let mut truncated = false;
    while rem.len() >= RECORD_HEADER_LEN {
        let caplen = read_u32(&rem[8..12], big_endian);
        if caplen > info.snaplen || caplen > MAX_RECORD_LEN {
            warn!(
                "record {}: captured length {} exceeds snaplen {}, stopping",
                records.len() + 1,
                caplen,
                info.snaplen
            );
            truncated = true;
            break;
        }
        match parse_record(rem, big_endian) {
            Some((next, block)) => {
                records.push(PacketRecord {
                    ts: Timestamp::new(block.ts_sec, block.ts_usec),
                    caplen: block.caplen,
                    origlen: block.origlen,
                    data: block.data,
                });
                rem = next;
            }
            None => {
                warn!(
                    "record {}: data extends past end of file, stopping",
                    records.len() + 1
                );
                truncated = true;
                break;
            }
        }
    }
    if !truncated && !rem.is_empty() {
        debug!("ignoring {} trailing bytes", rem.len());
    }
    Ok(PcapCapture {
        info,
        records,
        truncated,
    })
}

fn parse_record(i: &[u8], big_endian: bool) -> Option<(&[u8], LegacyPcapBlock)> {
    let res = if big_endian {
        parse_pcap_frame_be(i)
    } else {
        parse_pcap_frame(i)
    };
    res.ok()
}

#[inline]
fn read_u32(b: &[u8], big_endian: bool) -> u32 {
    let b = [b[0], b[1], b[2], b[3]];
    if big_endian {
        u32::from_be_bytes(b)
    } else {
        u32::from_le_bytes(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(big_endian: bool, snaplen: u32) -> Vec<u8> {
        let mut v = Vec::new();
        let fields: [u32; 4] = [0, 0, snaplen, 1];
        if big_endian {
            v.extend_from_slice(&PCAP_MAGIC.to_be_bytes());
            v.extend_from_slice(&2u16.to_be_bytes());
            v.extend_from_slice(&4u16.to_be_bytes());
            fields.iter().for_each(|f| v.extend_from_slice(&f.to_be_bytes()));
        } else {
            v.extend_from_slice(&PCAP_MAGIC.to_le_bytes());
            v.extend_from_slice(&2u16.to_le_bytes());
            v.extend_from_slice(&4u16.to_le_bytes());
            fields.iter().for_each(|f| v.extend_from_slice(&f.to_le_bytes()));
        }
        v
    }

    fn record(v: &mut Vec<u8>, big_endian: bool, caplen: u32, data: &[u8]) {
        let fields: [u32; 4] = [1_600_000_000, 250, caplen, caplen];
        for f in fields.iter() {
            if big_endian {
                v.extend_from_slice(&f.to_be_bytes());
            } else {
                v.extend_from_slice(&f.to_le_bytes());
            }
        }
        v.extend_from_slice(data);
    }

    #[test]
    fn decode_little_endian() {
        let mut file = header(false, 65535);
        record(&mut file, false, 4, b"\x01\x02\x03\x04");
        record(&mut file, false, 2, b"\x05\x06");
        let cap = decode(&file).expect("decode");
        assert!(!cap.info.big_endian);
        assert_eq!((cap.info.version_major, cap.info.version_minor), (2, 4));
        assert_eq!(cap.info.link_type, LINKTYPE_ETHERNET);
        assert_eq!(cap.records.len(), 2);
        assert_eq!(cap.records[0].data, b"\x01\x02\x03\x04");
        assert_eq!(cap.records[0].ts, Timestamp::new(1_600_000_000, 250));
        assert_eq!(cap.records[1].caplen, 2);
        assert!(!cap.truncated);
    }

    #[test]
    fn decode_big_endian() {
        let mut file = header(true, 65535);
        record(&mut file, true, 3, b"abc");
        let cap = decode(&file).expect("decode");
        assert!(cap.info.big_endian);
        assert_eq!(cap.info.snaplen, 65535);
        assert_eq!(cap.records.len(), 1);
        assert_eq!(cap.records[0].data, b"abc");
        assert_eq!(cap.records[0].ts.micros, 250);
    }

    #[test]
    fn decode_bad_magic() {
        let mut file = header(false, 65535);
        file[0] = 0x0a;
        assert!(matches!(decode(&file), Err(Error::InvalidFormat(_))));
        // pcap-ng section header
        let ng = b"\x0a\x0d\x0d\x0a\x1c\x00\x00\x00\x4d\x3c\x2b\x1a\x01\x00\x00\x00\xff\xff\xff\xff\xff\xff\xff\xff";
        assert!(matches!(decode(ng), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn decode_short_header() {
        let file = header(false, 65535);
        assert!(matches!(decode(&file[..20]), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn decode_record_past_end_of_file() {
        let mut file = header(false, 65535);
        record(&mut file, false, 2, b"ok");
        record(&mut file, false, 100, b"short");
        let cap = decode(&file).expect("decode");
        assert_eq!(cap.records.len(), 1);
        assert_eq!(cap.records[0].data, b"ok");
        assert!(cap.truncated);
    }

    #[test]
    fn decode_caplen_over_snaplen() {
        let mut file = header(false, 8);
        record(&mut file, false, 8, b"12345678");
        record(&mut file, false, 9, b"123456789");
        record(&mut file, false, 1, b"x");
        let cap = decode(&file).expect("decode");
        assert_eq!(cap.records.len(), 1);
        assert!(cap.truncated);
    }

    #[test]
    fn decode_caplen_over_max_record_len() {
        let mut file = header(false, 262_144);
        let data = vec![0u8; 70_000];
        record(&mut file, false, 70_000, &data);
        let cap = decode(&file).expect("decode");
        assert!(cap.records.is_empty());
        assert!(cap.truncated);
    }

    #[test]
    fn decode_trailing_partial_header() {
        let mut file = header(false, 65535);
        record(&mut file, false, 1, b"x");
        file.extend_from_slice(&[0u8; 10]);
        let cap = decode(&file).expect("decode");
        assert_eq!(cap.records.len(), 1);
        assert!(!cap.truncated);
    }
}
