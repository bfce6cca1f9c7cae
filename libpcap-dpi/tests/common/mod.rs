#![allow(dead_code)]

use libpcap_tools::{encode, PacketRecord, Timestamp};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Unique path in the temporary directory
pub fn temp_path(name: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!("libpcap-dpi-{}-{}-{}", std::process::id(), n, name))
}

/// Encode frames as a capture, one second apart
pub fn capture(frames: &[Vec<u8>]) -> Vec<u8> {
    let records: Vec<_> = frames
        .iter()
        .enumerate()
        .map(|(i, f)| PacketRecord {
            ts: Timestamp::new(1_700_000_000 + i as u32, 0),
            caplen: f.len() as u32,
            origlen: f.len() as u32,
            data: f,
        })
        .collect();
    encode(&records).expect("encode capture")
}

/// Write frames as a capture file and return its path
pub fn write_capture(name: &str, frames: &[Vec<u8>]) -> PathBuf {
    let path = temp_path(name);
    fs::write(&path, capture(frames)).expect("write capture");
    path
}

/// Global header followed by raw record bytes, little-endian
pub fn raw_capture(records: &[(u32, &[u8])]) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    v.extend_from_slice(&2u16.to_le_bytes());
    v.extend_from_slice(&4u16.to_le_bytes());
    for field in [0u32, 0, 65535, 1] {
        v.extend_from_slice(&field.to_le_bytes());
    }
    for (caplen, data) in records {
        for field in [1_700_000_000u32, 0, *caplen, *caplen] {
            v.extend_from_slice(&field.to_le_bytes());
        }
        v.extend_from_slice(data);
    }
    v
}
