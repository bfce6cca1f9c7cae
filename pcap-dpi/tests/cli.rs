use assert_cmd::Command;
use libpcap_dpi::packet::TcpFlags;
use libpcap_dpi::test_utils::{client_hello, tcp_frame};
use libpcap_tools::{decode, encode, PacketRecord, Timestamp};
use std::env;
use std::fs;
use std::net::Ipv4Addr;
use std::path::PathBuf;

fn temp_dir(name: &str) -> PathBuf {
    let dir = env::temp_dir().join(format!("pcap-dpi-cli-{}-{}", std::process::id(), name));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn sample_capture() -> Vec<u8> {
    let client = Ipv4Addr::new(10, 0, 0, 5);
    let server = Ipv4Addr::new(151, 101, 1, 140);
    let frames = [
        tcp_frame(client, 50000, server, 443, TcpFlags::SYN, b""),
        tcp_frame(client, 50000, server, 443, 0x18, &client_hello("www.reddit.com")),
        tcp_frame(client, 50001, server, 443, 0x18, &client_hello("www.github.com")),
    ];
    let records: Vec<_> = frames
        .iter()
        .map(|f| PacketRecord {
            ts: Timestamp::new(1_700_000_000, 0),
            caplen: f.len() as u32,
            origlen: f.len() as u32,
            data: f,
        })
        .collect();
    encode(&records).expect("encode")
}

#[test]
fn cli_help() {
    let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap();
    cmd.arg("--help").assert().success();
}

#[test]
fn cli_analyze_and_export() {
    let dir = temp_dir("analyze");
    let input = dir.join("in.pcap");
    let result = dir.join("result.json");
    let filtered = dir.join("filtered.pcap");
    let rules = dir.join("rules.toml");
    fs::write(&input, sample_capture()).unwrap();
    fs::write(&rules, "[[rule]]\nkind = \"domain\"\nvalue = \"reddit\"\n").unwrap();

    let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap();
    cmd.arg("--outdir")
        .arg(&dir)
        .arg("-r")
        .arg(&rules)
        .arg("-o")
        .arg(&result)
        .arg("-e")
        .arg(&filtered)
        .arg(&input)
        .assert()
        .success();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&result).unwrap()).unwrap();
    assert_eq!(json["status"], "completed");
    assert_eq!(json["summary"]["total_packets"], 3);
    assert_eq!(json["summary"]["dropped"], 1);
    assert_eq!(json["applications"]["Reddit"], 1);
    assert_eq!(json["applications"]["GitHub"], 1);

    let exported = fs::read(&filtered).unwrap();
    let cap = decode(&exported).unwrap();
    assert_eq!(cap.records.len(), 2);
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn cli_invalid_input_fails() {
    let dir = temp_dir("invalid");
    let input = dir.join("bad.pcap");
    fs::write(&input, b"definitely not a pcap file").unwrap();
    let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap();
    cmd.arg("--outdir").arg(&dir).arg(&input).assert().failure();
    fs::remove_dir_all(&dir).ok();
}
