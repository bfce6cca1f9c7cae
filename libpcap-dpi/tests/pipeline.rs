mod common;

use common::*;
use libpcap_dpi::packet::{dissect, TcpFlags};
use libpcap_dpi::test_utils::*;
use libpcap_dpi::*;
use libpcap_tools::{decode, CancelToken, Timestamp};
use std::fs;
use std::net::Ipv4Addr;
use std::sync::Arc;

fn pipeline(rules: Vec<BlockRule>) -> (Pipeline, Arc<MemoryRuleStore>, Arc<MemoryResultStore>) {
    let rule_store = Arc::new(MemoryRuleStore::with_rules(rules));
    let result_store = Arc::new(MemoryResultStore::new());
    let p = Pipeline::new(rule_store.clone(), result_store.clone());
    (p, rule_store, result_store)
}

fn client() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 1, 10)
}

fn server() -> Ipv4Addr {
    Ipv4Addr::new(93, 184, 216, 34)
}

#[test]
fn syn_to_https_without_payload() {
    let frame = tcp_frame(client(), 51000, server(), 443, TcpFlags::SYN, b"");
    assert_eq!(frame.len(), 54);
    let file = raw_capture(&[(54, &frame)]);
    let cap = decode(&file).expect("decode");
    assert_eq!(cap.records.len(), 1);
    let desc = dissect(cap.records[0].data, 1, cap.records[0].ts).expect("dissect");
    assert_eq!(desc.protocol_name(), "TCP");
    assert_eq!(desc.tcp_flags().map(|f| f.to_string()).as_deref(), Some("SYN"));

    let path = temp_path("syn.pcap");
    fs::write(&path, &file).expect("write");
    let (p, _, _) = pipeline(vec![]);
    let r = p.run(&path, &CancelToken::new()).expect("run");
    assert_eq!(r.status, RunStatus::Completed);
    assert_eq!(r.packets.len(), 1);
    assert_eq!(r.packets[0].app, "HTTPS");
    assert_eq!(r.packets[0].flags.as_deref(), Some("SYN"));
    assert_eq!(r.packets[0].domain, None);
    assert!(r.domains.is_empty());
    fs::remove_file(&path).ok();
}

#[test]
fn unknown_sni_labelled_https() {
    let hello = client_hello("www.example.com");
    let path = write_capture(
        "sni.pcap",
        &[tcp_frame(client(), 51000, server(), 443, 0x18, &hello)],
    );
    let (p, _, _) = pipeline(vec![]);
    let r = p.run(&path, &CancelToken::new()).expect("run");
    assert_eq!(r.packets[0].domain.as_deref(), Some("www.example.com"));
    assert_eq!(r.packets[0].app, "HTTPS");
    assert_eq!(r.domains[0].source, "sni");
    assert_eq!(r.flows[0].name.as_deref(), Some("www.example.com"));
    assert_eq!(r.flows[0].app, "HTTPS");
    fs::remove_file(&path).ok();
}

#[test]
fn dns_query_labelled_dns() {
    let q = dns_query(&["api", "service", "com"]);
    let path = write_capture(
        "dns.pcap",
        &[udp_frame(client(), 53000, Ipv4Addr::new(8, 8, 8, 8), 53, &q)],
    );
    let (p, _, _) = pipeline(vec![]);
    let r = p.run(&path, &CancelToken::new()).expect("run");
    assert_eq!(r.packets[0].dns_query.as_deref(), Some("api.service.com"));
    assert_eq!(r.packets[0].app, "DNS");
    assert_eq!(
        r.domains,
        vec![DetectedDomain {
            domain: "api.service.com".into(),
            app: "DNS".into(),
            source: "dns_query",
        }]
    );
    fs::remove_file(&path).ok();
}

#[test]
fn truncated_capture_keeps_earlier_records() {
    let frame = tcp_frame(client(), 51000, server(), 80, TcpFlags::SYN, b"");
    let mut file = raw_capture(&[(54, &frame)]);
    // second record declares more bytes than the file holds
    file.extend_from_slice(&raw_capture(&[(200, &frame)])[24..]);
    let path = temp_path("truncated.pcap");
    fs::write(&path, &file).expect("write");
    let (p, _, _) = pipeline(vec![]);
    let r = p.run(&path, &CancelToken::new()).expect("run");
    assert_eq!(r.summary.total_packets, 1);
    assert!(r.summary.truncated);
    assert_eq!(r.applications.get("HTTP"), Some(&1));
    fs::remove_file(&path).ok();
}

#[test]
fn export_without_blocked_flow() {
    let blocked = Ipv4Addr::new(10, 0, 0, 5);
    let frames = vec![
        tcp_frame(client(), 51000, server(), 443, TcpFlags::SYN, b""),
        tcp_frame(blocked, 40000, server(), 80, TcpFlags::SYN, b""),
        udp_frame(client(), 53000, Ipv4Addr::new(8, 8, 8, 8), 53, &dns_query(&["a", "org"])),
        tcp_frame(server(), 80, blocked, 40000, TcpFlags::SYN | TcpFlags::ACK, b""),
        tcp_frame(client(), 51000, server(), 443, TcpFlags::ACK, b""),
        vec![0u8; 6],
    ];
    let input = write_capture("export-in.pcap", &frames);
    let output = temp_path("export-out.pcap");
    let (p, _, results) = pipeline(vec![BlockRule::new(RuleKind::Ip, "10.0.0.5")]);

    let r = p.run(&input, &CancelToken::new()).expect("run");
    assert_eq!((r.summary.forwarded, r.summary.dropped), (3, 2));
    assert_eq!(r.flows.iter().filter(|f| f.blocked).count(), 2);
    assert_eq!(results.get(r.id).map(|r| r.status), Some(RunStatus::Completed));

    let stats = p.export(&input, &output).expect("export");
    assert_eq!(stats.dropped, r.summary.dropped);
    assert_eq!(stats.unparsed, 1);
    assert_eq!(stats.forwarded, 4);

    let exported = fs::read(&output).expect("read export");
    let cap = decode(&exported).expect("decode export");
    let kept: Vec<&[u8]> = cap.records.iter().map(|r| r.data).collect();
    let expected: Vec<&[u8]> = [0, 2, 4, 5].iter().map(|&i| &frames[i][..]).collect();
    assert_eq!(kept, expected);
    assert_eq!(cap.info.snaplen, 65535);
    assert!(!cap.truncated);
    // the original is untouched
    assert_eq!(fs::read(&input).expect("read input"), capture(&frames));
    fs::remove_file(&input).ok();
    fs::remove_file(&output).ok();
}

#[test]
fn export_uses_fresh_rule_snapshot() {
    let frames = vec![tcp_frame(client(), 51000, server(), 443, TcpFlags::SYN, b"")];
    let input = write_capture("fresh-in.pcap", &frames);
    let (p, rules, _) = pipeline(vec![]);
    let mut out = Vec::new();
    let data = fs::read(&input).expect("read");
    assert_eq!(p.export_to(&data, &mut out).expect("export").forwarded, 1);
    rules.add(BlockRule::new(RuleKind::App, "https"));
    let mut out = Vec::new();
    let stats = p.export_to(&data, &mut out).expect("export");
    assert_eq!((stats.forwarded, stats.dropped), (0, 1));
    assert_eq!(decode(&out).expect("decode").records.len(), 0);
    fs::remove_file(&input).ok();
}

#[test]
fn rules_loaded_from_toml() {
    let hello = client_hello("video.netflix.com");
    let frames = vec![
        tcp_frame(client(), 51000, server(), 443, 0x18, &hello),
        tcp_frame(client(), 51001, server(), 443, 0x18, &client_hello("www.github.com")),
    ];
    let path = write_capture("rules.pcap", &frames);
    let (p, rules, _) = pipeline(vec![]);
    let n = rules
        .load("[[rule]]\nkind = \"domain\"\nvalue = \"NETFLIX\"\ndescription = \"streaming\"\n".as_bytes())
        .expect("rules");
    assert_eq!(n, 1);
    let r = p.run(&path, &CancelToken::new()).expect("run");
    assert_eq!(r.applications.get("Netflix"), Some(&1));
    assert_eq!(r.applications.get("GitHub"), Some(&1));
    assert_eq!((r.summary.forwarded, r.summary.dropped), (1, 1));
    assert!(r.packets[0].blocked);
    fs::remove_file(&path).ok();
}

#[test]
fn cancelled_run_fails() {
    let path = write_capture(
        "cancel.pcap",
        &[tcp_frame(client(), 51000, server(), 443, TcpFlags::SYN, b"")],
    );
    let (p, _, results) = pipeline(vec![]);
    let token = CancelToken::new();
    token.cancel();
    let err = p.run(&path, &token).expect_err("cancelled run");
    assert!(err.to_string().contains("analysis cancelled"));
    assert_eq!(results.len(), 1);
    let stored = results.get(1).expect("stored result");
    assert_eq!(stored.status, RunStatus::Failed);
    assert!(stored.flows.is_empty());
    fs::remove_file(&path).ok();
}

#[test]
fn invalid_file_fails_with_progress() {
    let path = temp_path("not-a-capture.pcap");
    fs::write(&path, b"this is not a capture file at all").expect("write");
    let (tx, rx) = progress_channel(16);
    let (p, _, results) = pipeline(vec![]);
    let p = p.with_progress(tx);
    let handle = p.submit(&path).expect("submit");
    let id = handle.run_id;
    assert_eq!(handle.join(), RunStatus::Failed);
    let stored = results.get(id).expect("result");
    assert_eq!(stored.status, RunStatus::Failed);
    assert!(stored
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("invalid capture format"));
    let events: Vec<ProgressEvent> = rx.try_iter().collect();
    assert_eq!(events.first().map(|e| e.status), Some(RunStatus::Processing));
    assert_eq!(events.last().map(|e| e.status), Some(RunStatus::Failed));
    fs::remove_file(&path).ok();
}

#[test]
fn missing_file_fails() {
    let (p, _, _) = pipeline(vec![]);
    let err = p
        .run(temp_path("missing.pcap"), &CancelToken::new())
        .expect_err("missing file");
    assert!(matches!(err, AnalysisError::RunFailure(_)));
}

#[test]
fn background_run_reports_progress() {
    let frames: Vec<_> = (0..50u16)
        .map(|i| tcp_frame(client(), 50000 + i, server(), 443, TcpFlags::SYN, b""))
        .collect();
    let path = write_capture("progress.pcap", &frames);
    let (tx, rx) = progress_channel(64);
    let (p, _, results) = pipeline(vec![]);
    let handle = p.with_progress(tx).submit(&path).expect("submit");
    let id = handle.run_id;
    assert_eq!(handle.join(), RunStatus::Completed);

    let events: Vec<ProgressEvent> = rx.try_iter().collect();
    assert!(events.iter().all(|e| e.run_id == id));
    let percents: Vec<u8> = events.iter().map(|e| e.progress).collect();
    assert_eq!(percents, vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    let last = events.last().expect("final event");
    assert_eq!(last.status, RunStatus::Completed);
    assert_eq!(last.message, "Analysis completed");

    let r = results.get(id).expect("result");
    assert_eq!(r.summary.flow_count, 50);
    assert_eq!(r.capture.and_then(|c| c.last_packet), Some(Timestamp::new(1_700_000_049, 0)));
    fs::remove_file(&path).ok();
}

#[test]
fn concurrent_runs_are_independent() {
    let a = write_capture(
        "concurrent-a.pcap",
        &[tcp_frame(client(), 1, server(), 443, TcpFlags::SYN, b"")],
    );
    let b = write_capture(
        "concurrent-b.pcap",
        &[
            tcp_frame(client(), 2, server(), 80, TcpFlags::SYN, b""),
            tcp_frame(client(), 3, server(), 80, TcpFlags::SYN, b""),
        ],
    );
    let (p, _, results) = pipeline(vec![]);
    let ha = p.submit(&a).expect("submit a");
    let hb = p.submit(&b).expect("submit b");
    let (ida, idb) = (ha.run_id, hb.run_id);
    assert_eq!(ha.join(), RunStatus::Completed);
    assert_eq!(hb.join(), RunStatus::Completed);
    assert_eq!(results.get(ida).map(|r| r.summary.total_packets), Some(1));
    assert_eq!(results.get(idb).map(|r| r.summary.total_packets), Some(2));
    fs::remove_file(&a).ok();
    fs::remove_file(&b).ok();
}
