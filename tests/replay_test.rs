//! pcap file replay through the full pipeline

mod common;

use std::time::Duration;

use tempfile::tempdir;
use tokio::time::timeout;

use common::{count_closes, event_log, events, recording, write_pcap, write_pcapng, Conversation, Event};
use flowtap::common::{DispatchError, Direction};
use flowtap::protocol::{DnsDetector, FnDetector, HttpDetector, TlsDetector};
use flowtap::{CaptureOptions, Dispatcher, ProtocolDetector};

const WAIT: Duration = Duration::from_secs(5);

const CLIENT_HELLO: &[u8] = &[0x16, 0x03, 0x01, 0x00, 0x05, 0x01, 0x00, 0x00, 0x01, 0x00];

fn http_session() -> Vec<Vec<u8>> {
    Conversation::new("192.168.1.10:50000", "192.168.1.1:80")
        .handshake()
        .client_sends(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n")
        .server_sends(b"HTTP/1.1 204 No Content\r\n\r\n")
        .close()
        .packets()
}

fn tls_session() -> Vec<Vec<u8>> {
    Conversation::new("192.168.1.10:50001", "192.168.1.1:443")
        .handshake()
        .client_sends(CLIENT_HELLO)
        .close()
        .packets()
}

async fn replay(dispatcher: &mut Dispatcher) {
    dispatcher.start().await.expect("start replay");
    timeout(WAIT, dispatcher.wait_finished())
        .await
        .expect("replay should finish");
    dispatcher.stop().await.expect("stop replay");
}

#[tokio::test]
async fn test_replay_classifies_http_and_tls() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mixed.pcap");
    let mut packets = http_session();
    packets.extend(tls_session());
    write_pcap(&path, &packets);

    let log = event_log();
    let mut dispatcher = Dispatcher::for_file(&path);
    dispatcher
        .register_detector(FnDetector::new(
            "TLS",
            |data, direction| TlsDetector::new().detect(data, direction),
            recording("TLS", &log),
        ))
        .unwrap();
    dispatcher
        .register_detector(FnDetector::new(
            "HTTP",
            |data, direction| HttpDetector::new().detect(data, direction),
            recording("HTTP", &log),
        ))
        .unwrap();

    replay(&mut dispatcher).await;

    let recorded = events(&log);
    let http_request = recorded.iter().any(|e| {
        matches!(e, Event::Data { protocol, direction: Direction::ClientToServer, data, .. }
            if protocol == "HTTP" && data.starts_with(b"GET /"))
    });
    let http_response = recorded.iter().any(|e| {
        matches!(e, Event::Data { protocol, direction: Direction::ServerToClient, data, .. }
            if protocol == "HTTP" && data.starts_with(b"HTTP/1.1 204"))
    });
    let tls_hello = recorded
        .iter()
        .any(|e| matches!(e, Event::Data { protocol, data, .. } if protocol == "TLS" && data == CLIENT_HELLO));
    assert!(http_request);
    assert!(http_response);
    assert!(tls_hello);
    assert_eq!(count_closes(&log), 2);

    let stats = dispatcher.stats();
    assert_eq!(stats.packets_seen, packets.len() as u64);
    assert_eq!(stats.flows_completed, 2);
    assert_eq!(stats.unmatched_flows, 0);
    assert_eq!(stats.errors, 0);
}

fn dns_session() -> Vec<Vec<u8>> {
    // Length prefix, then a query header with one question
    let mut query = vec![0x00, 0x1d, 0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
    query.extend_from_slice(b"\x07example\x03com\x00\x00\x01\x00\x01");
    Conversation::new("192.168.1.10:50002", "192.168.1.53:53")
        .handshake()
        .client_sends(&query)
        .close()
        .packets()
}

#[tokio::test]
async fn test_replay_pcapng() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mixed.pcapng");
    let mut packets = http_session();
    packets.extend(dns_session());
    write_pcapng(&path, &packets);

    let log = event_log();
    let mut dispatcher = Dispatcher::for_file(&path);
    dispatcher
        .register_detector(FnDetector::new(
            "HTTP",
            |data, direction| HttpDetector::new().detect(data, direction),
            recording("HTTP", &log),
        ))
        .unwrap();
    dispatcher
        .register_detector(FnDetector::new(
            "DNS",
            |data, direction| DnsDetector::new().detect(data, direction),
            recording("DNS", &log),
        ))
        .unwrap();

    replay(&mut dispatcher).await;

    let recorded = events(&log);
    let http_request = recorded.iter().any(|e| {
        matches!(e, Event::Data { protocol, data, .. } if protocol == "HTTP" && data.starts_with(b"GET /"))
    });
    let dns_query = recorded.iter().any(|e| {
        matches!(e, Event::Data { protocol, flow, .. } if protocol == "DNS" && flow.ends_with(":53"))
    });
    assert!(http_request);
    assert!(dns_query);
    assert_eq!(count_closes(&log), 2);

    let stats = dispatcher.stats();
    assert_eq!(stats.packets_seen, packets.len() as u64);
    assert_eq!(stats.flows_completed, 2);
    assert_eq!(stats.unmatched_flows, 0);
    assert_eq!(stats.errors, 0);
}

#[tokio::test]
async fn test_replay_with_filter() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("filtered.pcap");
    let mut packets = http_session();
    packets.extend(tls_session());
    write_pcap(&path, &packets);

    let log = event_log();
    let mut dispatcher = Dispatcher::new(CaptureOptions::for_file(&path).with_filter("tcp port 443"));
    dispatcher.register_prefix("TLS", &CLIENT_HELLO[..3], recording("TLS", &log)).unwrap();
    dispatcher.register_prefix("HTTP", b"GET ", recording("HTTP", &log)).unwrap();

    replay(&mut dispatcher).await;

    let recorded = events(&log);
    assert!(!recorded.is_empty());
    assert!(recorded.iter().all(|e| match e {
        Event::Data { protocol, .. } | Event::Close { protocol, .. } => protocol == "TLS",
    }));

    // Filtered packets are still seen, but never reach reassembly
    let stats = dispatcher.stats();
    assert_eq!(stats.packets_seen, packets.len() as u64);
    assert_eq!(stats.flows_completed, 1);
}

#[tokio::test]
async fn test_replay_empty_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.pcap");
    write_pcap(&path, &[]);

    let mut dispatcher = Dispatcher::for_file(&path);
    replay(&mut dispatcher).await;

    assert_eq!(dispatcher.stats().packets_seen, 0);
    assert_eq!(dispatcher.stats().flows_completed, 0);
}

#[tokio::test]
async fn test_replay_missing_file() {
    let dir = tempdir().unwrap();
    let mut dispatcher = Dispatcher::for_file(dir.path().join("missing.pcap"));

    let result = dispatcher.start().await;
    assert!(matches!(result, Err(DispatchError::Capture(_))));
    assert!(!dispatcher.is_running());
}

#[tokio::test]
async fn test_replay_invalid_filter() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("any.pcap");
    write_pcap(&path, &[]);

    let mut dispatcher = Dispatcher::new(CaptureOptions::for_file(&path).with_filter("tcp port"));
    let result = dispatcher.start().await;
    assert!(matches!(result, Err(DispatchError::Configuration(_))));
}
