//! End-to-end coverage spanning more than one module: the full
//! decode -> lookup -> encode pipeline (scenarios S1-S4) and the admin
//! channel's length-framing property (property 6). Colocated module
//! `#[cfg(test)]` suites cover everything narrower than this.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;

use authdns_core::admin::{connection, AdminState};
use authdns_core::config::Config;
use authdns_core::encode::{dump_dns_error, dump_dns_resp, EncodeOptions};
use authdns_core::query::{decode_query, Rcode};
use authdns_core::records::{LabelName, RData, RecordType};
use authdns_core::zone::{Zone, ZoneSet};

fn encode_name(name: &str) -> Vec<u8> {
    let mut v = Vec::new();
    for label in name.split('.') {
        v.push(label.len() as u8);
        v.extend_from_slice(label.as_bytes());
    }
    v.push(0);
    v
}

fn build_query(qname: &[u8], qtype: u16, ar_count: u16, opt_rdata: Option<&[u8]>) -> Vec<u8> {
    let mut buf = vec![0u8; 12];
    buf[2] = 0x01; // RD
    buf[4..6].copy_from_slice(&1u16.to_be_bytes());
    buf[10..12].copy_from_slice(&ar_count.to_be_bytes());
    buf.extend_from_slice(qname);
    buf.extend_from_slice(&qtype.to_be_bytes());
    buf.extend_from_slice(&1u16.to_be_bytes()); // IN
    if let Some(rdata) = opt_rdata {
        buf.push(0); // root name
        buf.extend_from_slice(&41u16.to_be_bytes()); // OPT
        buf.extend_from_slice(&4096u16.to_be_bytes());
        buf.push(0); // extended rcode
        buf.push(0); // version
        buf.extend_from_slice(&0u16.to_be_bytes()); // flags
        buf.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        buf.extend_from_slice(rdata);
    }
    buf
}

const DEFAULT_OPTS: EncodeOptions = EncodeOptions { max_resp_size: 65535, minimize_resp: false };

/// S1: an A query against a zone holding a single A record answers with
/// QR/AA set, one answer record, and the raw address bytes as rdata.
#[test]
fn s1_a_record_answer_with_owner_compression() {
    let origin = LabelName::from_dotted("example.com");
    let mut zone = Zone::new(origin.clone(), 1, 0);
    zone.insert(LabelName::root(), RecordType::A, 60, vec![RData::A(Ipv4Addr::new(1, 2, 3, 4))]);
    let mut zones = ZoneSet::new();
    zones.add(zone);
    let zone = zones.get(&origin).unwrap();

    let qname = encode_name("example.com");
    let raw = build_query(&qname, RecordType::A.to_u16(), 0, None);
    let ctx = decode_query(&raw, 512, 4096).unwrap();
    let owner_rel = zone.relativize(&ctx.question.qname).unwrap();
    let owner_dict = zone.fetch(&owner_rel).cloned();

    let resp = dump_dns_resp(&ctx, &raw, &zones, zone, &owner_rel, owner_dict.as_ref(), 0, &DEFAULT_OPTS).unwrap();

    assert_eq!(resp[2] & 0x80, 0x80, "QR bit set");
    assert_eq!(resp[2] & 0x04, 0x04, "AA bit set");
    assert_eq!(u16::from_be_bytes([resp[6], resp[7]]), 1); // ANCOUNT
                                                            // owner name at the start of the answer section is a pointer to offset 12
                                                            // (the question name immediately follows the 12-byte header).
    let answer_start = raw.len();
    assert_eq!(&resp[answer_start..answer_start + 2], &[0xC0, 0x0C]);
    assert!(resp.ends_with(&[1, 2, 3, 4]));
}

/// S2: a CNAME chain answers with the CNAME only (not the target's A
/// record), carries the apex NS RRSet in authority, and the CNAME target's
/// A record as additional-section glue.
#[test]
fn s2_cname_chain_with_ns_authority_and_glue() {
    let origin = LabelName::from_dotted("example.com");
    let mut zone = Zone::new(origin.clone(), 1, 0);
    zone.insert(
        LabelName::root(),
        RecordType::Ns,
        3600,
        vec![RData::Ns(LabelName::from_dotted("ns1.example.com"))],
    );
    let www = zone.relativize(&LabelName::from_dotted("www.example.com")).unwrap();
    zone.insert(www.clone(), RecordType::Cname, 300, vec![RData::Cname(LabelName::from_dotted("host.example.com"))]);
    let host = zone.relativize(&LabelName::from_dotted("host.example.com")).unwrap();
    zone.insert(host, RecordType::A, 300, vec![RData::A(Ipv4Addr::new(5, 6, 7, 8))]);
    let mut zones = ZoneSet::new();
    zones.add(zone);
    let zone = zones.get(&origin).unwrap();

    let qname = encode_name("www.example.com");
    let raw = build_query(&qname, RecordType::A.to_u16(), 0, None);
    let ctx = decode_query(&raw, 512, 4096).unwrap();
    let owner_dict = zone.fetch(&www).cloned();

    let resp = dump_dns_resp(&ctx, &raw, &zones, zone, &www, owner_dict.as_ref(), 0, &DEFAULT_OPTS).unwrap();

    assert_eq!(u16::from_be_bytes([resp[6], resp[7]]), 1); // ANCOUNT: CNAME only
    assert_eq!(u16::from_be_bytes([resp[8], resp[9]]), 1); // NSCOUNT: apex NS
    assert_eq!(u16::from_be_bytes([resp[10], resp[11]]), 1); // ARCOUNT: glue A
    assert!(resp.ends_with(&[5, 6, 7, 8]), "glue A record's address trails the message");
}

/// A CNAME target that lives in a *different* zone of the same set must
/// pull its NS authority and glue from the target's own zone, not from the
/// zone the query was originally served against.
#[test]
fn cname_target_in_another_zone_gets_that_zones_ns_and_glue() {
    let origin = LabelName::from_dotted("example.com");
    let mut zone = Zone::new(origin.clone(), 1, 0);
    zone.insert(
        LabelName::root(),
        RecordType::Ns,
        3600,
        vec![RData::Ns(LabelName::from_dotted("ns1.example.com"))],
    );
    let www = zone.relativize(&LabelName::from_dotted("www.example.com")).unwrap();
    zone.insert(www.clone(), RecordType::Cname, 300, vec![RData::Cname(LabelName::from_dotted("host.other.org"))]);

    let other_origin = LabelName::from_dotted("other.org");
    let mut other_zone = Zone::new(other_origin.clone(), 1, 0);
    other_zone.insert(
        LabelName::root(),
        RecordType::Ns,
        3600,
        vec![RData::Ns(LabelName::from_dotted("ns1.other.org"))],
    );
    let host = other_zone.relativize(&LabelName::from_dotted("host.other.org")).unwrap();
    other_zone.insert(host, RecordType::A, 300, vec![RData::A(Ipv4Addr::new(10, 20, 30, 40))]);

    let mut zones = ZoneSet::new();
    zones.add(zone);
    zones.add(other_zone);
    let zone = zones.get(&origin).unwrap();

    let qname = encode_name("www.example.com");
    let raw = build_query(&qname, RecordType::A.to_u16(), 0, None);
    let ctx = decode_query(&raw, 512, 4096).unwrap();
    let owner_dict = zone.fetch(&www).cloned();

    let resp = dump_dns_resp(&ctx, &raw, &zones, zone, &www, owner_dict.as_ref(), 0, &DEFAULT_OPTS).unwrap();

    assert_eq!(u16::from_be_bytes([resp[6], resp[7]]), 1); // ANCOUNT: CNAME only
    assert_eq!(u16::from_be_bytes([resp[8], resp[9]]), 1); // NSCOUNT: other.org's own NS, not example.com's
    assert_eq!(u16::from_be_bytes([resp[10], resp[11]]), 1); // ARCOUNT: other.org's glue A
    assert!(resp.ends_with(&[10, 20, 30, 40]), "glue A record must come from the target's own zone");
}

/// S3: a query carrying EDNS and a Client-Subnet option gets that option's
/// exact bytes echoed back.
#[test]
fn s3_edns_client_subnet_is_echoed() {
    let origin = LabelName::from_dotted("example.com");
    let mut zone = Zone::new(origin.clone(), 1, 0);
    zone.insert(LabelName::root(), RecordType::A, 60, vec![RData::A(Ipv4Addr::new(9, 9, 9, 9))]);
    let mut zones = ZoneSet::new();
    zones.add(zone);
    let zone = zones.get(&origin).unwrap();

    let qname = encode_name("example.com");
    let mut opt_rdata = Vec::new();
    let ecs_payload = [0u8, 1, 24, 0, 1, 2, 3]; // family=1, /24, 1.2.3.0
    opt_rdata.extend_from_slice(&8u16.to_be_bytes());
    opt_rdata.extend_from_slice(&(ecs_payload.len() as u16).to_be_bytes());
    opt_rdata.extend_from_slice(&ecs_payload);
    let raw = build_query(&qname, RecordType::A.to_u16(), 1, Some(&opt_rdata));

    let ctx = decode_query(&raw, 512, 4096).unwrap();
    assert!(ctx.has_edns);
    let owner_dict = zone.fetch(&LabelName::root()).cloned();
    let resp = dump_dns_resp(&ctx, &raw, &zones, zone, &LabelName::root(), owner_dict.as_ref(), 0, &DEFAULT_OPTS).unwrap();

    let opt_rdata_len = 4 + ecs_payload.len();
    let tail = &resp[resp.len() - opt_rdata_len..];
    assert_eq!(u16::from_be_bytes([tail[0], tail[1]]), 8);
    assert_eq!(&tail[4..], &ecs_payload[..]);
}

/// S4: a malformed question (a label claiming length 64, one over the
/// RFC 1035 limit) fails to decode at all, which the worker loop treats
/// as "drop silently, no reply emitted" rather than anything a caller
/// could turn into an error response.
#[test]
fn s4_malformed_question_yields_no_decodable_context() {
    let mut qname = vec![64u8];
    qname.extend_from_slice(&[b'a'; 64]);
    qname.push(0);
    let raw = build_query(&qname, RecordType::A.to_u16(), 0, None);

    let err = decode_query(&raw, 512, 4096).unwrap_err();
    assert!(err.rcode().is_none(), "malformed question must map to Ignore, not a reply");
}

/// Confirms the NXDOMAIN path also never regresses to something other than
/// a header-only error response.
#[test]
fn nxdomain_is_header_only_with_aa_set() {
    let origin = LabelName::from_dotted("example.com");
    let zone = Zone::new(origin, 1, 0);
    let qname = encode_name("ghost.example.com");
    let raw = build_query(&qname, RecordType::A.to_u16(), 0, None);
    let ctx = decode_query(&raw, 512, 4096).unwrap();
    let resp = dump_dns_error(&ctx, &raw, Rcode::NxDomain, ctx.has_edns).unwrap();
    assert_eq!(resp[3] & 0x0F, 3);
    assert_eq!(resp[2] & 0x04, 0x04);
}

fn admin_state() -> Arc<AdminState> {
    Arc::new(AdminState::new(
        Arc::new(RwLock::new(ZoneSet::new())),
        Arc::new(authdns_core::admin::Stats::default()),
        PathBuf::from("/tmp"),
        vec![0],
        false,
        Config::default(),
    ))
}

async fn send_framed(stream: &mut TcpStream, payload: &[u8]) {
    stream.write_all(&(payload.len() as u32).to_be_bytes()).await.unwrap();
    stream.write_all(payload).await.unwrap();
}

async fn recv_framed(stream: &mut TcpStream) -> Vec<u8> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.unwrap();
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await.unwrap();
    body
}

/// Property 6: one request frame yields exactly one reply frame.
#[tokio::test]
async fn admin_framing_single_request_single_reply() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = admin_state();
    tokio::spawn(async move {
        let (stream, peer) = listener.accept().await.unwrap();
        connection::handle_connection(stream, peer, state).await.ok();
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    send_framed(&mut client, b"VERSION").await;
    let reply = recv_framed(&mut client).await;
    assert!(!reply.is_empty());
}

/// Property 6: two requests sent back-to-back in one write produce two
/// replies, each answering its own request in order.
#[tokio::test]
async fn admin_framing_concatenated_requests_yield_two_replies() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = admin_state();
    tokio::spawn(async move {
        let (stream, peer) = listener.accept().await.unwrap();
        connection::handle_connection(stream, peer, state).await.ok();
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    let mut both = Vec::new();
    for payload in [&b"VERSION"[..], &b"ZONE GET_NUMZONES"[..]] {
        both.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        both.extend_from_slice(payload);
    }
    client.write_all(&both).await.unwrap();

    let first = recv_framed(&mut client).await;
    let second = recv_framed(&mut client).await;
    assert!(!first.is_empty());
    assert_eq!(second, b"0\n");
}

/// Property 7: a connection that never sends anything is closed once
/// `IDLE_TIMEOUT` elapses. Uses a paused/advanced clock rather than a real
/// hour-long sleep.
#[tokio::test(start_paused = true)]
async fn idle_connection_is_evicted_after_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = admin_state();
    tokio::spawn(async move {
        let (stream, peer) = listener.accept().await.unwrap();
        connection::handle_connection(stream, peer, state).await.ok();
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    tokio::time::advance(authdns_core::admin::IDLE_TIMEOUT + std::time::Duration::from_secs(1)).await;

    let mut buf = [0u8; 1];
    let n = client.read(&mut buf).await.unwrap();
    assert_eq!(n, 0, "server must have closed the idle connection");
}

/// Property 7 (converse): any activity within the idle window keeps the
/// connection alive past what would otherwise be the eviction point.
#[tokio::test(start_paused = true)]
async fn activity_within_idle_window_keeps_connection_alive() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = admin_state();
    tokio::spawn(async move {
        let (stream, peer) = listener.accept().await.unwrap();
        connection::handle_connection(stream, peer, state).await.ok();
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    tokio::time::advance(authdns_core::admin::IDLE_TIMEOUT / 2).await;
    send_framed(&mut client, b"VERSION").await;
    let reply = recv_framed(&mut client).await;
    assert!(!reply.is_empty(), "connection must still be alive partway through the idle window");
}

/// Property 6: sending a request's length prefix and payload split across
/// several writes (simulating separate readiness events) produces the
/// same reply as sending it all at once.
#[tokio::test]
async fn admin_framing_piecewise_send_matches_single_send() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = admin_state();
    tokio::spawn(async move {
        let (stream, peer) = listener.accept().await.unwrap();
        connection::handle_connection(stream, peer, state).await.ok();
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    let payload = b"VERSION";
    let len_bytes = (payload.len() as u32).to_be_bytes();
    // length prefix one byte at a time, then the payload split in half.
    for b in len_bytes {
        client.write_all(&[b]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    }
    client.write_all(&payload[..3]).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    client.write_all(&payload[3..]).await.unwrap();

    let reply = recv_framed(&mut client).await;
    assert!(!reply.is_empty());
}
