//! Per-core UDP worker loop (spec.md §5). Each worker owns its own
//! `SO_REUSEPORT` socket and runs a straight-line
//! recv → decode → lookup → encode → send loop with no `tokio::spawn`
//! inside the hot path and no cross-core synchronization beyond the
//! zone set's read lock. Zone contents never change while workers are
//! running and a read lock never blocks another reader, so this is not
//! the kind of synchronization the no-sync-on-the-hot-path goal is
//! about; the per-core round-robin counters that *are* on the hot path
//! live in `Zone`'s own lock-free slab (see `zone.rs`).
//!
//! DNS-over-TCP query service is out of scope (spec.md Non-goals) — the
//! only TCP listener this crate runs is the admin control channel, via
//! `admin::run_admin_server`.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use socket2::{Domain, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::admin::Stats;
use crate::encode::{dump_dns_error, dump_dns_resp, EncodeOptions};
use crate::query::{decode_query, Rcode};
use crate::records::LabelName;
use crate::zone::ZoneSet;

const RECV_BUF_SIZE: usize = 4096;
const MIN_UDP_PAYLOAD: u16 = 512;

/// Bind a UDP socket with `SO_REUSEPORT` so every worker can share the
/// same `addr` with no coordination.
fn bind_reuseport_udp(addr: SocketAddr) -> Result<UdpSocket> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::DGRAM, None).context("create UDP socket")?;
    socket.set_reuse_address(true).ok();
    #[cfg(unix)]
    socket.set_reuse_port(true).context("set SO_REUSEPORT")?;
    socket.set_nonblocking(true).context("set O_NONBLOCK")?;
    socket.bind(&addr.into()).context("bind UDP socket")?;
    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

/// Run one worker: bind its own `SO_REUSEPORT` socket and answer queries
/// forever. `core_idx` selects this worker's slot in every zone's
/// round-robin slab and must match the `start_core_idx`/count the zones
/// were built with.
pub async fn run_worker(
    core_idx: usize,
    addr: SocketAddr,
    zones: Arc<RwLock<ZoneSet>>,
    stats: Arc<Stats>,
    opts: Arc<EncodeOptions>,
) -> Result<()> {
    let socket = bind_reuseport_udp(addr)?;
    let mut buf = [0u8; RECV_BUF_SIZE];
    let max_udp = opts.max_resp_size.min(u16::MAX as usize) as u16;

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                warn!("worker {}: UDP recv error: {}", core_idx, e);
                continue;
            }
        };
        stats.queries_received.fetch_add(1, Ordering::Relaxed);

        let raw = &buf[..len];
        let ctx = match decode_query(raw, MIN_UDP_PAYLOAD, max_udp) {
            Ok(ctx) => ctx,
            Err(e) => {
                // Header/question invariant failures (spec.md §7
                // "MalformedPacket -> Ignore") have no reliably-parsed
                // question to echo back, so those are dropped in silence.
                stats.queries_dropped.fetch_add(1, Ordering::Relaxed);
                debug!("worker {}: dropping malformed query from {}: {}", core_idx, src, e);
                continue;
            }
        };

        // A well-formed question whose qtype/EDNS/OPT we reject still gets
        // an RFC 1035 error reply rather than a zone lookup.
        if let Some(rcode) = ctx.reject {
            stats.queries_dropped.fetch_add(1, Ordering::Relaxed);
            match dump_dns_error(&ctx, raw, rcode, ctx.has_edns) {
                Ok(bytes) => {
                    if let Err(e) = socket.send_to(&bytes, src).await {
                        debug!("worker {}: UDP send error to {}: {}", core_idx, src, e);
                    }
                }
                Err(e) => warn!("worker {}: failed to encode {:?} reply for {}: {}", core_idx, rcode, src, e),
            }
            continue;
        }

        let response = {
            let zones_guard = zones.read().await;
            match zones_guard.find_for_name(&ctx.question.qname) {
                Some(zone) => {
                    let owner_rel = zone.relativize(&ctx.question.qname).unwrap_or_else(LabelName::root);
                    let owner_dict = zone.fetch(&owner_rel);
                    dump_dns_resp(&ctx, raw, &zones_guard, zone, &owner_rel, owner_dict, core_idx, &opts)
                }
                None => dump_dns_error(&ctx, raw, Rcode::NxDomain, ctx.has_edns),
            }
        };

        match response {
            Ok(mut bytes) => {
                if bytes.len() > max_udp as usize {
                    set_truncated(&mut bytes);
                    bytes.truncate(max_udp as usize);
                }
                if let Err(e) = socket.send_to(&bytes, src).await {
                    debug!("worker {}: UDP send error to {}: {}", core_idx, src, e);
                }
            }
            Err(e) => warn!("worker {}: failed to encode response for {}: {}", core_idx, src, e),
        }
    }
}

fn set_truncated(bytes: &mut [u8]) {
    if bytes.len() >= 3 {
        bytes[2] |= 0x02; // TC bit
    }
}
