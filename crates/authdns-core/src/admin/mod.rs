//! Length-framed TCP admin control channel (spec.md §6, grounded on
//! `src/admin.c`): `VERSION`, `INFO`, `DEBUG`, `ZONE`, and `CONFIG`
//! commands over a 4-byte-big-endian-length-prefixed ASCII protocol.
//!
//! The original multiplexes every connection through one `epoll` loop by
//! hand, tracking a manually-maintained LRU list so a cron job can walk
//! it and evict idle connections. Tokio gives each connection its own
//! task and a per-read `tokio::time::timeout` achieves the same externally
//! observable behavior — an idle connection is closed after
//! [`IDLE_TIMEOUT`] — without hand-rolling a shared LRU structure; see
//! DESIGN.md for the full rationale. Likewise, the original's reply queue
//! exists only to cope with partial, non-blocking writes in a single
//! event loop: an async per-connection task simply awaits each write in
//! turn, so no explicit queue is kept here.

pub mod commands;
pub mod connection;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::zone::ZoneSet;

/// Connections idle longer than this are closed (the original's
/// `ADMIN_CONN_EXPIRE`).
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(3600);

/// Accept at most this many connections per readiness event, so a burst
/// of connection attempts can't starve the rest of the process (the
/// original's `MAX_ACCEPTS_PER_CALL`).
pub const MAX_ACCEPTS_PER_CALL: usize = 1000;

#[derive(Default)]
pub struct Stats {
    pub queries_received: AtomicU64,
    pub queries_dropped: AtomicU64,
}

/// Snapshot of [`Stats`] plus the wall-clock time it was taken, so
/// `INFO stats` can report a since-last-call qps the way `genInfoString`
/// does by comparing against the previous call's snapshot.
pub struct StatsSnapshot {
    pub taken_at: Instant,
    pub queries_received: u64,
    pub queries_dropped: u64,
}

pub struct AdminState {
    pub version: &'static str,
    pub started_at: Instant,
    /// Shared with every data-plane worker (`authdns_core::Shared::stats`),
    /// so `INFO stats` reports the same counters the workers increment
    /// rather than a second, always-zero set local to the admin channel.
    pub stats: Arc<Stats>,
    pub last_stats_snapshot: RwLock<StatsSnapshot>,
    pub zones: Arc<RwLock<ZoneSet>>,
    pub zone_files_root: PathBuf,
    /// Zone name → backing zone file path, set via `CONFIG ZONEFILE SET`
    /// (the original's per-zone `data_store == "file"` association).
    pub zone_files: RwLock<HashMap<String, PathBuf>>,
    pub worker_core_ids: Vec<usize>,
    pub enable_debug_hooks: bool,
    /// The running configuration, serialized verbatim by `CONFIG GETALL`.
    pub config: Config,
}

impl AdminState {
    pub fn new(
        zones: Arc<RwLock<ZoneSet>>,
        stats: Arc<Stats>,
        zone_files_root: PathBuf,
        worker_core_ids: Vec<usize>,
        enable_debug_hooks: bool,
        config: Config,
    ) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            started_at: Instant::now(),
            stats,
            last_stats_snapshot: RwLock::new(StatsSnapshot {
                taken_at: Instant::now(),
                queries_received: 0,
                queries_dropped: 0,
            }),
            zones,
            zone_files_root,
            zone_files: RwLock::new(HashMap::new()),
            worker_core_ids,
            enable_debug_hooks,
            config,
        }
    }
}

/// Accept loop for the admin channel. Runs until the listener errors or
/// the process shuts down; each accepted connection gets its own task.
pub async fn run_admin_server(addr: SocketAddr, state: Arc<AdminState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("admin control channel listening on {}", addr);

    loop {
        let mut accepted = 0usize;
        while accepted < MAX_ACCEPTS_PER_CALL {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    accepted += 1;
                    let state = state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = connection::handle_connection(stream, peer, state).await {
                            debug!("admin connection {} closed: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    warn!("admin accept error: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    break;
                }
            }
        }
    }
}
