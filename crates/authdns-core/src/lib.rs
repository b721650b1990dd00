pub mod admin;
pub mod buffer;
pub mod compress;
pub mod config;
pub mod encode;
pub mod error;
pub mod query;
pub mod records;
pub mod server;
pub mod util;
pub mod wire;
pub mod zone;

pub use config::Config;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::sync::RwLock;

use admin::Stats;
use encode::EncodeOptions;
use zone::ZoneSet;

/// State shared between every data-plane worker and the admin control
/// channel: the loaded zones and the query counters `INFO stats` reports.
pub struct Shared {
    pub zones: Arc<RwLock<ZoneSet>>,
    pub stats: Arc<Stats>,
}

impl Shared {
    pub fn new(zones: ZoneSet) -> Self {
        Self {
            zones: Arc::new(RwLock::new(zones)),
            stats: Arc::new(Stats::default()),
        }
    }
}

/// Spawn one `SO_REUSEPORT` UDP worker per `config.worker_cores`, for every
/// address in `config.listen_addresses`. Returns the join handles; the
/// workers themselves run until the process exits or a bind fails.
pub fn spawn_workers(config: &Config, shared: &Shared) -> anyhow::Result<Vec<tokio::task::JoinHandle<anyhow::Result<()>>>> {
    let opts = Arc::new(EncodeOptions {
        max_resp_size: config.max_resp_size,
        minimize_resp: config.minimize_resp,
    });
    let mut handles = Vec::new();
    for listen_addr in &config.listen_addresses {
        let ip: IpAddr = listen_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address {listen_addr}: {e}"))?;
        for core_idx in 0..config.worker_cores.max(1) {
            let addr = SocketAddr::new(ip, config.port);
            let zones = shared.zones.clone();
            let stats = shared.stats.clone();
            let opts = opts.clone();
            handles.push(tokio::spawn(
                async move { server::run_worker(core_idx, addr, zones, stats, opts).await },
            ));
        }
    }
    Ok(handles)
}
