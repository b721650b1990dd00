use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use authdns_core::admin::{self, AdminState};
use authdns_core::config::Config;
use authdns_core::zone::ZoneSet;
use authdns_core::Shared;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,authdns=debug".parse().unwrap()),
        )
        .init();

    info!("authdns starting...");

    let config_path = std::env::var("AUTHDNS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/etc/authdns/authdns.json"));
    let config = Config::load(&config_path)?;
    info!(
        "loaded config: {} worker core(s), listening on {:?}:{}",
        config.worker_cores, config.listen_addresses, config.port
    );

    // No file-backed zone loader exists yet (see DESIGN.md); zones are
    // populated only through whatever embeds this binary, so the set
    // starts empty and every query is answered with NXDOMAIN until zones
    // are added.
    let shared = Shared::new(ZoneSet::new());

    let worker_handles = authdns_core::spawn_workers(&config, &shared)?;
    info!("spawned {} UDP worker task(s)", worker_handles.len());

    let worker_core_ids: Vec<usize> = (0..config.worker_cores.max(1)).collect();
    let zone_files_root = PathBuf::from(&config.zone_files_root);
    let admin_state = Arc::new(AdminState::new(
        shared.zones.clone(),
        shared.stats.clone(),
        zone_files_root,
        worker_core_ids,
        config.enable_debug_hooks,
        config.clone(),
    ));
    let admin_addr: SocketAddr = format!("{}:{}", config.admin_host, config.admin_port).parse()?;
    let admin_handle = tokio::spawn(async move { admin::run_admin_server(admin_addr, admin_state).await });

    let mut worker_set = tokio::task::JoinSet::new();
    for handle in worker_handles {
        worker_set.spawn(async move { handle.await });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal, exiting");
        }
        res = admin_handle => {
            if let Err(e) = res {
                error!("admin task panicked: {}", e);
            }
        }
        Some(res) = worker_set.join_next() => {
            match res {
                Ok(Ok(Err(e))) => error!("worker task ended: {}", e),
                Ok(Err(e)) => error!("worker task panicked: {}", e),
                Err(e) => error!("worker task join failed: {}", e),
                Ok(Ok(Ok(()))) => {}
            }
        }
    }

    Ok(())
}
