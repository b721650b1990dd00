//! Server configuration (spec.md §6 "External interfaces", plus the
//! ambient config layer this crate's semantics were expanded to include).
//! Keeps the teacher's `#[serde(default = "fn")]`-per-field idiom so every
//! field is independently optional in the JSON file on disk.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addresses")]
    pub listen_addresses: Vec<String>,
    #[serde(default = "default_dns_port")]
    pub port: u16,
    #[serde(default = "default_admin_host")]
    pub admin_host: String,
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,
    /// Number of per-core UDP/TCP worker tasks to bind with
    /// `SO_REUSEPORT` (spec.md §5). Defaults to the available parallelism.
    #[serde(default = "default_worker_cores")]
    pub worker_cores: usize,
    #[serde(default = "default_max_resp_size")]
    pub max_resp_size: usize,
    /// Omit A/AAAA glue records for in-zone NS/MX/SRV targets.
    #[serde(default)]
    pub minimize_resp: bool,
    #[serde(default = "default_zone_files_root")]
    pub zone_files_root: String,
    #[serde(default = "default_tcp_backlog")]
    pub tcp_backlog: u32,
    #[serde(default)]
    pub tcp_keepalive: bool,
    /// Gates `DEBUG segfault`/`DEBUG oom` — disabled by default in every
    /// build, not just this one's safe no-op implementation of them.
    #[serde(default)]
    pub enable_debug_hooks: bool,
}

fn default_listen_addresses() -> Vec<String> {
    vec!["0.0.0.0".to_string()]
}
fn default_dns_port() -> u16 {
    53
}
fn default_admin_host() -> String {
    "127.0.0.1".to_string()
}
fn default_admin_port() -> u16 {
    9000
}
fn default_worker_cores() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}
fn default_max_resp_size() -> usize {
    65535
}
fn default_zone_files_root() -> String {
    "/etc/authdns/zones".to_string()
}
fn default_tcp_backlog() -> u32 {
    1024
}

impl Default for Config {
    fn default() -> Self {
        serde_json::from_str("{}").unwrap()
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file is absent.
    /// Returns `authdns_common::AppError` — a missing/malformed config file
    /// is a startup-fatal condition (spec.md §7 "Fatal failures"), not a
    /// per-query error, so it uses the shared startup error type rather
    /// than `authdns_core`'s own per-query taxonomy in `error.rs`.
    pub fn load(path: &std::path::Path) -> Result<Self, authdns_common::AppError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content).map_err(|e| authdns_common::AppError::Config(e.to_string()))
        } else {
            tracing::info!("no config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}
