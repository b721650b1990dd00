//! Admin command dispatch table: `VERSION`, `INFO`, `DEBUG`, `ZONE`,
//! `CONFIG`. Grounded on `dispatchCommand`/`adminCommandTable` and the
//! per-command handlers in `src/admin.c`.

use std::sync::atomic::Ordering;
use std::time::Instant;

use super::AdminState;
use crate::records::RecordType;
use crate::util::{number_to_human, to_abs_path, tokenize};

/// Tokenize and dispatch one command line, producing its full text reply.
/// Unknown commands produce the same `"invalid command X."` shape as the
/// original rather than an error the connection has to interpret.
pub async fn dispatch(line: &str, state: &AdminState) -> String {
    let argv = tokenize(line);
    let Some(cmd) = argv.first() else {
        return "invalid command.\n".to_string();
    };
    let args = &argv[1..];
    match cmd.to_ascii_uppercase().as_str() {
        "VERSION" => version_command(args, state),
        "INFO" => info_command(args, state).await,
        "DEBUG" => debug_command(args, state),
        "ZONE" => zone_command(args, state).await,
        "CONFIG" => config_command(args, state).await,
        other => format!("invalid command {other}.\n"),
    }
}

fn version_command(args: &[String], state: &AdminState) -> String {
    if !args.is_empty() {
        return "wrong number of arguments for 'version' command.\n".to_string();
    }
    format!("{}\n", state.version)
}

async fn info_command(args: &[String], state: &AdminState) -> String {
    let section = args.first().map(String::as_str).unwrap_or("default");
    let mut out = String::new();

    if section == "all" || section == "default" || section == "server" {
        out.push_str("# Server\n");
        out.push_str(&format!("version:{}\n", state.version));
        out.push_str(&format!("uptime_seconds:{}\n", state.started_at.elapsed().as_secs()));
        out.push_str(&format!("zones:{}\n", state.zones.read().await.zone_count()));
        out.push('\n');
    }

    if section == "all" || section == "memory" {
        out.push_str("# Memory\n");
        out.push_str("note:no host memory introspection in this build\n\n");
    }

    if section == "all" || section == "default" || section == "stats" {
        out.push_str("# Stats\n");
        let mut snap = state.last_stats_snapshot.write().await;
        let now = Instant::now();
        let elapsed = now.duration_since(snap.taken_at).as_secs_f64().max(0.001);
        let received = state.stats.queries_received.load(Ordering::Relaxed);
        let dropped = state.stats.queries_dropped.load(Ordering::Relaxed);
        let qps = (received.saturating_sub(snap.queries_received)) as f64 / elapsed;
        let dropped_qps = (dropped.saturating_sub(snap.queries_dropped)) as f64 / elapsed;
        out.push_str(&format!("total_requests:{}\n", number_to_human(received)));
        out.push_str(&format!("dropped_requests:{}\n", number_to_human(dropped)));
        out.push_str(&format!("qps:{:.1}\n", qps));
        out.push_str(&format!("dropped_qps:{:.1}\n", dropped_qps));
        out.push_str(&format!("num_zones:{}\n", state.zones.read().await.zone_count()));
        *snap = super::StatsSnapshot {
            taken_at: now,
            queries_received: received,
            queries_dropped: dropped,
        };
        out.push('\n');
    }

    if section == "all" || section == "cpu" {
        out.push_str("# CPU\n");
        out.push_str(&format!("worker_cores:{:?}\n", state.worker_core_ids));
        out.push('\n');
    }

    out
}

fn debug_command(args: &[String], state: &AdminState) -> String {
    if args.len() != 1 {
        return "wrong number of arguments for 'debug' command.\n".to_string();
    }
    match args[0].to_ascii_lowercase().as_str() {
        "info" => format!("worker_cores:{:?}\n", state.worker_core_ids),
        "segfault" | "oom" if !state.enable_debug_hooks => {
            "debug hook disabled (pass --enable-debug-hooks to allow).\n".to_string()
        }
        "segfault" | "oom" => {
            // Unlike the original, these never actually crash or exhaust
            // memory on purpose — a self-inflicted denial of service is
            // not a useful debug aid in a production binary.
            "debug hook acknowledged; destructive self-test is disabled in this build.\n".to_string()
        }
        other => format!("invalid debug subcommand {other}.\n"),
    }
}

async fn zone_command(args: &[String], state: &AdminState) -> String {
    let Some(sub) = args.first() else {
        return "wrong number of arguments for 'zone' command.\n".to_string();
    };
    let zones = state.zones.read().await;
    match sub.to_ascii_uppercase().as_str() {
        "GET" => {
            let Some(name) = args.get(1) else {
                return "zone get requires a zone name.\n".to_string();
            };
            let origin = crate::records::LabelName::from_dotted(name);
            match zones.get(&origin) {
                Some(z) => z.render_text(),
                None => format!("zone {name} not found.\n"),
            }
        }
        "GET_RRSET" => {
            let (Some(name), Some(rtype_str)) = (args.get(1), args.get(2)) else {
                return "zone get_rrset requires a name and a type.\n".to_string();
            };
            let Some(rtype) = RecordType::from_str_ci(rtype_str) else {
                return format!("unsupported type {rtype_str}.\n");
            };
            let full = crate::records::LabelName::from_dotted(name);
            match zones.find_for_name(&full) {
                Some(zone) => match zone.relativize(&full).and_then(|rel| zone.fetch_type(&rel, rtype)) {
                    Some(rrset) => format!("{} records\n", rrset.num()),
                    None => "no such rrset.\n".to_string(),
                },
                None => format!("no zone contains {name}.\n"),
            }
        }
        "GETALL" => zones.render_all_text(),
        "RELOAD" | "RELOADALL" => {
            "zone reload is not available: this build has no file-backed zone loader.\n".to_string()
        }
        "GET_NUMZONES" => format!("{}\n", zones.zone_count()),
        other => format!("invalid zone subcommand {other}.\n"),
    }
}

async fn config_command(args: &[String], state: &AdminState) -> String {
    let Some(sub) = args.first() else {
        return "wrong number of arguments for 'config' command.\n".to_string();
    };
    match sub.to_ascii_uppercase().as_str() {
        "GETALL" => match serde_json::to_string_pretty(&state.config) {
            Ok(json) => format!("{json}\n"),
            Err(e) => format!("failed to serialize config: {e}.\n"),
        },
        "ZONEFILE" => {
            let Some(op) = args.get(1) else {
                return "config zonefile requires get or set.\n".to_string();
            };
            match op.to_ascii_uppercase().as_str() {
                "GET" => {
                    let Some(zone) = args.get(2) else {
                        return "config zonefile get requires a zone name.\n".to_string();
                    };
                    match state.zone_files.read().await.get(zone) {
                        Some(path) => format!("{}\n", path.display()),
                        None => format!("no file associated with zone {zone}.\n"),
                    }
                }
                "SET" => {
                    let (Some(zone), Some(path)) = (args.get(2), args.get(3)) else {
                        return "config zonefile set requires a zone name and a path.\n".to_string();
                    };
                    let resolved = to_abs_path(path, &state.zone_files_root);
                    if !resolved.exists() {
                        return format!("{} does not exist.\n", resolved.display());
                    }
                    state.zone_files.write().await.insert(zone.clone(), resolved.clone());
                    format!("{} -> {}\n", zone, resolved.display())
                }
                other => format!("invalid config zonefile subcommand {other}.\n"),
            }
        }
        other => format!("invalid config subcommand {other}.\n"),
    }
}
