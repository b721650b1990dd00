//! Small utilities shared by the admin command layer: human-readable
//! number formatting, path resolution, and command-line tokenization.
//! Grounded on `numberToHuman`/`toAbsPath` (`src/utils.c`) and the
//! argv-building loop in `dispatchCommand` (`src/admin.c`).

use std::path::{Path, PathBuf};

const HUMAN_SUFFIXES: [&str; 6] = ["", "K", "M", "B", "T", "P"];

/// Render `n` with a 1000-based K/M/B/T/P suffix, one decimal place once
/// a suffix is used (the original's `numberToHuman`, used for admin `INFO`
/// output — contrast with a 1024-based `bytesToHuman`, which this server
/// has no use for since it reports record/query counts, not memory sizes).
pub fn number_to_human(n: u64) -> String {
    if n < 1000 {
        return n.to_string();
    }
    let mut value = n as f64;
    let mut suffix_idx = 0;
    while value >= 1000.0 && suffix_idx < HUMAN_SUFFIXES.len() - 1 {
        value /= 1000.0;
        suffix_idx += 1;
    }
    format!("{:.1}{}", value, HUMAN_SUFFIXES[suffix_idx])
}

/// Resolve `path` to an absolute path: pass through if already absolute,
/// expand a leading `~` against `$HOME`, otherwise resolve relative to
/// `root` (the original's `toAbsPath`, which falls back to the process's
/// cwd when no root is given — here `root` is always the configured
/// zone files directory).
pub fn to_abs_path(path: &str, root: &Path) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return Path::new(&home).join(rest);
        }
    }
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

/// Split an admin command line on whitespace, stripping one layer of
/// surrounding double quotes from each token (the original's
/// `dispatchCommand` argv-building loop). Quoted tokens may contain
/// embedded whitespace.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.trim().chars().peekable();
    while chars.peek().is_some() {
        while chars.peek() == Some(&' ') || chars.peek() == Some(&'\t') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }
        let mut tok = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                tok.push(c);
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ' ' || c == '\t' {
                    break;
                }
                tok.push(c);
                chars.next();
            }
        }
        tokens.push(tok);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_to_human_formats_thresholds() {
        assert_eq!(number_to_human(42), "42");
        assert_eq!(number_to_human(1500), "1.5K");
        assert_eq!(number_to_human(2_500_000), "2.5M");
        assert_eq!(number_to_human(3_000_000_000), "3.0B");
    }

    #[test]
    fn to_abs_path_passes_through_absolute() {
        let root = Path::new("/etc/authdns/zones");
        assert_eq!(to_abs_path("/tmp/x.zone", root), PathBuf::from("/tmp/x.zone"));
    }

    #[test]
    fn to_abs_path_joins_relative_to_root() {
        let root = Path::new("/etc/authdns/zones");
        assert_eq!(to_abs_path("example.com.zone", root), root.join("example.com.zone"));
    }

    #[test]
    fn tokenize_strips_quotes_and_splits_on_whitespace() {
        let toks = tokenize(r#"ZONE GET "example.com""#);
        assert_eq!(toks, vec!["ZONE", "GET", "example.com"]);
    }

    #[test]
    fn tokenize_handles_tabs_and_repeated_whitespace() {
        let toks = tokenize("INFO\t\tall");
        assert_eq!(toks, vec!["INFO", "all"]);
    }
}
