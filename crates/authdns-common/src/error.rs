use thiserror::Error;

/// Startup/fatal-path errors. Per-query decode/encode/admin errors live in
/// `authdns_core::error` and never unwind through here — only failures that
/// should abort the process (spec.md §7 "Fatal failures") are represented.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
