//! Logging and tracing configuration
//!
//! The CLI logs to stderr so `watch` output on stdout stays machine-readable.
//! A run can additionally be captured to a file for post-mortem debugging.

use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::paths;

fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("harness=debug,info")
        } else {
            EnvFilter::new("harness=info,warn")
        }
    })
}

/// Initialize tracing for the CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init_cli(verbose: bool) {
    tracing_subscriber::registry()
        .with(default_filter(verbose))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Initialize tracing to stderr plus an append-only log file
///
/// Falls back to stderr only if the file cannot be opened. Returns the path
/// actually being written.
pub fn init_with_file(verbose: bool, path: &Path) -> Option<PathBuf> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path);

    match file {
        Ok(file) => {
            let file_layer = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);

            let stderr_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact();

            tracing_subscriber::registry()
                .with(default_filter(verbose))
                .with(file_layer)
                .with(stderr_layer)
                .init();

            Some(path.to_path_buf())
        }
        Err(e) => {
            eprintln!("Warning: Could not open log file {}: {}", path.display(), e);
            init_cli(verbose);
            None
        }
    }
}

/// Default file for captured run logs
pub fn run_log_path() -> Option<PathBuf> {
    paths::ensure_log_dir()
        .ok()
        .flatten()
        .map(|d| d.join("harness.log"))
}
