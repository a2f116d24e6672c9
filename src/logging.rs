//! Tracing subscriber setup.
//!
//! The interactive booth runs for a whole evening, so [`init_production`]
//! keeps a daily-rotated JSON log next to the console output. One-shot
//! subcommands only need stderr and use [`init_cli`].
//!
//! `RUST_LOG` always wins over the configured `[logging] level`.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// File name prefix; the appender adds `.YYYY-MM-DD`.
const LOG_FILE_PREFIX: &str = "fortune-booth.log";

/// Keeps the background log writer running.
///
/// Hold it until shutdown. Dropping it flushes buffered lines to disk.
pub struct LoggingGuard {
    _writer: WorkerGuard,
}

fn filter(configured: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// JSON lines to `{logs_dir}/fortune-booth.log.<date>` plus plain text on
/// stderr.
///
/// # Errors
///
/// Fails when `logs_dir` cannot be created or a global subscriber is
/// already installed.
pub fn init_production(logs_dir: &Path, default_level: &str) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX));

    tracing_subscriber::registry()
        .with(filter(default_level))
        .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(LoggingGuard { _writer: guard })
}

/// Plain text on stderr, nothing on disk.
pub fn init_cli(default_level: &str) {
    // A second install only happens in tests; keep the first one.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(default_level))
        .with_writer(std::io::stderr)
        .try_init();
}
