//! Tracing setup: a daily log file plus stderr.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Checked before `RUST_LOG`.
pub const LOG_ENV: &str = "TRIPBOT_LOG";

const DEFAULT_DIRECTIVES: &str = "info,tripbot=debug";
const LOG_FILE_PREFIX: &str = "tripbot.log";

/// Filter from `TRIPBOT_LOG`, then `RUST_LOG`, then the built-in default.
///
/// A set but malformed variable is an error rather than a silent default.
fn log_filter() -> Result<EnvFilter> {
    for var in [LOG_ENV, EnvFilter::DEFAULT_ENV] {
        if let Ok(directives) = std::env::var(var) {
            return EnvFilter::try_new(&directives)
                .with_context(|| format!("invalid {} directives '{}'", var, directives));
        }
    }
    Ok(EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the global subscriber and return the file writer guard.
///
/// Dropping the guard flushes and stops file output, so `main` holds it
/// until exit. `json_console` switches stderr to one JSON object per event.
pub fn init(json_console: bool) -> Result<(WorkerGuard, PathBuf)> {
    let log_dir = get_log_dir()?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("could not create {}", log_dir.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX));

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);

    let console_layer = if json_console {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).with_target(false).boxed()
    };

    tracing_subscriber::registry()
        .with(log_filter()?)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::info!(dir = %log_dir.display(), json_console, "Logging ready");
    Ok((guard, log_dir))
}

/// `<data dir>/logs`, e.g. `~/.local/share/tripbot/logs` on Linux.
pub fn get_log_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("com", "tripbot", "tripbot")
        .context("could not determine the data directory")?;
    Ok(dirs.data_dir().join("logs"))
}
