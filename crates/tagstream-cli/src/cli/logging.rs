//! Tracing subscriber setup.

use std::path::Path;

use anyhow::{Context, Result};
use tagstream_core::config::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Overrides `log.level`.
const LOG_ENV: &str = "TAGSTREAM_LOG";

/// Installs the global subscriber.
///
/// Writes to stderr unless `log.file` is set, in which case output goes to a
/// daily-rotated file. The returned guard flushes that file on drop.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(&config.level));

    let Some(file) = config.file.as_deref().filter(|f| !f.trim().is_empty()) else {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact();
        // already set in tests that share a process
        let _ = subscriber.try_init();
        return Ok(None);
    };

    let path = Path::new(file);
    let file_name = path
        .file_name()
        .with_context(|| format!("log.file '{file}' has no file name"))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).with_context(|| format!("create log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::daily(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(false)
        .with_writer(writer);
    let _ = subscriber.try_init();
    Ok(Some(guard))
}
