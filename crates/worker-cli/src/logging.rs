//! Structured logging setup: `tracing-subscriber` on stderr plus a
//! non-blocking `tracing-appender` file writer under the install directory.

use std::path::Path;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Must be kept alive for the lifetime of the process: dropping it flushes
/// and stops the background writer thread.
pub struct LoggingGuard {
    _file_guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Initializes stderr + rotating-file logging under `install_dir/fishtest.log`.
/// Honors `RUST_LOG` if set, defaulting to `info`.
pub fn init(install_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(install_dir)?;

    let file_appender = tracing_appender::rolling::never(install_dir, "fishtest.log");
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(true))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Path the integrity manager backs up before self-update.
pub fn log_path(install_dir: &Path) -> std::path::PathBuf {
    install_dir.join("fishtest.log")
}
