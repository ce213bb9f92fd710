use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_NAME: &str = "anyrouter.log";

/// Initialize tracing with a stderr layer and a file layer.
/// Logs are appended to `<logs_dir>/anyrouter.log`. `RUST_LOG` overrides
/// `default_level` when set.
///
/// The returned guard flushes the file writer on drop, so keep it alive for
/// the lifetime of the program.
pub fn init_logging(logs_dir: &Path, default_level: &str) -> Result<(PathBuf, WorkerGuard)> {
    std::fs::create_dir_all(logs_dir)?;
    let log_path = logs_dir.join(LOG_FILE_NAME);

    // Create file appender (non-blocking for better performance)
    let file_appender = tracing_appender::rolling::never(logs_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false) // No ANSI codes in log file
        .with_target(true)
        .with_line_number(true);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok((log_path, guard))
}
