//! provides logging helpers

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::InitError;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// Environment variable read by daemons for their log file location.
pub const LOG_PATH_ENV_VAR: &str = "HOST_SYNC_LOG_PATH";

const DEFAULT_LOG_FILE: &str = "host-sync.log";
const MAX_LOG_FILES: usize = 7;

fn env_filter() -> filter::EnvFilter {
    filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy()
}

/// Split a log path into the rolling appender's directory and file prefix.
fn appender_location(log_path: &Path) -> (&Path, &str) {
    let directory = log_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let prefix = log_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);
    (directory, prefix)
}

/// initiate the global tracing subscriber
///
/// Logs go to stderr unless `log_path` is given, in which case they are
/// written to a daily rotated file through a non-blocking writer. The returned
/// guard flushes that writer on drop and must be held for the process lifetime.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created.
pub fn init<P: AsRef<Path>>(log_path: Option<P>) -> Result<Option<WorkerGuard>, InitError> {
    let Some(log_path) = log_path else {
        let fmt_layer = layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(env_filter());
        registry().with(fmt_layer).init();
        return Ok(None);
    };

    let (directory, prefix) = appender_location(log_path.as_ref());
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(MAX_LOG_FILES)
        .build(directory)?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let fmt_layer = layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(env_filter());
    registry().with(fmt_layer).init();
    Ok(Some(guard))
}
