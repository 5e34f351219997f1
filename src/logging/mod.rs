// Logging module - tracing subscriber setup
//
// Human-readable logs go to stderr so they never interleave with a live tab
// log mirrored on stdout. File logging is optional, writes JSON lines through
// a non-blocking rolling appender, and needs its guard kept alive until exit.
//
// Precedence: RUST_LOG env var > config file level > "info"

use crate::config::LoggingConfig;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when RUST_LOG is not set
pub fn default_filter(level: &str) -> String {
    format!("httpdash={},warn", level)
}

/// Install the global subscriber
///
/// Returns the file writer guard when file logging is active.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&config.level)));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if !config.file_enabled {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        return None;
    }

    let file_appender = match file_appender(config) {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!(
                "Warning: Could not open log directory {:?}: {}",
                config.file_dir, e
            );
            // Fall back to stderr only
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            return None;
        }
    };

    // Writes happen on a background thread
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    Some(guard)
}

/// `<file_dir>/<prefix>.<date>.log`, rotated per config
fn file_appender(config: &LoggingConfig) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.file_dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(config.file_rotation.rotation())
        .filename_prefix(&config.file_prefix)
        .filename_suffix("log")
        .build(&config.file_dir)?;
    Ok(appender)
}
