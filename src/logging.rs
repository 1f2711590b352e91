//! Log output goes to a daily rolling file so it never mixes with command
//! output on stdout.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "dadjokes.log";

/// Install the global subscriber writing to `<data_dir>/logs`.
///
/// `RUST_LOG` wins over `default_level`. The returned guard flushes pending
/// lines when dropped, so it must live until the process exits.
pub fn init(data_dir: &Path, default_level: &str) -> Result<WorkerGuard> {
  let log_dir = data_dir.join("logs");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let filter = match EnvFilter::try_from_default_env() {
    Ok(filter) => filter,
    Err(_) => EnvFilter::try_new(default_level)
      .map_err(|e| eyre!("Invalid log level '{}': {}", default_level, e))?,
  };

  let appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .try_init()
    .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

  Ok(guard)
}
