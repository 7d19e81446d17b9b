use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Route tracing output to a daily rolling file.
///
/// Stdout stays free for command output. Keep the returned guard alive for
/// the lifetime of the process or buffered lines are lost.
pub fn init(config: &LogConfig, verbose: bool) -> Result<WorkerGuard> {
  let directory = config.directory()?;
  std::fs::create_dir_all(&directory)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", directory.display(), e))?;

  let appender = tracing_appender::rolling::daily(&directory, "tidewater.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let default_directive = match (verbose, config.filter.as_deref()) {
    (true, _) => "tidewater=debug",
    (false, Some(filter)) => filter,
    (false, None) => "info",
  };
  let filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(default_directive))
    .map_err(|e| eyre!("Invalid log filter {}: {}", default_directive, e))?;

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
