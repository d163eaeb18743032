use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log filter directives.
const LOG_ENV: &str = "AURORA_CACHE_LOG";

/// Log to a daily rolling file, since the terminal belongs to the UI.
///
/// The returned guard flushes pending lines when dropped and must live until
/// the app exits.
pub fn init() -> Result<WorkerGuard> {
  let dir = log_dir();
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&dir, "aurora-cache.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .try_init()
    .map_err(|e| eyre!("Failed to install logger: {}", e))?;

  Ok(guard)
}

fn log_dir() -> PathBuf {
  dirs::data_dir()
    .unwrap_or_else(std::env::temp_dir)
    .join("aurora-cache")
    .join("logs")
}
