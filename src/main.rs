mod app;
mod commands;
mod event;
mod logging;
mod ui;

use aurora_cache::config::Config;
use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "aurora-cache")]
#[command(about = "A terminal browser for the entity tree and datasets of an AURORA server")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/aurora-cache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Server URL, overriding the one in the config file
  #[arg(short, long)]
  server: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Override server if specified on command line
  if let Some(url) = args.server {
    config.server.url = url;
  }

  let _log_guard = logging::init()?;
  info!(server = %config.server.url, "Starting aurora-cache");

  // Initialize and run the app
  let mut app = app::App::new(config)?;
  app.run().await?;

  Ok(())
}
