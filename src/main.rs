mod app;
mod config;
mod db;
mod jokes;
mod logging;
mod paging;
mod store;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "dadjokes")]
#[command(about = "A dad joke for every day, fetched from icanhazdadjoke.com")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/dadjokes/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Directory for the day database, preferences and logs
  #[arg(long)]
  data_dir: Option<PathBuf>,

  /// Days per page
  #[arg(long)]
  page_size: Option<u32>,

  #[command(subcommand)]
  command: Option<app::Command>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Command line wins over the file
  if let Some(dir) = args.data_dir {
    config.data_dir = Some(dir);
  }
  if let Some(page_size) = args.page_size {
    config.paging.page_size = page_size;
  }
  config.validate()?;

  let _log_guard = logging::init(&config.data_dir()?, &config.log_level)?;
  info!(version = env!("CARGO_PKG_VERSION"), "starting");

  // Initialize and run the app
  let app = app::App::new(config)?;
  let command = args.command.unwrap_or(app::Command::Today);
  let result = app.run(command, &mut std::io::stdout()).await;
  app.shutdown().await;

  result
}
