use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use libterm::app::App;
use libterm::config::Config;
use libterm::library::Library;
use libterm::session::{Session, SqliteKvStore, Theme};

#[derive(Parser, Debug)]
#[command(name = "libterm")]
#[command(about = "A terminal client for the campus library")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/libterm/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Library API base URL, e.g. https://library.example.edu/api
  #[arg(long)]
  api_url: Option<String>,

  /// Save this auth token for the session
  #[arg(long)]
  token: Option<String>,

  /// Color theme to use and remember (dark or light)
  #[arg(long)]
  theme: Option<Theme>,
}

/// Log to a daily file under the data directory; the terminal belongs to
/// the UI. Filter with LIBTERM_LOG, e.g. `LIBTERM_LOG=libterm=debug`.
fn init_tracing() -> Result<WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("libterm")
    .join("logs");

  let appender = tracing_appender::rolling::daily(log_dir, "libterm.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env("LIBTERM_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::registry()
    .with(filter)
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_tracing()?;

  let mut config = Config::load(args.config.as_deref())?;
  if let Some(api_url) = args.api_url {
    config.override_api_url(api_url);
  }

  let session = Session::new(SqliteKvStore::open()?);
  if let Some(token) = args.token.as_deref() {
    session.set_token(token)?;
  }
  if let Some(theme) = args.theme {
    session.set_theme(theme)?;
  }
  if !session.is_authenticated() {
    tracing::warn!("no auth token saved, requests will be anonymous");
  }

  let library = Library::new(config, session)?;
  tracing::info!(?library, "starting");

  let mut app = App::new(library);
  app.run().await?;

  if let Some(message) = app.exit_message() {
    println!("{}", message);
  }

  Ok(())
}
