//! tally-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), layers
//! `TALLY__`-prefixed environment variables over it, opens the SQLite store
//! and serves the collection endpoints. In `queue` chain mode the
//! continuation worker runs in the same process.
//!
//! # Directory import
//!
//! ```text
//! tally-server --import-directory directory.json
//! ```
//!
//! loads classes, schedules, students and the name table, then exits.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Parser;
use tally_core::{directory::Directory, store::IngestStore};
use tally_server::{AppState, ServerConfig, settings::ChainMode, worker};
use tally_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Tally ingestion server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Load a directory snapshot (JSON) into the store and exit.
  #[arg(long, value_name = "FILE")]
  import_directory: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("TALLY").separator("__"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  if let Some(path) = cli.import_directory {
    return import_directory(&store, &path).await;
  }

  let state = AppState::new(store, server_cfg.clone())
    .context("failed to build upstream client")?;

  if server_cfg.chain.mode == ChainMode::Queue {
    tokio::spawn(worker::run(state.clone()));
    tracing::info!(
      poll_secs = server_cfg.chain.poll_interval_secs,
      "chain worker started"
    );
  }

  let app = tally_server::router(state);
  let address = format!("{}:{}", server_cfg.server.host, server_cfg.server.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

async fn import_directory(store: &SqliteStore, path: &Path) -> anyhow::Result<()> {
  let raw = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read {path:?}"))?;
  let directory: Directory =
    serde_json::from_str(&raw).with_context(|| format!("invalid directory file {path:?}"))?;

  let (classes, students, names) = (
    directory.classes.len(),
    directory.students.len(),
    directory.name_table.len(),
  );
  store
    .import_directory(directory)
    .await
    .context("failed to import directory")?;

  tracing::info!(classes, students, names, "directory imported");
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
