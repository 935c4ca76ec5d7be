//! famdocs server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered under
//! `FAMDOCS__*` environment variables, opens the SQLite store, connects the
//! remote collaborators and serves the JSON API over HTTP.
//!
//! Nested keys use a double underscore, e.g. `FAMDOCS__KEYCLOAK__URL`.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Parser;
use famdocs_remote::{KeycloakIdentity, OllamaGenerator, PaperlessArchive};
use famdocs_server::{AppState, ServerConfig, sweeper};
use famdocs_store_sqlite::SqliteStore;
use famdocs_workflow::{Backend, PdfRenderer, Services};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "famdocs document generation server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

/// The production collaborators.
struct Live;

impl Backend for Live {
  type Store = SqliteStore;
  type Identity = KeycloakIdentity;
  type Generator = OllamaGenerator;
  type Archive = PaperlessArchive;
  type Renderer = PdfRenderer;
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
    .add_source(
      config::Environment::with_prefix("FAMDOCS")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let identity = KeycloakIdentity::new(server_cfg.keycloak.clone())
    .context("failed to build the Keycloak client")?;
  let generator = OllamaGenerator::new(server_cfg.ollama.clone())
    .context("failed to build the Ollama client")?;
  let archive = PaperlessArchive::new(server_cfg.paperless.clone())
    .context("failed to build the Paperless client")?;

  let services = Services::<Live>::new(store, identity, generator, archive, PdfRenderer)
    .with_budget(server_cfg.generation.into());

  let sweeper = sweeper::spawn(services.store.clone(), server_cfg.reservations);

  let app = famdocs_server::router(AppState::new(services));
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  let served = axum::serve(listener, app).await.context("server error");
  sweeper.abort();
  served
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
