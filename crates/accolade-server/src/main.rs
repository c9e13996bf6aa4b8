//! accolade server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) layered with
//! `ACCOLADE__*` environment variables, opens the relational and document
//! SQLite stores, credits any verified achievements still missing their
//! award, and serves the JSON API over HTTP.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string stored in `users.password_hash`:
//!
//! ```
//! cargo run -p accolade-server --bin server -- --hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use accolade_core::Workflow;
use accolade_server::{AppState, ServerConfig};
use accolade_store_sqlite::{SqliteDocumentStore, SqliteStore};
use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Accolade achievement server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
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

  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("ACCOLADE").separator("__"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  server_cfg
    .points
    .validate()
    .context("invalid points policy")?;

  let relational_path = expand_tilde(&server_cfg.relational_store_path);
  let document_path = expand_tilde(&server_cfg.document_store_path);

  let relational = SqliteStore::open(&relational_path)
    .await
    .with_context(|| format!("failed to open relational store at {relational_path:?}"))?;
  let documents = SqliteDocumentStore::open(&document_path)
    .await
    .with_context(|| format!("failed to open document store at {document_path:?}"))?;

  let workflow = Workflow::new(
    Arc::new(relational),
    Arc::new(documents),
    server_cfg.workflow_config(),
  );

  match workflow.reconcile_awards().await {
    Ok(credited) if credited.is_empty() => {}
    Ok(credited) => tracing::info!(count = credited.len(), "reconciled pending awards"),
    Err(e) => tracing::warn!(error = %e, "award reconciliation failed; will retry on next start"),
  }

  let address = format!("{}:{}", server_cfg.host, server_cfg.port);
  let state = AppState { workflow, config: Arc::new(server_cfg) };
  let app = accolade_server::router(state);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password line from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
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
