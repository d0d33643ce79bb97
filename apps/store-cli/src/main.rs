//! store-cli — admin tool for the record store.
//!
//! Composition root of the workspace: loads configuration from the
//! environment, installs the tracing subscriber, picks the storage backend and
//! runs one command against the installation, tag and upgrade stores. Results
//! are printed to stdout as JSON; logs go to stderr.
//!
//! Run:
//! ```bash
//! # sqlite file at ./data/records.db (default)
//! cargo run -p store-cli -- tag create --org DEFAULT --name prod
//!
//! # throwaway in-memory backend, JSON logs
//! STORAGE_PROVIDER=memory LOG_FORMAT=json cargo run -p store-cli -- installation init
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use domain::adapters::memory_repo::{
    InMemoryInstallationRepo, InMemoryTagRepo, InMemoryUpgradeRecordRepo,
};
use serde_json::Value;
use sqlite_adapter::SqliteRepo;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{execute, Cli, Command, Stores};
use config::{Config, LogFormat, StorageProvider};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    init_tracing(&cfg, cli.verbose);
    cfg.warn_if_ephemeral();

    match run(cli.command, &cfg).await {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(out) => println!("{out}"),
            Err(e) => {
                eprintln!("error: encode output: {e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(cfg: &Config, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
}

/// Build the stores for the configured backend and run `command`.
async fn run(command: Command, cfg: &Config) -> Result<Value> {
    match cfg.storage_provider {
        StorageProvider::Memory => {
            let stores = Stores::new(
                InMemoryInstallationRepo::new(),
                InMemoryTagRepo::new(),
                InMemoryUpgradeRecordRepo::new(),
                cfg.op_timeout,
            );
            execute(command, &stores).await
        }
        StorageProvider::Sqlite => {
            let repo = SqliteRepo::open_creating_dirs(&cfg.db_path)
                .with_context(|| format!("open sqlite store at {}", cfg.db_path.display()))?;
            info!(path = %cfg.db_path.display(), "using sqlite store");
            let stores = Stores::new(repo.clone(), repo.clone(), repo, cfg.op_timeout);
            execute(command, &stores).await
        }
    }
}
