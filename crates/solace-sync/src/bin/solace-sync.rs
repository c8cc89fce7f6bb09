//! # solace-sync CLI
//!
//! Runs the sync engine against a JSON state file, for development and for
//! headless installs.
//!
//! ## Usage
//! ```bash
//! # Keep syncing until Ctrl-C, then push one last time
//! solace-sync --state ./state.json run --user-id 8f0c…
//!
//! # Pull then push once and print the resulting status
//! solace-sync --state ./state.json once --user-id 8f0c…
//!
//! # Show the resolved configuration and the last confirmed sync
//! solace-sync status
//! ```
//!
//! Configuration comes from `sync.toml` and `SOLACE_*` variables; see
//! `SyncConfig`. Log verbosity follows `RUST_LOG`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use solace_core::StateMap;
use solace_db::{Database, DbConfig};
use solace_sync::local::read_confirmation;
use solace_sync::{
    MemoryStateContainer, PostgrestRemoteStore, RemoteStore, StateContainer, SyncConfig,
    SyncEngine, SyncEngineBuilder, SyncError,
};

#[derive(Debug, Parser)]
#[command(name = "solace-sync", version, about = "Solace cloud sync engine")]
struct Cli {
    /// Config file (defaults to the platform config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON file holding the application state.
    #[arg(long, global = true, default_value = "solace-state.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sync continuously until interrupted.
    Run(SessionArgs),
    /// Pull, push once, print the status and exit.
    Once(SessionArgs),
    /// Print configuration and the last confirmed sync time.
    Status,
}

#[derive(Debug, clap::Args)]
struct SessionArgs {
    /// Signed-in user whose record is synced.
    #[arg(long, env = "SOLACE_USER_ID")]
    user_id: String,

    /// The user's access token; the API key is used when absent.
    #[arg(long, env = "SOLACE_ACCESS_TOKEN")]
    access_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let cli = Cli::parse();
    let config = SyncConfig::load(cli.config.clone())?;

    match cli.command {
        Command::Status => print_status(&config).await?,
        Command::Run(args) => run(&config, &cli.state, args, true).await?,
        Command::Once(args) => run(&config, &cli.state, args, false).await?,
    }

    Ok(())
}

/// Initializes the tracing subscriber for logging.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,solace=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn open_database(config: &SyncConfig) -> Result<Database, SyncError> {
    let path = config
        .database_path()
        .ok_or_else(|| SyncError::InvalidConfig("no database path available".into()))?;
    info!(path = %path.display(), "Opening local database");
    Ok(Database::new(DbConfig::new(path)).await?)
}

async fn run(
    config: &SyncConfig,
    state_path: &Path,
    args: SessionArgs,
    continuous: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !config.is_sync_enabled() {
        warn!("Sync is disabled or no remote URL is configured, nothing to do");
        return Ok(());
    }

    let container = Arc::new(MemoryStateContainer::with_state(load_state(state_path).await?));
    let db = open_database(config).await?;

    let mut remote = PostgrestRemoteStore::from_config(config)?;
    if let Some(token) = args.access_token {
        remote = remote.with_access_token(token);
    }
    let remote: Arc<dyn RemoteStore> = Arc::new(remote);

    let engine = SyncEngineBuilder::from_config(container.clone(), config)
        .with_local_store(Arc::new(db.clone()))
        .build()?;

    let subscription = engine.subscribe(|info| {
        info!(status = %info.status, last_synced_at = ?info.last_synced_at, error = ?info.error, "Sync status");
    });

    engine.start(remote, args.user_id).await?;

    if continuous {
        info!("Syncing, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
        info!("Shutting down");
        finish(&engine, config).await;
    } else {
        let outcome = engine.sync_now().await;
        info!(?outcome, "Sync finished");
    }

    let status = engine.status();
    engine.stop().await;
    subscription.unsubscribe();

    save_state(state_path, &container.snapshot()).await?;
    db.close().await;

    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn finish(engine: &SyncEngine, config: &SyncConfig) {
    match engine.flush_before_exit(config.exit_flush_timeout()).await {
        Some(outcome) => info!(?outcome, "Final push done"),
        None => warn!("Final push abandoned"),
    }
}

async fn print_status(config: &SyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("device:        {} ({})", config.device.name, config.device_id());
    println!("remote:        {}", config.remote_url().unwrap_or("<not configured>"));
    println!("table:         {}", config.remote.table);
    println!("sync enabled:  {}", config.is_sync_enabled());

    let db = open_database(config).await?;
    match read_confirmation(&db).await? {
        Some(at) => println!("last confirmed: {at}"),
        None => println!("last confirmed: never"),
    }
    db.close().await;
    Ok(())
}

async fn load_state(path: &Path) -> Result<StateMap, SyncError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No state file yet, starting empty");
            Ok(StateMap::new())
        }
        Err(e) => Err(SyncError::LocalStore(e.to_string())),
    }
}

async fn save_state(path: &Path, state: &StateMap) -> Result<(), SyncError> {
    let contents = serde_json::to_string_pretty(state)?;
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| SyncError::LocalStore(e.to_string()))
}
