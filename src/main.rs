//! # itemcast
//!
//! Key-value CRUD server binary. Wires settings, logging, the item store
//! and the HTTP/WebSocket server together.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use itemcast_server::ItemcastServer;
use itemcast_settings::Settings;
use itemcast_store::{Database, ItemRepo};

/// Key-value item server with websocket change broadcast.
#[derive(Parser, Debug)]
#[command(name = "itemcast", version, about)]
struct Cli {
    /// JSON settings file (defaults to `itemcast.json` if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the server (default).
    Serve(ServeArgs),
    /// Print a greeting.
    Greet {
        /// Who to greet.
        name: String,
    },
}

/// Overrides applied on top of the loaded settings.
#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` database, or `:memory:`.
    #[arg(long)]
    db_path: Option<String>,
}

impl ServeArgs {
    fn apply(self, settings: &mut Settings) {
        if let Some(host) = self.host {
            settings.server.host = host;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(db_path) = self.db_path {
            settings.store.db_path = db_path;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Greet { name } => {
            println!("{}", itemcast_core::greeting::greet(&name));
            Ok(())
        }
        Command::Serve(args) => serve(cli.config.as_deref(), args).await,
    }
}

async fn serve(config: Option<&Path>, args: ServeArgs) -> Result<()> {
    let mut settings = itemcast_settings::load_settings(config).context("Failed to load settings")?;
    args.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    itemcast_logging::init_subscriber(&settings.logging);
    let metrics_handle =
        itemcast_server::metrics::install_recorder().context("Failed to install metrics recorder")?;

    let db = Database::open(Path::new(&settings.store.db_path))
        .with_context(|| format!("Failed to open database: {}", settings.store.db_path))?;
    let items = ItemRepo::new(db);

    let shutdown_timeout = Duration::from_secs(settings.server.shutdown_timeout_secs);
    let server = ItemcastServer::new(settings.server, items, metrics_handle);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("itemcast listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if server.shutdown().drain(handle, shutdown_timeout).await {
        tracing::info!("Shutdown complete");
    } else {
        tracing::warn!("Shutdown incomplete, exiting anyway");
    }
    Ok(())
}
