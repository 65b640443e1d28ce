//! wearcast cache admin - Main entry point

mod cli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wearcast_foundation::cache::PersistenceKind;
use wearcast_foundation::CacheSettings;

/// wearcast cache administration
#[derive(Parser, Debug)]
#[command(name = "wearcast-cache")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Snapshot directory (overrides cache.json)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Run against an empty in-memory cache (no snapshot is read or written)
    #[arg(long, global = true)]
    memory: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a cache key
    Key {
        #[command(subcommand)]
        domain: cli::KeyCommand,
    },
    #[command(flatten)]
    Cache(cli::CacheCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Load configuration
    let mut settings = CacheSettings::load().unwrap_or_else(|e| {
        tracing::warn!("Failed to load cache settings: {}", e);
        CacheSettings::default()
    });
    if let Some(dir) = args.data_dir {
        settings.data_dir = Some(dir);
    }
    if args.memory {
        settings.persistence = PersistenceKind::Memory;
    }

    match args.command {
        // Key building never touches a store
        Command::Key { domain } => {
            println!("{}", cli::build_key(&domain));
            Ok(())
        }
        Command::Cache(command) => {
            let admin = cli::Admin::open(settings);
            admin.run(command).await?;
            admin.flush().await
        }
    }
}
