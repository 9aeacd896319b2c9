//! Sync remote settings collections from the command line

use anyhow::Context;
use clap::Parser;
use remote_settings_client::RemoteSettingsService;
use remote_settings_core::{logging::init_tracing, ClientConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML or JSON)
    #[arg(long, short)]
    config: PathBuf,

    /// Collections to sync, in addition to the configured ones
    collections: Vec<String>,

    /// Print the records of every synced collection
    #[arg(long)]
    dump: bool,

    /// Keep running and sync on the configured interval until Ctrl+C
    #[arg(long)]
    watch: bool,

    /// Default log filter when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.json_logs)?;

    let mut config = ClientConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    for collection in args.collections {
        if !config.collections.contains(&collection) {
            config.collections.push(collection);
        }
    }
    info!(
        server = %config.server.url(),
        bucket = %config.bucket_name,
        collections = config.collections.len(),
        "Starting remote settings sync"
    );

    let service = Arc::new(RemoteSettingsService::builder(config).build().await?);
    let report = service.sync().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.dump {
        for id in service.active_collections() {
            let collection = service.get(&id).await;
            println!("{}", serde_json::to_string_pretty(&collection)?);
        }
    }

    if args.watch {
        service.start_polling();
        tokio::signal::ctrl_c().await?;
        info!("Interrupted");
    }

    service.shutdown().await;
    if !report.is_clean() {
        anyhow::bail!("some collections could not be synced");
    }
    Ok(())
}
