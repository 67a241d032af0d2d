use anyhow::{bail, Context, Result};
use clap::Parser;
use prephub_runtime::{ContentService, DurableStore, FileStore, ProviderRegistry, RuntimeConfig};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = RuntimeConfig::load(cli.config.as_deref())
        .with_context(|| "Failed to load runtime config")?;

    let store = match &cli.cache_file {
        Some(path) => Some(Arc::new(
            FileStore::open(path)
                .await
                .with_context(|| format!("Failed to open cache file {}", path.display()))?,
        )),
        None => None,
    };

    if let Commands::PurgeCache = cli.command {
        let Some(store) = store else {
            bail!("purge-cache needs --cache-file");
        };
        let removed = store.purge_expired(chrono::Utc::now()).await?;
        tracing::info!(removed, "Purged expired cache records");
        println!("{}", serde_json::json!({ "removed": removed }));
        return Ok(());
    }

    let service = ContentService::from_config(
        &config,
        &ProviderRegistry::with_defaults(),
        store.map(|s| s as Arc<dyn DurableStore>),
    );
    commands::run(&service, cli.command).await
}
