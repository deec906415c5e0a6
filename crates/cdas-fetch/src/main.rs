//! cdas-fetch - fetch CDAS metadata and data files through the local cache
//!
//! Cache hits are served without network access; misses are downloaded in the
//! background and stored for the next run.

mod cli;
mod commands;
mod config;
mod error;

use std::sync::Arc;

use cdas_client::CdasClient;
use clap::Parser;
use fetch_cache::CacheRoot;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::cli::{Args, Commands};
use crate::config::FetchConfig;
use crate::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("cdas_fetch=info".parse()?)
        .add_directive("fetch_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    };

    let config = FetchConfig::load(&args)?;
    info!("Cache dir: {:?}", config.cache.cache_dir);
    info!("Attempts per request: {}", config.cache.max_attempts);
    info!("Service: {}", config.base_url);

    let root = CacheRoot::open(config.cache)?;
    let client = CdasClient::with_timeout(&config.base_url, config.timeout)?;

    match args.command {
        Commands::File {
            descriptors,
            reload,
        } => {
            commands::run_file(root, client, &descriptors, reload).await?;
        }
        Commands::Json {
            key,
            url,
            reload,
            memory,
        } => {
            let value =
                commands::run_json(root, Arc::new(client), &key, &url, reload, memory).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}
