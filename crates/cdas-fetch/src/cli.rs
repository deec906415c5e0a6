use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "cdas-fetch",
    about = "Fetch CDAS metadata and data files through the local cache",
    version
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Cache directory (overrides CACHE_DIR)
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Number of attempts per request (overrides REQUEST_MAX_RETRIES)
    #[arg(long, global = true)]
    pub attempts: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download the data files listed in one or more descriptor files
    File {
        /// JSON files holding a data result, a descriptor list or one descriptor
        #[arg(required = true)]
        descriptors: Vec<PathBuf>,

        /// Download again even when the cached copy is fresh
        #[arg(long)]
        reload: bool,
    },

    /// Fetch a JSON document and print it
    Json {
        /// Cache key of the document
        key: String,

        /// Service path or absolute URL
        url: String,

        /// Fetch again even when the document is cached
        #[arg(long)]
        reload: bool,

        /// Keep the entry in memory instead of on disk
        #[arg(long)]
        memory: bool,
    },
}
