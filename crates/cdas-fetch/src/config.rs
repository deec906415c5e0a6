use std::time::Duration;

use cdas_client::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
use fetch_cache::CacheConfig;

use crate::cli::Args;
use crate::error::Result;

/// Configuration of the command line: cache settings plus the service endpoint
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub cache: CacheConfig,
    pub base_url: String,
    pub timeout: Duration,
}

impl FetchConfig {
    /// Read the environment, then apply command-line overrides
    pub fn load(args: &Args) -> Result<Self> {
        let mut config = Self::from_lookup(CacheConfig::from_env(), |name| {
            std::env::var(name).ok()
        });
        if let Some(dir) = &args.cache_dir {
            config.cache.cache_dir = dir.clone();
        }
        if let Some(attempts) = args.attempts {
            config.cache.max_attempts = attempts;
        }
        config.cache.validate()?;
        Ok(config)
    }

    fn from_lookup<F>(cache: CacheConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("CDAS_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout_secs = lookup("CDAS_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            cache,
            base_url,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}
