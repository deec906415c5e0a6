use std::env;
use std::path::PathBuf;

use crate::error::{CacheError, Result};

/// Production attempt budget. A budget of 1 means requests are not retried.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;
pub const DEFAULT_CACHE_DIR: &str = "./cache";

/// Cache configuration parsed from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Root directory holding JSON entries and downloaded files
    pub cache_dir: PathBuf,
    /// Number of times a producer or download is attempted
    pub max_attempts: u32,
    /// Upper bound on background fetches running at once (unbounded if `None`)
    pub max_concurrent_fetches: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_concurrent_fetches: None,
        }
    }
}

impl CacheConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = Some(limit);
        self
    }

    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        let cache_dir = env::var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_DIR));

        let max_attempts = env::var("REQUEST_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);

        let max_concurrent_fetches = env::var("MAX_CONCURRENT_FETCHES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0);

        Self {
            cache_dir,
            max_attempts,
            max_concurrent_fetches,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(CacheError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_fetches == Some(0) {
            return Err(CacheError::Config(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
