//! Shared cache root: directory, in-process store and background task spawning

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use moka::sync::Cache;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

/// Thread-safe in-process store for metadata entries that are not written to disk
#[derive(Clone)]
pub struct MemoryStore {
    entries: Cache<String, serde_json::Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().build(),
        }
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.get(key)
    }

    pub fn insert(&self, key: String, value: serde_json::Value) {
        self.entries.insert(key, value);
    }

    pub fn remove(&self, key: &str) {
        self.entries.invalidate(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Root of a cache: owns the on-disk subtree and the in-process store.
///
/// Opened once and shared by every metadata and file cache handle.
pub struct CacheRoot {
    dir: PathBuf,
    max_attempts: u32,
    memory: MemoryStore,
    runtime: Handle,
    permits: Option<Arc<Semaphore>>,
}

impl CacheRoot {
    /// Open the cache root on the current tokio runtime
    pub fn open(config: CacheConfig) -> Result<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|e| {
            CacheError::Config(format!("cache must be opened inside a tokio runtime: {}", e))
        })?;
        Self::open_with_runtime(config, runtime)
    }

    /// Open the cache root, spawning background fetches on `runtime`
    pub fn open_with_runtime(config: CacheConfig, runtime: Handle) -> Result<Arc<Self>> {
        config.validate()?;
        ensure_directory(&config.cache_dir)?;
        info!(
            cache_dir = ?config.cache_dir,
            max_attempts = config.max_attempts,
            max_concurrent_fetches = ?config.max_concurrent_fetches,
            "Cache initialized"
        );

        Ok(Arc::new(Self {
            dir: config.cache_dir,
            max_attempts: config.max_attempts,
            memory: MemoryStore::new(),
            runtime,
            permits: config
                .max_concurrent_fetches
                .map(|n| Arc::new(Semaphore::new(n))),
        }))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Path relative to the root, for messages shown to users
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.dir)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    /// Spawn a background fetch, holding a concurrency permit while it runs
    pub(crate) fn spawn<F>(&self, task: F) -> PendingFetch
    where
        F: FnOnce(CancellationToken) -> BoxFuture<'static, ()>,
    {
        let cancel = CancellationToken::new();
        let work = task(cancel.clone());
        let permits = self.permits.clone();

        let handle = self.runtime.spawn(async move {
            let _permit = match permits {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };
            work.await;
        });

        PendingFetch { handle, cancel }
    }
}

/// Create the cache directory, refusing to use a path occupied by a file
fn ensure_directory(dir: &Path) -> Result<()> {
    match std::fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(CacheError::Config(format!(
            "cache path {:?} exists and is not a directory",
            dir
        ))),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            std::fs::create_dir_all(dir)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Handle to the work started by a `get` call
#[derive(Debug)]
pub enum Fetch {
    /// The callback already ran on the calling thread
    Ready,
    /// A background task will run the callback
    Pending(PendingFetch),
}

impl Fetch {
    pub fn is_ready(&self) -> bool {
        matches!(self, Fetch::Ready)
    }

    /// Ask a pending fetch to stop before its next attempt
    pub fn cancel(&self) {
        if let Fetch::Pending(pending) = self {
            pending.cancel();
        }
    }

    /// Wait until the callback has run
    pub async fn finished(self) {
        if let Fetch::Pending(pending) = self {
            pending.wait().await;
        }
    }
}

#[derive(Debug)]
pub struct PendingFetch {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl PendingFetch {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(self) {
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Background fetch did not complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_creates_directory() {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join("nested").join("cache");

        let root = CacheRoot::open(CacheConfig::new(&cache_dir)).unwrap();
        assert!(cache_dir.is_dir());
        assert_eq!(root.dir(), cache_dir.as_path());
        assert_eq!(root.max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_open_refuses_file_in_place_of_directory() {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        std::fs::write(&cache_dir, b"not a directory").unwrap();

        let result = CacheRoot::open(CacheConfig::new(&cache_dir));
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let dir = tempdir().unwrap();
        let result = CacheRoot::open(CacheConfig::new(dir.path()).with_max_attempts(0));
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[test]
    fn test_open_outside_runtime_fails() {
        let dir = tempdir().unwrap();
        let result = CacheRoot::open(CacheConfig::new(dir.path()));
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[tokio::test]
    async fn test_display_path_strips_root() {
        let dir = tempdir().unwrap();
        let root = CacheRoot::open(CacheConfig::new(dir.path())).unwrap();
        let path = dir.path().join("folder").join("file.cdf");
        assert_eq!(
            root.display_path(&path),
            PathBuf::from("folder").join("file.cdf").to_string_lossy()
        );
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(!store.contains("observatoryGroups"));

        store.insert("observatoryGroups".to_string(), serde_json::json!(["ACE"]));
        assert!(store.contains("observatoryGroups"));
        assert_eq!(store.get("observatoryGroups"), Some(serde_json::json!(["ACE"])));

        store.remove("observatoryGroups");
        assert!(store.get("observatoryGroups").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrency_limit_serializes_tasks() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let dir = tempdir().unwrap();
        let root =
            CacheRoot::open(CacheConfig::new(dir.path()).with_max_concurrent_fetches(1)).unwrap();

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut fetches = Vec::new();

        for _ in 0..4 {
            let running = running.clone();
            let peak = peak.clone();
            fetches.push(root.spawn(move |_cancel| {
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                }
                .boxed()
            }));
        }

        for fetch in fetches {
            fetch.wait().await;
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
