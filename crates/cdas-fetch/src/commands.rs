use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cdas_client::{CdasClient, DataResult};
use fetch_cache::{
    Backing, CacheRoot, CancellationToken, CdfFile, CdfFormat, FileCache, FileDescriptor,
    FileRequest, MetadataCache, MetadataRequest, Outcome, ProgressAggregator,
};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::error::{FetchError, Result};

const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(2);

/// Tally of outcomes delivered for one command
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub hits: usize,
    pub fetched: usize,
    pub stale: usize,
    pub failed: usize,
}

impl Summary {
    pub fn record<T>(&mut self, outcome: &Outcome<T>) {
        match outcome {
            Outcome::Hit(_) => self.hits += 1,
            Outcome::Fetched(_) => self.fetched += 1,
            Outcome::Stale { .. } => self.stale += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.hits + self.fetched + self.stale + self.failed
    }

    pub fn into_result(self) -> Result<Self> {
        if self.failed > 0 {
            return Err(FetchError::Incomplete {
                failed: self.failed,
                total: self.total(),
            });
        }
        Ok(self)
    }
}

/// Read descriptor files in any of the shapes the service produces
pub fn load_descriptors(paths: &[PathBuf]) -> Result<Vec<FileDescriptor>> {
    let mut descriptors = Vec::new();
    for path in paths {
        let json = std::fs::read_to_string(path)?;
        let mut found = DataResult::from_json(&json).map_err(|e| FetchError::Descriptor {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        descriptors.append(&mut found);
    }
    Ok(descriptors)
}

/// Fetch every described data file through the file cache
pub async fn run_file(
    root: Arc<CacheRoot>,
    client: CdasClient,
    paths: &[PathBuf],
    reload: bool,
) -> Result<Summary> {
    let descriptors = load_descriptors(paths)?;
    if descriptors.is_empty() {
        warn!("Descriptor files list no data files");
        return Ok(Summary::default());
    }
    info!(files = descriptors.len(), "Fetching data files");

    let cache = FileCache::new(root, CdfFormat, client);
    let aggregator = Arc::new(ProgressAggregator::new());
    for descriptor in &descriptors {
        aggregator.track(descriptor.name.clone());
    }

    let summary = Arc::new(Mutex::new(Summary::default()));
    let tally = summary.clone();
    let request = FileRequest::new()
        .reload(reload)
        .progress(aggregator.callback())
        .before_request(|| info!("Starting download"));

    let fetches = cache.get_all(&descriptors, request, move |descriptor, outcome| {
        report_file(descriptor, &outcome);
        if let Ok(mut summary) = tally.lock() {
            summary.record(&outcome);
        }
    });

    let stop = CancellationToken::new();
    let logger = tokio::spawn(log_progress(aggregator.clone(), stop.clone()));
    for fetch in fetches {
        fetch.finished().await;
    }
    stop.cancel();
    let _ = logger.await;

    let summary = *summary
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    info!(
        hits = summary.hits,
        fetched = summary.fetched,
        stale = summary.stale,
        failed = summary.failed,
        "Data files done"
    );
    summary.into_result()
}

fn report_file(descriptor: &FileDescriptor, outcome: &Outcome<CdfFile>) {
    match outcome {
        Outcome::Hit(file) => {
            info!(file = %descriptor.name, path = %file.path.display(), "Loaded from cache")
        }
        Outcome::Fetched(file) => info!(
            file = %descriptor.name,
            path = %file.path.display(),
            size = file.size,
            "Downloaded"
        ),
        Outcome::Stale { value, error } => warn!(
            file = %descriptor.name,
            path = %value.path.display(),
            error = %error,
            "Download failed, using cached copy"
        ),
        Outcome::Failed(e) => error!(file = %descriptor.name, error = %e, "Could not obtain file"),
    }
}

async fn log_progress(aggregator: Arc<ProgressAggregator>, stop: CancellationToken) {
    let mut interval = tokio::time::interval(PROGRESS_LOG_INTERVAL);
    interval.tick().await;
    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = interval.tick() => {
                if aggregator.is_indeterminate() {
                    info!(files = aggregator.len(), "Downloading");
                } else {
                    info!(percent = %format!("{:.1}", aggregator.percent()), "Downloading");
                }
            }
        }
    }
}

/// Fetch one JSON document through the metadata cache and return it
pub async fn run_json(
    root: Arc<CacheRoot>,
    client: Arc<CdasClient>,
    key: &str,
    url: &str,
    reload: bool,
    memory: bool,
) -> Result<serde_json::Value> {
    let backing = if memory { Backing::Memory } else { Backing::Disk };
    let cache = MetadataCache::<serde_json::Value>::new(root, key, backing);
    let request = MetadataRequest::new(client.json_producer(url)).reload(reload);

    let (tx, rx) = oneshot::channel();
    let fetch = cache.get(request, move |outcome| {
        let _ = tx.send(outcome);
    });
    fetch.finished().await;

    let outcome = rx.await.map_err(|_| fetch_cache::CacheError::Cancelled)?;
    match outcome {
        Outcome::Hit(value) => {
            info!(key, "Loaded from cache");
            Ok(value)
        }
        Outcome::Fetched(value) => {
            info!(key, "Fetched");
            Ok(value)
        }
        Outcome::Stale { value, error } => {
            warn!(key, error = %error, "Fetch failed, using cached copy");
            Ok(value)
        }
        Outcome::Failed(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fetch_cache::{CacheConfig, CacheError};

    #[test]
    fn test_summary_counts_outcomes() {
        let mut summary = Summary::default();
        summary.record(&Outcome::Hit(1));
        summary.record(&Outcome::Fetched(2));
        summary.record(&Outcome::Stale {
            value: 3,
            error: CacheError::Cancelled,
        });
        assert_eq!(summary.total(), 3);
        assert!(summary.into_result().is_ok());

        summary.record::<u32>(&Outcome::Failed(CacheError::Cancelled));
        let err = summary.into_result().unwrap_err();
        assert!(matches!(
            err,
            FetchError::Incomplete {
                failed: 1,
                total: 4
            }
        ));
    }

    #[test]
    fn test_load_descriptors_from_several_files() {
        let dir = tempfile::tempdir().unwrap();
        let single = FileDescriptor::new("https://example.org/tmp/a/one.cdf", 10, Utc::now());
        let list = vec![
            FileDescriptor::new("https://example.org/tmp/a/two.cdf", 10, Utc::now()),
            FileDescriptor::new("https://example.org/tmp/a/three.cdf", 10, Utc::now()),
        ];

        let first = dir.path().join("single.json");
        let second = dir.path().join("list.json");
        std::fs::write(&first, serde_json::to_string(&single).unwrap()).unwrap();
        std::fs::write(&second, serde_json::to_string(&list).unwrap()).unwrap();

        let descriptors = load_descriptors(&[first, second]).unwrap();
        assert_eq!(descriptors.len(), 3);
        assert_eq!(descriptors[0], single);
    }

    #[test]
    fn test_load_descriptors_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "<html></html>").unwrap();

        let err = load_descriptors(&[path]).unwrap_err();
        assert!(matches!(err, FetchError::Descriptor { .. }));
    }

    #[tokio::test]
    async fn test_run_json_serves_cached_entry_offline() {
        let dir = tempfile::tempdir().unwrap();
        let root = CacheRoot::open(CacheConfig::new(dir.path())).unwrap();
        std::fs::write(
            dir.path().join("observatories.json"),
            r#"{"Observatory":["ACE"]}"#,
        )
        .unwrap();
        // Unroutable endpoint: a cache miss would fail
        let client = Arc::new(CdasClient::with_base_url("http://127.0.0.1:9").unwrap());

        let value = run_json(root, client, "observatories", "observatories", false, false)
            .await
            .unwrap();
        assert_eq!(value["Observatory"][0], "ACE");
    }

    #[tokio::test]
    async fn test_run_file_with_no_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let root = CacheRoot::open(CacheConfig::new(dir.path().join("cache"))).unwrap();
        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, r#"{"FileDescription": []}"#).unwrap();
        let client = CdasClient::with_base_url("http://127.0.0.1:9").unwrap();

        let summary = run_file(root, client, &[empty], false).await.unwrap();
        assert_eq!(summary.total(), 0);
    }
}
