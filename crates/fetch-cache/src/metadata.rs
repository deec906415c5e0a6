//! Fetch-through cache for JSON-serializable service responses

use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{CacheError, Result};
use crate::producer::Producer;
use crate::retry::{with_retries, RetryError};
use crate::root::{CacheRoot, Fetch};
use crate::sanitize::sanitize_key;
use crate::types::Outcome;

/// Where a metadata entry is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    /// `<cache_dir>/<key>.json`
    Disk,
    /// The root's in-process store; lost when the process exits
    Memory,
}

type Combine<T> = Box<dyn FnOnce(Vec<T>) -> T + Send>;

/// A request for one metadata entry: the producers to run on a miss and how
/// to combine their results
pub struct MetadataRequest<T> {
    producers: Vec<Producer<T>>,
    process_response: Option<Combine<T>>,
    before_request: Option<Box<dyn FnOnce() + Send>>,
    reload: bool,
}

impl<T> MetadataRequest<T> {
    /// A single producer whose result is stored as is
    pub fn new(producer: Producer<T>) -> Self {
        Self {
            producers: vec![producer],
            process_response: None,
            before_request: None,
            reload: false,
        }
    }

    /// Several producers, run in order; `combine` receives their results in
    /// the same order
    pub fn all<F>(producers: Vec<Producer<T>>, combine: F) -> Self
    where
        F: FnOnce(Vec<T>) -> T + Send + 'static,
    {
        Self {
            producers,
            process_response: Some(Box::new(combine)),
            before_request: None,
            reload: false,
        }
    }

    /// Post-process the collected results before they are stored
    pub fn process_response<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Vec<T>) -> T + Send + 'static,
    {
        self.process_response = Some(Box::new(f));
        self
    }

    /// Called on the calling thread right before a fetch is started
    pub fn before_request<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.before_request = Some(Box::new(f));
        self
    }

    /// Ignore any stored entry and fetch again
    pub fn reload(mut self, reload: bool) -> Self {
        self.reload = reload;
        self
    }
}

/// Cache handle for one metadata key
pub struct MetadataCache<T> {
    root: Arc<CacheRoot>,
    key: String,
    backing: Backing,
    _value: PhantomData<fn() -> T>,
}

impl<T> MetadataCache<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    pub fn new(root: Arc<CacheRoot>, key: &str, backing: Backing) -> Self {
        Self {
            root,
            key: sanitize_key(key),
            backing,
            _value: PhantomData,
        }
    }

    /// The sanitized key
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn backing(&self) -> Backing {
        self.backing
    }

    pub fn path(&self) -> PathBuf {
        self.root.dir().join(format!("{}.json", self.key))
    }

    /// Read the stored entry without fetching
    pub fn load_cached(&self) -> Result<Option<T>> {
        match self.backing {
            Backing::Disk => match std::fs::read(self.path()) {
                Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            },
            Backing::Memory => match self.root.memory().get(&self.key) {
                Some(value) => Ok(Some(serde_json::from_value(value)?)),
                None => Ok(None),
            },
        }
    }

    /// Remove the stored entry
    pub fn invalidate(&self) -> Result<()> {
        match self.backing {
            Backing::Disk => match std::fs::remove_file(self.path()) {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            },
            Backing::Memory => {
                self.root.memory().remove(&self.key);
                Ok(())
            }
        }
    }

    /// Get the entry from the cache, or fetch it in the background.
    ///
    /// On a hit `on_complete` runs before this returns. Otherwise the
    /// `before_request` hook runs here and `on_complete` runs on a background
    /// task once the producers are done.
    pub fn get<F>(&self, request: MetadataRequest<T>, on_complete: F) -> Fetch
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        if !request.reload {
            match self.load_cached() {
                Ok(Some(value)) => {
                    debug!(key = %self.key, "Metadata cache hit");
                    on_complete(Outcome::Hit(value));
                    return Fetch::Ready;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(key = %self.key, error = %e, "Unreadable metadata entry, fetching again");
                }
            }
        }

        let MetadataRequest {
            producers,
            process_response,
            before_request,
            ..
        } = request;

        if let Some(hook) = before_request {
            hook();
        }

        let root = self.root.clone();
        let key = self.key.clone();
        let backing = self.backing;
        let path = self.path();

        Fetch::Pending(self.root.spawn(move |cancel| {
            async move {
                let outcome = match populate(&root, &cancel, producers, process_response).await {
                    Ok(value) => {
                        let encoded = serde_json::to_value(&value);
                        let stored = match encoded {
                            Ok(json) => persist(&root, &key, backing, &path, json).await,
                            Err(e) => Err(e.into()),
                        };
                        if let Err(e) = stored {
                            error!(key = %key, error = %e, "Failed to store metadata entry");
                        }
                        Outcome::Fetched(value)
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "Metadata request failed");
                        Outcome::Failed(e)
                    }
                };
                on_complete(outcome);
            }
            .boxed()
        }))
    }
}

async fn populate<T>(
    root: &CacheRoot,
    cancel: &CancellationToken,
    producers: Vec<Producer<T>>,
    process_response: Option<Combine<T>>,
) -> Result<T> {
    let mut results = Vec::with_capacity(producers.len());

    for producer in &producers {
        let value = with_retries(root.max_attempts(), cancel, |_| producer())
            .await
            .map_err(|e| match e {
                RetryError::Exhausted { attempts, last } => CacheError::Exhausted {
                    attempts,
                    source: last,
                },
                RetryError::Cancelled => CacheError::Cancelled,
            })?;
        results.push(value);
    }

    match process_response {
        Some(combine) => Ok(combine(results)),
        None => {
            // Only `MetadataRequest::new` leaves out the combining function
            debug_assert_eq!(results.len(), 1);
            results
                .pop()
                .ok_or_else(|| CacheError::Config("request has no producer".to_string()))
        }
    }
}

async fn persist(
    root: &CacheRoot,
    key: &str,
    backing: Backing,
    path: &Path,
    json: serde_json::Value,
) -> Result<()> {
    match backing {
        Backing::Disk => {
            let bytes = serde_json::to_vec(&json)?;
            let dir = root.dir().to_path_buf();
            let path = path.to_path_buf();
            // Staged and renamed so a concurrent hit never reads a partial entry
            tokio::task::spawn_blocking(move || -> Result<()> {
                let mut staged = NamedTempFile::new_in(dir)?;
                staged.write_all(&bytes)?;
                staged.persist(path).map_err(|e| e.error)?;
                Ok(())
            })
            .await
            .map_err(std::io::Error::other)??;
        }
        Backing::Memory => root.memory().insert(key.to_string(), json),
    }
    debug!(key, ?backing, "Stored metadata entry");
    Ok(())
}
