//! Fetch-through cache for binary data files
//!
//! Files live at `<cache_dir>/<remote folder>/<remote file>`. A cached file is
//! fresh when its modification time is not older than the descriptor's
//! `last_modified`. Downloads go to a temporary file in the cache root and are
//! renamed over the cached path only once complete, so the previous version
//! stays available as a fallback when every attempt fails.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use tempfile::{NamedTempFile, TempPath};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BoxError, CacheError, Result};
use crate::retry::{with_retries, RetryError};
use crate::root::{CacheRoot, Fetch};
use crate::sanitize::artifact_relative_path;
use crate::types::{FileDescriptor, Outcome, Progress, ProgressCallback};
use crate::validate::{open_or_discard, ArtifactFormat};

/// Transfers a remote file to a local path
#[async_trait]
pub trait Downloader: Send + Sync + 'static {
    /// Write the content of `descriptor` to `dest`, reporting progress along
    /// the way. `dest` already exists and is empty.
    async fn download(
        &self,
        descriptor: &FileDescriptor,
        dest: &Path,
        progress: &Progress,
    ) -> std::result::Result<(), BoxError>;
}

/// Options for a file `get`
#[derive(Clone, Default)]
pub struct FileRequest {
    reload: bool,
    before_request: Option<Arc<dyn Fn() + Send + Sync>>,
    progress: Option<ProgressCallback>,
    tag: Option<String>,
}

impl FileRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Download again even when the cached file is fresh
    pub fn reload(mut self, reload: bool) -> Self {
        self.reload = reload;
        self
    }

    /// Called on the calling thread right before a download is started
    pub fn before_request<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.before_request = Some(Arc::new(f));
        self
    }

    pub fn progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Tag attached to progress reports; defaults to the remote file name.
    ///
    /// With `FileCache::get_all` over several descriptors each download is
    /// tagged `<tag>/<remote name>` so their reports stay apart.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Cache of binary files of one format
pub struct FileCache<F: ArtifactFormat, D: Downloader> {
    root: Arc<CacheRoot>,
    format: Arc<F>,
    downloader: Arc<D>,
}

impl<F: ArtifactFormat, D: Downloader> Clone for FileCache<F, D> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            format: self.format.clone(),
            downloader: self.downloader.clone(),
        }
    }
}

impl<F: ArtifactFormat, D: Downloader> FileCache<F, D> {
    pub fn new(root: Arc<CacheRoot>, format: F, downloader: D) -> Self {
        Self {
            root,
            format: Arc::new(format),
            downloader: Arc::new(downloader),
        }
    }

    pub fn root(&self) -> &CacheRoot {
        &self.root
    }

    /// Local path of the file described by `descriptor`
    pub fn path_for(&self, descriptor: &FileDescriptor) -> Result<PathBuf> {
        Ok(self
            .root
            .dir()
            .join(artifact_relative_path(&descriptor.name)?))
    }

    /// Get a file from the cache, or download it in the background.
    ///
    /// On a fresh hit `on_complete` runs before this returns.
    pub fn get<C>(&self, descriptor: &FileDescriptor, request: FileRequest, on_complete: C) -> Fetch
    where
        C: FnOnce(Outcome<F::Artifact>) + Send + 'static,
    {
        let path = match self.path_for(descriptor) {
            Ok(path) => path,
            Err(e) => {
                on_complete(Outcome::Failed(e));
                return Fetch::Ready;
            }
        };
        let progress = Progress::new(
            request.progress.clone(),
            request.tag.clone().unwrap_or_else(|| descriptor.name.clone()),
        );

        if !request.reload && is_fresh(&path, descriptor.last_modified) {
            match open_or_discard(self.format.as_ref(), self.root.dir(), &path) {
                Ok(artifact) => {
                    debug!(path = %path.display(), "File cache hit");
                    progress.report(Some(1.0), "Loaded from cache");
                    on_complete(Outcome::Hit(artifact));
                    return Fetch::Ready;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cached file unreadable, downloading again");
                }
            }
        }

        if let Some(hook) = &request.before_request {
            hook();
        }

        let job = DownloadJob {
            root: self.root.clone(),
            format: self.format.clone(),
            downloader: self.downloader.clone(),
            descriptor: descriptor.clone(),
            path,
            progress,
        };
        Fetch::Pending(self.root.spawn(move |cancel| {
            async move {
                let outcome = job.run(&cancel).await;
                on_complete(outcome);
            }
            .boxed()
        }))
    }

    /// Get several files; each is looked up and downloaded independently and
    /// reported through `on_complete` together with its descriptor
    pub fn get_all<C>(
        &self,
        descriptors: &[FileDescriptor],
        request: FileRequest,
        on_complete: C,
    ) -> Vec<Fetch>
    where
        C: Fn(&FileDescriptor, Outcome<F::Artifact>) + Send + Sync + 'static,
    {
        let on_complete = Arc::new(on_complete);
        descriptors
            .iter()
            .map(|descriptor| {
                let on_complete = on_complete.clone();
                let owned = descriptor.clone();
                let mut request = request.clone();
                if descriptors.len() > 1 {
                    request.tag = request
                        .tag
                        .take()
                        .map(|tag| format!("{}/{}", tag, descriptor.name));
                }
                self.get(descriptor, request, move |outcome| {
                    on_complete(&owned, outcome)
                })
            })
            .collect()
    }
}

fn is_fresh(path: &Path, last_modified: DateTime<Utc>) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta
            .modified()
            .map(|modified| DateTime::<Utc>::from(modified) >= last_modified)
            .unwrap_or(false),
        _ => false,
    }
}

struct DownloadJob<F: ArtifactFormat, D: Downloader> {
    root: Arc<CacheRoot>,
    format: Arc<F>,
    downloader: Arc<D>,
    descriptor: FileDescriptor,
    path: PathBuf,
    progress: Progress,
}

impl<F: ArtifactFormat, D: Downloader> DownloadJob<F, D> {
    async fn run(self, cancel: &CancellationToken) -> Outcome<F::Artifact> {
        let started = SystemTime::now();
        let downloaded = with_retries(self.root.max_attempts(), cancel, |attempt| {
            self.download_attempt(attempt)
        })
        .await;

        match downloaded {
            Ok(temp) => self.install(temp, started),
            Err(RetryError::Cancelled) => Outcome::Failed(CacheError::Cancelled),
            Err(RetryError::Exhausted { attempts, last }) => {
                let error = CacheError::Exhausted {
                    attempts,
                    source: last,
                };
                self.fall_back(error)
            }
        }
    }

    async fn download_attempt(&self, attempt: u32) -> std::result::Result<TempPath, BoxError> {
        let temp = NamedTempFile::new_in(self.root.dir())?.into_temp_path();
        debug!(name = %self.descriptor.name, attempt, temp = %temp.display(), "Downloading file");
        self.downloader
            .download(&self.descriptor, &temp, &self.progress)
            .await?;
        Ok(temp)
    }

    /// Move a completed download into place and check its content
    fn install(&self, temp: TempPath, started: SystemTime) -> Outcome<F::Artifact> {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return Outcome::Failed(e.into());
            }
        }
        if let Err(e) = temp.persist(&self.path) {
            return Outcome::Failed(e.error.into());
        }

        match open_or_discard(self.format.as_ref(), self.root.dir(), &self.path) {
            Ok(artifact) => {
                info!(
                    file = %self.root.display_path(&self.path),
                    elapsed_ms = started.elapsed().map(|d| d.as_millis() as u64).unwrap_or_default(),
                    "Installed downloaded file"
                );
                self.progress.report(Some(1.0), "Done");
                Outcome::Fetched(artifact)
            }
            Err(e) => {
                warn!(file = %self.root.display_path(&self.path), error = %e, "Downloaded file rejected");
                Outcome::Failed(e)
            }
        }
    }

    /// Serve the previously cached file, if it still opens.
    ///
    /// A cached "not found" page is deleted here too; the download error is
    /// reported either way.
    fn fall_back(&self, error: CacheError) -> Outcome<F::Artifact> {
        if self.path.is_file() {
            match open_or_discard(self.format.as_ref(), self.root.dir(), &self.path) {
                Ok(artifact) => {
                    warn!(
                        file = %self.root.display_path(&self.path),
                        error = %error,
                        "Download failed, serving stale cached file"
                    );
                    self.progress.report(Some(1.0), "Loaded stale copy from cache");
                    return Outcome::Stale {
                        value: artifact,
                        error,
                    };
                }
                Err(e) => {
                    debug!(file = %self.root.display_path(&self.path), error = %e, "Cached file not usable as fallback");
                }
            }
        }
        warn!(name = %self.descriptor.name, error = %error, "Download failed");
        Outcome::Failed(error)
    }
}
