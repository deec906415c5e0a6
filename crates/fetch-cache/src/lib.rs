//! Fetch-through cache with background population
//!
//! Serves JSON metadata responses and binary data files from a local cache
//! directory. A hit is answered synchronously on the calling thread; a miss
//! runs the caller's producers (or the file downloader) on a background task
//! with a fixed retry budget and reports the result through a callback.

mod artifact;
mod config;
mod error;
mod metadata;
mod producer;
mod progress;
mod retry;
mod root;
mod sanitize;
mod types;
mod validate;

pub use artifact::{Downloader, FileCache, FileRequest};
pub use config::{CacheConfig, DEFAULT_CACHE_DIR, DEFAULT_MAX_ATTEMPTS};
pub use error::{BoxError, CacheError, Result};
pub use metadata::{Backing, MetadataCache, MetadataRequest};
pub use producer::{blocking_producer, producer, Producer};
pub use progress::ProgressAggregator;
pub use retry::{with_retries, RetryError};
pub use root::{CacheRoot, Fetch, MemoryStore, PendingFetch};
pub use sanitize::{artifact_relative_path, sanitize_key};
pub use types::{FileDescriptor, Outcome, Progress, ProgressCallback, ProgressUpdate};
pub use validate::{
    looks_like_not_found_page, open_or_discard, validate, ArtifactFormat, CdfFile, CdfFormat,
    CdfVersion, FormatError, Validation,
};

pub use tokio_util::sync::CancellationToken;
