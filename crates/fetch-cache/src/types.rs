//! Cache types

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Description of a remote data file as reported by the data service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileDescriptor {
    /// Remote URL of the file
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Size in bytes, 0 when unknown
    #[serde(default)]
    pub length: u64,
    pub last_modified: DateTime<Utc>,
}

impl FileDescriptor {
    pub fn new(name: impl Into<String>, length: u64, last_modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            mime_type: String::new(),
            start_time: None,
            end_time: None,
            length,
            last_modified,
        }
    }
}

/// Result of a cache lookup, delivered exactly once per `get`
#[derive(Debug)]
pub enum Outcome<T> {
    /// Served from the local cache without network access
    Hit(T),
    /// Fetched from the network and stored
    Fetched(T),
    /// The fetch failed and a previously cached value was served instead
    Stale { value: T, error: CacheError },
    Failed(CacheError),
}

impl<T> Outcome<T> {
    /// `Some(true)` when the value came from the cache (including stale
    /// fallbacks), `Some(false)` when freshly fetched, `None` on failure
    pub fn from_cache(&self) -> Option<bool> {
        match self {
            Outcome::Hit(_) | Outcome::Stale { .. } => Some(true),
            Outcome::Fetched(_) => Some(false),
            Outcome::Failed(_) => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Stale { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Hit(v) | Outcome::Fetched(v) | Outcome::Stale { value: v, .. } => Some(v),
            Outcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&CacheError> {
        match self {
            Outcome::Stale { error, .. } | Outcome::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Collapse into `(from_cache, value)` or the error
    pub fn into_result(self) -> Result<(bool, T), CacheError> {
        match self {
            Outcome::Hit(v) => Ok((true, v)),
            Outcome::Fetched(v) => Ok((false, v)),
            Outcome::Stale { value, .. } => Ok((true, value)),
            Outcome::Failed(e) => Err(e),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Hit(v) => Outcome::Hit(f(v)),
            Outcome::Fetched(v) => Outcome::Fetched(f(v)),
            Outcome::Stale { value, error } => Outcome::Stale {
                value: f(value),
                error,
            },
            Outcome::Failed(e) => Outcome::Failed(e),
        }
    }
}

/// A progress report for one download
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Completed fraction in `0.0..=1.0`, `None` when the total is unknown
    pub fraction: Option<f64>,
    pub status: String,
    /// Identifies the download among several concurrent ones
    pub tag: String,
}

pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Progress sink handed to a downloader, bound to one tag
#[derive(Clone)]
pub struct Progress {
    callback: Option<ProgressCallback>,
    tag: String,
}

impl Progress {
    pub fn new(callback: Option<ProgressCallback>, tag: impl Into<String>) -> Self {
        Self {
            callback,
            tag: tag.into(),
        }
    }

    /// A sink that drops every report
    pub fn none() -> Self {
        Self::new(None, "")
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn report(&self, fraction: Option<f64>, status: &str) {
        if let Some(callback) = &self.callback {
            let fraction = fraction.filter(|f| f.is_finite()).map(|f| f.clamp(0.0, 1.0));
            callback(ProgressUpdate {
                fraction,
                status: status.to_string(),
                tag: self.tag.clone(),
            });
        }
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("tag", &self.tag)
            .field("enabled", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_file_descriptor_deserialization() {
        let json = r#"{
            "Name": "https://cdaweb.gsfc.nasa.gov/tmp/wsX/ac_h0_mfi_20230101.cdf",
            "MimeType": "application/x-cdf",
            "StartTime": "2023-01-01T00:00:00.000Z",
            "EndTime": "2023-01-02T00:00:00.000Z",
            "Length": 123456,
            "LastModified": "2023-05-01T12:30:00.000Z"
        }"#;

        let descriptor: FileDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.length, 123456);
        assert_eq!(descriptor.mime_type, "application/x-cdf");
        assert_eq!(
            descriptor.last_modified.to_rfc3339(),
            "2023-05-01T12:30:00+00:00"
        );
        assert!(descriptor.start_time.is_some());
    }

    #[test]
    fn test_outcome_from_cache_flag() {
        assert_eq!(Outcome::Hit(1).from_cache(), Some(true));
        assert_eq!(Outcome::Fetched(1).from_cache(), Some(false));
        let stale = Outcome::Stale {
            value: 1,
            error: CacheError::Cancelled,
        };
        assert_eq!(stale.from_cache(), Some(true));
        assert!(stale.is_degraded());
        assert!(stale.error().is_some());
        assert_eq!(Outcome::<i32>::Failed(CacheError::Cancelled).from_cache(), None);
    }

    #[test]
    fn test_outcome_into_result_and_map() {
        let (from_cache, value) = Outcome::Fetched(2).map(|v| v * 10).into_result().unwrap();
        assert!(!from_cache);
        assert_eq!(value, 20);

        let err = Outcome::<i32>::Failed(CacheError::Parse("bad".into())).into_result();
        assert!(err.is_err());
    }

    #[test]
    fn test_progress_clamps_and_tags() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress = Progress::new(
            Some(Arc::new(move |u: ProgressUpdate| sink.lock().unwrap().push(u))),
            "ac_h0_mfi",
        );

        progress.report(Some(1.5), "Downloading");
        progress.report(Some(f64::NAN), "Downloading");
        progress.report(None, "Waiting");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].fraction, Some(1.0));
        assert_eq!(seen[1].fraction, None);
        assert_eq!(seen[2].tag, "ac_h0_mfi");
    }

    #[test]
    fn test_progress_none_is_silent() {
        let progress = Progress::none();
        progress.report(Some(0.5), "ignored");
        assert_eq!(progress.tag(), "");
    }
}
