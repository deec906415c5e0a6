use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fetch_cache::{producer, BoxError, Downloader, FileDescriptor, Producer, Progress};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::CdasError;
use crate::types::DataResult;

pub const DEFAULT_BASE_URL: &str = "https://cdaweb.gsfc.nasa.gov/WS/cdasr/1";
const DEFAULT_USER_AGENT: &str = "cdas-client-rs/0.1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP client for the CDAS web service
pub struct CdasClient {
    client: reqwest::Client,
    base_url: String,
}

impl CdasClient {
    /// Create a new client with default settings
    pub fn new() -> crate::Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a new client against a custom service URL
    pub fn with_base_url(base_url: &str) -> crate::Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a new client with a custom service URL and request timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a service path (or pass an absolute URL through unchanged)
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// GET a JSON document and decode it
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> crate::Result<T> {
        let url = self.url_for(path);
        debug!(url = %url, "Requesting JSON");

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CdasError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// List the data files the service reports for a request path
    pub async fn data_files(&self, path: &str) -> crate::Result<Vec<FileDescriptor>> {
        let result: DataResult = self.get_json(path).await?;
        Ok(result.file_description)
    }

    /// A cache producer performing `get_json` on every call
    pub fn json_producer<T>(self: &Arc<Self>, path: &str) -> Producer<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let client = self.clone();
        let path = path.to_string();
        producer(move || {
            let client = client.clone();
            let path = path.clone();
            async move {
                client
                    .get_json::<T>(&path)
                    .await
                    .map_err(|e| -> BoxError { Box::new(e) })
            }
        })
    }

    async fn stream_to_file(
        &self,
        descriptor: &FileDescriptor,
        dest: &Path,
        progress: &Progress,
    ) -> crate::Result<()> {
        let url = &descriptor.name;
        let mut response = self.client.get(url).send().await?;
        let status = response.status();

        // A not-found page is stored as-is; the cache's validator discards it
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(CdasError::Status {
                status: status.as_u16(),
                url: url.clone(),
            });
        }
        if status == StatusCode::NOT_FOUND {
            warn!(url = %url, "Server reported file as missing");
        }

        let total = response
            .content_length()
            .filter(|&n| n > 0)
            .or((descriptor.length > 0).then_some(descriptor.length));

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;
        progress.report(total.map(|_| 0.0), "Downloading");

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            progress.report(total.map(|t| written as f64 / t as f64), "Downloading");
        }
        file.flush().await?;

        debug!(url = %url, bytes = written, "Download complete");
        Ok(())
    }
}

#[async_trait]
impl Downloader for CdasClient {
    async fn download(
        &self,
        descriptor: &FileDescriptor,
        dest: &Path,
        progress: &Progress,
    ) -> Result<(), BoxError> {
        self.stream_to_file(descriptor, dest, progress)
            .await
            .map_err(|e| -> BoxError { Box::new(e) })
    }
}
