//! CDAS web service client
//!
//! Requests JSON metadata and streams data files for the fetch-through cache:
//! `CdasClient::json_producer` builds metadata producers and the client
//! itself implements `fetch_cache::Downloader`.

mod client;
mod error;
mod types;

pub use client::{CdasClient, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
pub use error::{CdasError, Result};
pub use types::DataResult;
