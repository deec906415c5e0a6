//! Error types for the cdas-fetch command line

use std::fmt;

#[derive(Debug)]
pub enum FetchError {
    Cache(fetch_cache::CacheError),
    Client(cdas_client::CdasError),
    Io(Box<std::io::Error>),
    Config(String),
    /// A descriptor file could not be read as file descriptions
    Descriptor { path: String, message: String },
    /// Some requested items could not be obtained
    Incomplete { failed: usize, total: usize },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Cache(err) => write!(f, "Cache error: {}", err),
            FetchError::Client(err) => write!(f, "Client error: {}", err),
            FetchError::Io(err) => write!(f, "IO error: {}", err),
            FetchError::Config(msg) => write!(f, "Configuration error: {}", msg),
            FetchError::Descriptor { path, message } => {
                write!(f, "Invalid descriptor file {}: {}", path, message)
            }
            FetchError::Incomplete { failed, total } => {
                write!(f, "{} of {} requests failed", failed, total)
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Cache(err) => Some(err),
            FetchError::Client(err) => Some(err),
            FetchError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<fetch_cache::CacheError> for FetchError {
    fn from(err: fetch_cache::CacheError) -> Self {
        FetchError::Cache(err)
    }
}

impl From<cdas_client::CdasError> for FetchError {
    fn from(err: cdas_client::CdasError) -> Self {
        FetchError::Client(err)
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Cache(err.into())
    }
}

impl From<tracing_subscriber::filter::ParseError> for FetchError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        FetchError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_error_display() {
        let err = FetchError::Incomplete {
            failed: 2,
            total: 5,
        };
        assert_eq!(format!("{}", err), "2 of 5 requests failed");
    }

    #[test]
    fn test_cache_error_wraps_source() {
        let err: FetchError = fetch_cache::CacheError::Cancelled.into();
        assert!(format!("{}", err).starts_with("Cache error:"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_config_error_display() {
        let err = FetchError::Config("CDAS_TIMEOUT_SECS must be positive".to_string());
        assert_eq!(
            format!("{}", err),
            "Configuration error: CDAS_TIMEOUT_SECS must be positive"
        );
    }
}
