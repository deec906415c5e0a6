//! Error types for the fetch-through cache

use std::fmt;

/// Boxed error returned by producers and downloaders
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug)]
pub enum CacheError {
    /// The cache root or configuration is unusable
    Config(String),
    Io(Box<std::io::Error>),
    Serialization(String),
    /// Every attempt of the retry budget failed; `source` is the last error
    Exhausted { attempts: u32, source: BoxError },
    /// The server answered with an HTML "not found" page instead of data
    NotFound { file: String },
    Parse(String),
    InvalidDescriptor(String),
    Cancelled,
}

impl CacheError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound { .. })
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            CacheError::Exhausted { attempts, source } => {
                write!(f, "Request failed after {} attempt(s): {}", attempts, source)
            }
            CacheError::NotFound { file } => {
                write!(f, "File \"{}\" was not found on the server", file)
            }
            CacheError::Parse(msg) => write!(f, "Parse error: {}", msg),
            CacheError::InvalidDescriptor(msg) => write!(f, "Invalid file descriptor: {}", msg),
            CacheError::Cancelled => write!(f, "Request cancelled"),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err.as_ref()),
            CacheError::Exhausted { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = CacheError::Config("cache path is a file".to_string());
        assert_eq!(
            format!("{}", err),
            "Configuration error: cache path is a file"
        );
    }

    #[test]
    fn test_not_found_error_display() {
        let err = CacheError::NotFound {
            file: "ac_h0_mfi/ac_h0_mfi_20230101.cdf".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "File \"ac_h0_mfi/ac_h0_mfi_20230101.cdf\" was not found on the server"
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_exhausted_error_keeps_source() {
        let source: BoxError = "connection reset".into();
        let err = CacheError::Exhausted {
            attempts: 3,
            source,
        };
        assert_eq!(
            format!("{}", err),
            "Request failed after 3 attempt(s): connection reset"
        );
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_io_error_conversion() {
        let err: CacheError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert!(format!("{}", err).contains("disk full"));
    }

    #[test]
    fn test_error_is_debug() {
        let err = CacheError::Cancelled;
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Cancelled"));
    }
}
