//! Error types for the CDAS client

use std::fmt;

#[derive(Debug)]
pub enum CdasError {
    Http(Box<reqwest::Error>),
    /// The service answered with a non-success status
    Status { status: u16, url: String },
    Io(Box<std::io::Error>),
    Decode(String),
}

impl fmt::Display for CdasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CdasError::Http(err) => write!(f, "HTTP error: {}", err),
            CdasError::Status { status, url } => {
                write!(f, "Service returned status {} for {}", status, url)
            }
            CdasError::Io(err) => write!(f, "IO error: {}", err),
            CdasError::Decode(msg) => write!(f, "Decode error: {}", msg),
        }
    }
}

impl std::error::Error for CdasError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CdasError::Http(err) => Some(err.as_ref()),
            CdasError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CdasError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return CdasError::Decode(err.to_string());
        }
        CdasError::Http(Box::new(err))
    }
}

impl From<std::io::Error> for CdasError {
    fn from(err: std::io::Error) -> Self {
        CdasError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for CdasError {
    fn from(err: serde_json::Error) -> Self {
        CdasError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CdasError>;
