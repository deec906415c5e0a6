//! Content validation of downloaded files
//!
//! A download can succeed at the transport level and still leave an HTML
//! error page on disk. Files are opened with the expected format first; when
//! that fails on the format itself the raw bytes are sniffed for a
//! "404 Not Found" page.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::CacheError;

const SNIFF_LIMIT: u64 = 64 * 1024;
const HTML_PREFIXES: &[&str] = &["<!doctype html", "<html"];
const NOT_FOUND_MARKER: &str = "<title>404 Not Found</title>";

/// Failure to open a file with an artifact format
#[derive(Debug)]
pub enum FormatError {
    /// The bytes are not in this format
    WrongFormat(String),
    Io(io::Error),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::WrongFormat(msg) => write!(f, "{}", msg),
            FormatError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl From<io::Error> for FormatError {
    fn from(err: io::Error) -> Self {
        FormatError::Io(err)
    }
}

/// A binary file format the file cache can open
pub trait ArtifactFormat: Send + Sync + 'static {
    type Artifact: Send + 'static;

    fn open(&self, path: &Path) -> Result<Self::Artifact, FormatError>;
}

#[derive(Debug)]
pub enum Validation<A> {
    Valid(A),
    /// The file is a "not found" error page saved in place of the data
    NotFound,
    Invalid(CacheError),
}

/// Open `path` with `format`, classifying failures
pub fn validate<F: ArtifactFormat>(format: &F, path: &Path) -> Validation<F::Artifact> {
    match format.open(path) {
        Ok(artifact) => Validation::Valid(artifact),
        Err(FormatError::WrongFormat(msg)) => match is_not_found_page(path) {
            Ok(true) => Validation::NotFound,
            Ok(false) => Validation::Invalid(CacheError::Parse(format!(
                "{}: {}",
                path.display(),
                msg
            ))),
            Err(e) => Validation::Invalid(e.into()),
        },
        Err(FormatError::Io(e)) => Validation::Invalid(e.into()),
    }
}

/// Open `path`, deleting it when it turns out to be a "not found" page.
///
/// The parent folder is removed as well when that leaves it empty, unless it
/// is `root` itself.
pub fn open_or_discard<F: ArtifactFormat>(
    format: &F,
    root: &Path,
    path: &Path,
) -> Result<F::Artifact, CacheError> {
    match validate(format, path) {
        Validation::Valid(artifact) => Ok(artifact),
        Validation::NotFound => {
            warn!(path = %path.display(), "Discarding error page saved as data file");
            discard(root, path);
            let file = path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .into_owned();
            Err(CacheError::NotFound { file })
        }
        Validation::Invalid(e) => Err(e),
    }
}

fn discard(root: &Path, path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "Failed to remove invalid file");
        return;
    }
    if let Some(parent) = path.parent() {
        if parent != root && std::fs::remove_dir(parent).is_ok() {
            debug!(folder = %parent.display(), "Removed empty cache folder");
        }
    }
}

/// Whether the bytes look like an HTML "404 Not Found" page
pub fn looks_like_not_found_page(bytes: &[u8]) -> bool {
    let text = String::from_utf8_lossy(bytes);
    let head = text.trim_start();
    let is_html = HTML_PREFIXES.iter().any(|prefix| {
        head.get(..prefix.len())
            .is_some_and(|start| start.eq_ignore_ascii_case(prefix))
    });
    is_html && text.contains(NOT_FOUND_MARKER)
}

fn is_not_found_page(path: &Path) -> io::Result<bool> {
    let mut bytes = Vec::new();
    File::open(path)?.take(SNIFF_LIMIT).read_to_end(&mut bytes)?;
    Ok(looks_like_not_found_page(&bytes))
}

/// Version family of a CDF file, from its magic number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdfVersion {
    V3,
    V2_6,
    V2_5,
}

/// Handle to a validated CDF file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdfFile {
    pub path: PathBuf,
    pub version: CdfVersion,
    pub compressed: bool,
    pub size: u64,
}

/// Common Data Format files, recognised by their 8-byte header
#[derive(Debug, Clone, Copy, Default)]
pub struct CdfFormat;

impl CdfFormat {
    pub fn parse_header(header: &[u8; 8]) -> Option<(CdfVersion, bool)> {
        let magic = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let compression = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

        let version = match magic {
            0xCDF3_0001 => CdfVersion::V3,
            0xCDF2_6002 => CdfVersion::V2_6,
            0x0000_FFFF => CdfVersion::V2_5,
            _ => return None,
        };
        let compressed = match compression {
            0x0000_FFFF => false,
            0xCCCC_0001 => true,
            _ => return None,
        };
        Some((version, compressed))
    }
}

impl ArtifactFormat for CdfFormat {
    type Artifact = CdfFile;

    fn open(&self, path: &Path) -> Result<CdfFile, FormatError> {
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();

        let mut header = [0u8; 8];
        if let Err(e) = file.read_exact(&mut header) {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                return Err(FormatError::WrongFormat(format!(
                    "is not a CDF file ({} bytes)",
                    size
                )));
            }
            return Err(e.into());
        }

        let (version, compressed) = Self::parse_header(&header).ok_or_else(|| {
            FormatError::WrongFormat("is not a CDF file (bad magic number)".to_string())
        })?;

        Ok(CdfFile {
            path: path.to_path_buf(),
            version,
            compressed,
            size,
        })
    }
}
