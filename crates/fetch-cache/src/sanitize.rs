//! Mapping of cache keys and remote file names to local paths

use std::path::PathBuf;

use url::Url;

use crate::error::{CacheError, Result};

const ILLEGAL_FILENAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Replace characters that are not allowed in file names with `_`
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if ILLEGAL_FILENAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Relative cache path for a remote file: `<folder>/<file>`, taken from the
/// last two segments of the remote name.
///
/// Files of the same remote folder share a local folder, files of different
/// folders never collide.
pub fn artifact_relative_path(remote_name: &str) -> Result<PathBuf> {
    let path = match Url::parse(remote_name) {
        Ok(url) if url.has_host() => url.path().to_string(),
        _ => remote_name.to_string(),
    };

    let segments: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|s| !s.is_empty())
        .collect();

    let [.., folder, file] = segments.as_slice() else {
        return Err(CacheError::InvalidDescriptor(format!(
            "remote name has no folder component: {}",
            remote_name
        )));
    };

    for segment in [folder, file] {
        if *segment == "." || *segment == ".." {
            return Err(CacheError::InvalidDescriptor(format!(
                "remote name contains a relative segment: {}",
                remote_name
            )));
        }
    }

    Ok(PathBuf::from(sanitize_key(folder)).join(sanitize_key(file)))
}
