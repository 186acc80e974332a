//! Relative path handling.
//!
//! Manifest keys are forward-slash paths relative to the installation root.
//! Anything that could escape the root is rejected before it reaches the
//! filesystem.

use crate::utils::errors::{Result, UpdaterError};
use std::path::{Component, Path, PathBuf};

/// Convert a host path (relative to the root) into a manifest key.
pub fn to_manifest_key(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalize separators and validate a manifest key.
///
/// Returns the key with `\` replaced by `/` and otherwise byte-for-byte
/// unchanged, so keys produced by the scanner always survive a round trip.
/// Empty keys, absolute paths, drive prefixes (`C:`) and `.`/`..`/empty
/// segments are rejected. A `:` anywhere else is a legal file name
/// character.
pub fn normalize_key(key: &str) -> Result<String> {
    let normalized = key.replace('\\', "/");

    if normalized.is_empty() {
        return Err(UpdaterError::UnsafePath("empty path".to_string()));
    }
    if normalized.starts_with('/') || has_drive_prefix(&normalized) {
        return Err(UpdaterError::UnsafePath(normalized));
    }
    for segment in normalized.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(UpdaterError::UnsafePath(normalized));
        }
    }

    Ok(normalized)
}

/// `C:`, `c:foo` and the like: a drive letter that would re-root the path on Windows.
fn has_drive_prefix(key: &str) -> bool {
    let bytes = key.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Resolve a manifest key to a path under `root`.
pub fn resolve(root: &Path, key: &str) -> Result<PathBuf> {
    let key = normalize_key(key)?;
    let mut path = root.to_path_buf();
    for segment in key.split('/') {
        path.push(segment);
    }
    Ok(path)
}

/// Sibling path with `suffix` appended to the file name (`a/b.dll` → `a/b.dll.backup`).
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}
