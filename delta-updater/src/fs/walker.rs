//! Installation scanner.
//!
//! Walks every regular file under an installation root and fingerprints it,
//! skipping the updater's own artifacts. Traversal and hashing failures are
//! logged per entry and never abort the scan.

use crate::fs::{checksum, paths};
use crate::manifest::FileRecord;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Reserved substrings that are never treated as application content.
///
/// Matched case-insensitively against the file's base name.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    "updater.exe",
    "updater.pdb",
    "delta-updater",
    "manifest.json",
    "version.txt",
    "temp.txt",
    ".log",
    ".tmp",
    ".backup",
];

/// Options for scanning an installation
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Follow symbolic links to directories
    pub follow_links: bool,

    /// Reserved substrings (lowercase) excluded from the inventory
    pub exclude_patterns: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            follow_links: false,
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl ScanOptions {
    /// Add extra reserved substrings on top of the current set.
    pub fn with_extra_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            let pattern = pattern.as_ref().trim().to_ascii_lowercase();
            if !pattern.is_empty() && !self.exclude_patterns.contains(&pattern) {
                self.exclude_patterns.push(pattern);
            }
        }
        self
    }

    /// True if a file with this base name is reserved.
    pub fn is_excluded(&self, file_name: &str) -> bool {
        let name = file_name.to_lowercase();
        self.exclude_patterns.iter().any(|p| name.contains(p.as_str()))
    }
}

/// Scan `root` and return one record per tracked file.
///
/// A missing root yields an empty inventory (application not installed).
/// Order is depth-first with files before subdirectories, names ascending
/// within each directory.
///
/// # Example
/// ```no_run
/// use delta_updater::fs::walker::{scan_installation, ScanOptions};
/// use std::path::Path;
///
/// let files = scan_installation(Path::new("/opt/app"), &ScanOptions::default());
/// println!("Found {} files", files.len());
/// ```
pub fn scan_installation(root: &Path, options: &ScanOptions) -> Vec<FileRecord> {
    let mut files = Vec::new();

    if !root.is_dir() {
        debug!("Installation root {} does not exist, empty inventory", root.display());
        return files;
    }

    let walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .sort_by(files_first);

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                // walkdir skips the failing subtree when we keep iterating
                let at = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                warn!("Skipping {} during scan: {}", at, e);
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy();
        if options.is_excluded(&file_name) {
            debug!("Excluded reserved file: {}", entry.path().display());
            continue;
        }

        match record_from_entry(&entry, root) {
            Ok(Some(record)) => files.push(record),
            Ok(None) => {}
            Err(e) => warn!("Failed to fingerprint {}: {}", entry.path().display(), e),
        }
    }

    files
}

/// Sort directory contents so files come before subdirectories.
fn files_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    a.file_type()
        .is_dir()
        .cmp(&b.file_type().is_dir())
        .then_with(|| a.file_name().cmp(b.file_name()))
}

/// Build a record for a non-directory entry.
/// Symlinks are resolved to their target; links to directories or broken
/// links yield `None`.
fn record_from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<FileRecord>> {
    let path = entry.path();
    let metadata = if entry.path_is_symlink() {
        match std::fs::metadata(path) {
            Ok(resolved) if resolved.is_file() => resolved,
            _ => return Ok(None),
        }
    } else {
        entry.metadata().map_err(std::io::Error::from)?
    };

    if !metadata.is_file() {
        return Ok(None);
    }

    let relative = path.strip_prefix(root).unwrap_or(path);
    let relative_path = paths::to_manifest_key(relative);
    if relative_path.is_empty() {
        return Ok(None);
    }
    // keys must parse back unchanged on the consuming side
    match paths::normalize_key(&relative_path) {
        Ok(key) if key == relative_path => {}
        _ => {
            warn!("Skipping {}: name cannot be a portable manifest key", path.display());
            return Ok(None);
        }
    }

    let checksum = checksum::checksum_file(path)?;
    let last_modified = metadata.modified().ok().map(DateTime::<Utc>::from);

    Ok(Some(FileRecord {
        relative_path,
        size: metadata.len(),
        checksum,
        last_modified,
    }))
}
