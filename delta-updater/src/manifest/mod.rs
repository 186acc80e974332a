//! Manifest types for delta updates.
//!
//! A manifest is a versioned inventory of an installation: one record per
//! file with its size and SHA-256 checksum. The local manifest is rebuilt
//! from disk on every check; the remote one is parsed from the published
//! `manifest.json` document.

pub mod version;

use crate::fs::walker::{scan_installation, ScanOptions};
use crate::fs::{checksum, paths};
use crate::utils::errors::{Result, UpdaterError};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Default name of the remote manifest document
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// One tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Forward-slash path relative to the installation root
    pub relative_path: String,

    /// File size in bytes
    pub size: u64,

    /// Lowercase hex SHA-256 of the contents
    pub checksum: String,

    /// Informational only, never used for change detection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// Versioned inventory of an installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub version: String,
    pub generated_at: Option<DateTime<Utc>>,
    pub files: Vec<FileRecord>,
}

impl Manifest {
    /// Build the manifest of the current local installation.
    ///
    /// The version comes from the marker file in `root` (or the default);
    /// files come from a fresh scan. Blocking: hashes every file.
    pub fn current_local(root: &Path, version_file: &str, options: &ScanOptions) -> Self {
        let version = version::read_version_marker(root, version_file);
        Self::generate(root, &version, options)
    }

    /// Build a manifest for `root` stamped with an explicit version.
    ///
    /// Used for publishing: the output of [`Manifest::to_json_pretty`] is a
    /// valid remote document.
    pub fn generate(root: &Path, version: &str, options: &ScanOptions) -> Self {
        let files = scan_installation(root, options);
        let manifest = Manifest {
            version: version.to_string(),
            generated_at: Some(Utc::now()),
            files,
        };
        info!(
            "Scanned {}: {} files, {} bytes (version {})",
            root.display(),
            manifest.files.len(),
            manifest.total_bytes(),
            manifest.version
        );
        manifest
    }

    /// Parse a remote manifest document.
    ///
    /// Field names are matched ignoring ASCII case and underscores, unknown
    /// fields are ignored. `version` and `files` are required, as are
    /// `relative_path` and `checksum` on every record.
    pub fn parse_remote(document: &[u8]) -> Result<Self> {
        let document = document.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(document);
        let root: Value = serde_json::from_slice(document)
            .map_err(|e| UpdaterError::MalformedManifest(format!("not valid JSON: {}", e)))?;

        let object = root
            .as_object()
            .ok_or_else(|| malformed("document is not a JSON object"))?;

        let version = match field(object, "version") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(_) => return Err(malformed("'version' must be a non-empty string")),
            None => return Err(malformed("missing required field 'version'")),
        };

        let generated_at = field(object, "generated_at").and_then(parse_timestamp);

        let entries = match field(object, "files") {
            Some(Value::Array(entries)) => entries,
            Some(_) => return Err(malformed("'files' must be an array")),
            None => return Err(malformed("missing required field 'files'")),
        };

        let mut files: Vec<FileRecord> = Vec::with_capacity(entries.len());
        let mut positions: HashMap<String, usize> = HashMap::with_capacity(entries.len());

        for (index, entry) in entries.iter().enumerate() {
            let record = parse_record(index, entry)?;
            match positions.get(&record.relative_path) {
                Some(&existing) => {
                    warn!(
                        "Duplicate manifest entry for {}, keeping the last one",
                        record.relative_path
                    );
                    files[existing] = record;
                }
                None => {
                    positions.insert(record.relative_path.clone(), files.len());
                    files.push(record);
                }
            }
        }

        Ok(Manifest {
            version,
            generated_at,
            files,
        })
    }

    /// Serialize as a pretty-printed manifest document.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Sum of all file sizes
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

fn malformed(message: &str) -> UpdaterError {
    UpdaterError::MalformedManifest(message.to_string())
}

/// Fold a key for lenient matching: `relativePath`, `RelativePath` and
/// `relative_path` all fold to `relativepath`.
fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn field<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    let wanted = fold_key(name);
    object
        .iter()
        .find(|(key, _)| fold_key(key) == wanted)
        .map(|(_, value)| value)
        .filter(|value| !value.is_null())
}

fn parse_record(index: usize, entry: &Value) -> Result<FileRecord> {
    let object = entry
        .as_object()
        .ok_or_else(|| UpdaterError::MalformedManifest(format!("files[{}] is not an object", index)))?;

    let raw_path = field(object, "relative_path")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            UpdaterError::MalformedManifest(format!("files[{}] has no 'relative_path'", index))
        })?;

    let relative_path = paths::normalize_key(raw_path).map_err(|e| {
        UpdaterError::MalformedManifest(format!("files[{}] ({}): {}", index, raw_path, e))
    })?;

    let raw_checksum = field(object, "checksum")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            UpdaterError::MalformedManifest(format!("{}: missing 'checksum'", relative_path))
        })?;
    if !checksum::is_valid(raw_checksum) {
        return Err(UpdaterError::MalformedManifest(format!(
            "{}: checksum '{}' is not a SHA-256 hex digest",
            relative_path, raw_checksum
        )));
    }

    let size = match field(object, "size") {
        None => 0,
        Some(value) => value.as_u64().ok_or_else(|| {
            UpdaterError::MalformedManifest(format!(
                "{}: 'size' must be a non-negative integer",
                relative_path
            ))
        })?,
    };

    Ok(FileRecord {
        relative_path,
        size,
        checksum: checksum::normalize(raw_checksum),
        last_modified: field(object, "last_modified").and_then(parse_timestamp),
    })
}

/// RFC 3339, or an offset-less ISO timestamp interpreted as UTC.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
