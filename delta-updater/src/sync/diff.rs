//! Manifest comparison.
//!
//! Produces the set of files that must be added, replaced or removed to turn
//! the local installation into the remote one. Checksum equality is the only
//! criterion; size and timestamps are never compared.

use crate::fs::checksum;
use crate::manifest::{FileRecord, Manifest};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Kind of change required for one path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChangeType::Added => "added",
            ChangeType::Modified => "modified",
            ChangeType::Deleted => "deleted",
        };
        f.pad(label)
    }
}

/// One unit of required work.
///
/// The variant carries exactly the records that exist for it, so the change
/// type can never disagree with the local/remote presence it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change_type", rename_all = "lowercase")]
pub enum ChangeEntry {
    Added { remote: FileRecord },
    Modified { local: FileRecord, remote: FileRecord },
    Deleted { local: FileRecord },
}

impl ChangeEntry {
    pub fn relative_path(&self) -> &str {
        match self {
            ChangeEntry::Added { remote } => &remote.relative_path,
            ChangeEntry::Modified { remote, .. } => &remote.relative_path,
            ChangeEntry::Deleted { local } => &local.relative_path,
        }
    }

    pub fn change_type(&self) -> ChangeType {
        match self {
            ChangeEntry::Added { .. } => ChangeType::Added,
            ChangeEntry::Modified { .. } => ChangeType::Modified,
            ChangeEntry::Deleted { .. } => ChangeType::Deleted,
        }
    }

    pub fn local_file(&self) -> Option<&FileRecord> {
        match self {
            ChangeEntry::Added { .. } => None,
            ChangeEntry::Modified { local, .. } | ChangeEntry::Deleted { local } => Some(local),
        }
    }

    pub fn remote_file(&self) -> Option<&FileRecord> {
        match self {
            ChangeEntry::Added { remote } | ChangeEntry::Modified { remote, .. } => Some(remote),
            ChangeEntry::Deleted { .. } => None,
        }
    }
}

/// Counts for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    /// Bytes to download for added and modified files (per remote manifest)
    pub download_bytes: u64,
}

impl ChangeSummary {
    pub fn total(&self) -> usize {
        self.added + self.modified + self.deleted
    }
}

/// Classified changes between two manifests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub entries: Vec<ChangeEntry>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn summary(&self) -> ChangeSummary {
        self.entries
            .iter()
            .fold(ChangeSummary::default(), |mut summary, entry| {
                match entry {
                    ChangeEntry::Added { remote } => {
                        summary.added += 1;
                        summary.download_bytes += remote.size;
                    }
                    ChangeEntry::Modified { remote, .. } => {
                        summary.modified += 1;
                        summary.download_bytes += remote.size;
                    }
                    ChangeEntry::Deleted { .. } => summary.deleted += 1,
                }
                summary
            })
    }

    /// Entries ordered by path, then change type, for stable display.
    pub fn sorted(&self) -> Vec<&ChangeEntry> {
        let mut entries: Vec<&ChangeEntry> = self.entries.iter().collect();
        entries.sort_by(|a, b| {
            a.relative_path()
                .cmp(b.relative_path())
                .then_with(|| a.change_type().cmp(&b.change_type()))
        });
        entries
    }
}

/// Compare `local` against `remote`.
///
/// Pass one walks the remote files (added / modified), pass two walks the
/// local files (deleted). Entries appear in that order.
pub fn diff(local: &Manifest, remote: &Manifest) -> ChangeSet {
    let local_index: HashMap<&str, &FileRecord> = local
        .files
        .iter()
        .map(|f| (f.relative_path.as_str(), f))
        .collect();
    let remote_index: HashMap<&str, &FileRecord> = remote
        .files
        .iter()
        .map(|f| (f.relative_path.as_str(), f))
        .collect();

    let mut entries = Vec::new();

    for remote_file in &remote.files {
        match local_index.get(remote_file.relative_path.as_str()) {
            None => entries.push(ChangeEntry::Added {
                remote: remote_file.clone(),
            }),
            Some(local_file) if !checksum::matches(&local_file.checksum, &remote_file.checksum) => {
                entries.push(ChangeEntry::Modified {
                    local: (*local_file).clone(),
                    remote: remote_file.clone(),
                })
            }
            Some(_) => {}
        }
    }

    for local_file in &local.files {
        if !remote_index.contains_key(local_file.relative_path.as_str()) {
            entries.push(ChangeEntry::Deleted {
                local: local_file.clone(),
            });
        }
    }

    ChangeSet { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn record(path: &str, checksum: &str, size: u64) -> FileRecord {
        FileRecord {
            relative_path: path.to_string(),
            size,
            checksum: checksum.to_string(),
            last_modified: None,
        }
    }

    fn manifest(version: &str, files: &[(&str, &str)]) -> Manifest {
        Manifest {
            version: version.to_string(),
            generated_at: None,
            files: files.iter().map(|(p, h)| record(p, h, 1)).collect(),
        }
    }

    fn as_set(changes: &ChangeSet) -> BTreeSet<(String, ChangeType)> {
        changes
            .entries
            .iter()
            .map(|e| (e.relative_path().to_string(), e.change_type()))
            .collect()
    }

    #[test]
    fn test_added_and_modified() {
        let local = manifest("1.0.0", &[("a.txt", "h1"), ("b.txt", "h2")]);
        let remote = manifest("1.1.0", &[("a.txt", "h1"), ("b.txt", "h3"), ("c.txt", "h4")]);

        let changes = diff(&local, &remote);
        assert_eq!(changes.len(), 2);
        assert_eq!(
            as_set(&changes),
            BTreeSet::from([
                ("b.txt".to_string(), ChangeType::Modified),
                ("c.txt".to_string(), ChangeType::Added),
            ])
        );

        let modified = changes
            .entries
            .iter()
            .find(|e| e.change_type() == ChangeType::Modified)
            .unwrap();
        assert_eq!(modified.local_file().unwrap().checksum, "h2");
        assert_eq!(modified.remote_file().unwrap().checksum, "h3");

        let added = changes
            .entries
            .iter()
            .find(|e| e.change_type() == ChangeType::Added)
            .unwrap();
        assert!(added.local_file().is_none());
        assert_eq!(added.remote_file().unwrap().checksum, "h4");
    }

    #[test]
    fn test_deleted_only() {
        let local = manifest("1.0.0", &[("old.txt", "h1")]);
        let remote = manifest("1.0.0", &[]);

        let changes = diff(&local, &remote);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.entries[0].change_type(), ChangeType::Deleted);
        assert_eq!(changes.entries[0].relative_path(), "old.txt");
        assert!(changes.entries[0].remote_file().is_none());
    }

    #[test]
    fn test_equal_checksums_produce_nothing_even_across_versions() {
        let local = manifest("1.0.0", &[("a.txt", "h1")]);
        let remote = manifest("9.9.9", &[("a.txt", "h1")]);
        assert!(diff(&local, &remote).is_empty());
    }

    #[test]
    fn test_size_and_timestamp_are_ignored() {
        let mut local = manifest("1.0.0", &[("a.txt", "abcd")]);
        local.files[0].size = 10;
        let mut remote = manifest("1.0.0", &[("a.txt", "ABCD")]);
        remote.files[0].size = 99;
        assert!(diff(&local, &remote).is_empty());
    }

    #[test]
    fn test_idempotent() {
        let local = manifest("1", &[("a", "1"), ("b", "2"), ("d", "4")]);
        let remote = manifest("2", &[("a", "1"), ("b", "3"), ("c", "5")]);
        assert_eq!(as_set(&diff(&local, &remote)), as_set(&diff(&local, &remote)));
    }

    #[test]
    fn test_every_entry_is_a_real_difference() {
        let local = manifest("1", &[("a", "1"), ("b", "2"), ("d", "4"), ("e", "6")]);
        let remote = manifest("2", &[("a", "1"), ("b", "3"), ("c", "5"), ("e", "6")]);

        for entry in diff(&local, &remote).entries {
            let l = local.files.iter().find(|f| f.relative_path == entry.relative_path());
            let r = remote.files.iter().find(|f| f.relative_path == entry.relative_path());
            match (l, r) {
                (Some(l), Some(r)) => assert_ne!(l.checksum, r.checksum),
                (None, None) => panic!("path in neither manifest"),
                _ => {}
            }
        }
    }

    #[test]
    fn test_summary_and_sorted() {
        let local = manifest("1", &[("z", "1"), ("m", "2")]);
        let mut remote = manifest("2", &[("m", "3"), ("a", "4")]);
        remote.files[0].size = 100;
        remote.files[1].size = 50;

        let changes = diff(&local, &remote);
        let summary = changes.summary();
        assert_eq!(summary.added, 1);
        assert_eq!(summary.modified, 1);
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.download_bytes, 150);

        let order: Vec<&str> = changes.sorted().iter().map(|e| e.relative_path()).collect();
        assert_eq!(order, vec!["a", "m", "z"]);
    }
}
