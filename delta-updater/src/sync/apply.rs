//! Change set application.
//!
//! Deletions run first, then downloads. Every download is verified against
//! the remote checksum before anything touches the disk, an existing file is
//! copied aside before it is replaced, and the new content lands through a
//! temporary sibling plus rename. Per-file failures are recorded and the
//! batch moves on; the version marker is written once the loop finishes.

use crate::events::{EventBus, SyncEvent};
use crate::fs::{checksum, paths};
use crate::manifest::version::write_version_marker;
use crate::manifest::FileRecord;
use crate::remote::Retriever;
use crate::sync::diff::{ChangeEntry, ChangeSet, ChangeType};
use crate::transfer::progress::{format_bytes, ProgressTracker};
use crate::transfer::progress_stream::ProgressCallback;
use crate::utils::errors::{Result, UpdaterError};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Suffix of the sibling file new content is staged in
const STAGING_SUFFIX: &str = ".tmp";

/// Settings for an apply pass
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub backup_suffix: String,
    pub version_file: String,
    /// Skip the version marker when any file failed
    pub require_clean_for_version: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            backup_suffix: ".backup".to_string(),
            version_file: crate::manifest::version::VERSION_FILE_NAME.to_string(),
            require_clean_for_version: false,
        }
    }
}

/// What happened to one file
#[derive(Debug)]
pub enum FileStatus {
    Deleted,
    /// Deletion target was already gone
    AlreadyAbsent,
    Written { bytes: u64, backed_up: bool },
    Failed(UpdaterError),
}

#[derive(Debug)]
pub struct FileOutcome {
    pub path: String,
    pub change_type: ChangeType,
    pub status: FileStatus,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self.status, FileStatus::Failed(_))
    }

    pub fn error(&self) -> Option<&UpdaterError> {
        match &self.status {
            FileStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Fate of the version marker at the end of a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionMarkerStatus {
    Written(String),
    Skipped(String),
    Failed(String),
}

/// Result of an apply pass
#[derive(Debug)]
pub struct ApplyReport {
    pub outcomes: Vec<FileOutcome>,
    pub cancelled: bool,
    pub version_marker: VersionMarkerStatus,
    pub duration: Duration,
}

impl ApplyReport {
    /// Number of entries that reached their target state
    pub fn applied(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.applied()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn version_written(&self) -> bool {
        matches!(self.version_marker, VersionMarkerStatus::Written(_))
    }

    /// True when every entry succeeded and the run was not cancelled
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.failed() == 0
    }
}

/// Applies change sets to one installation root
pub struct ApplyEngine {
    root: PathBuf,
    options: ApplyOptions,
    events: EventBus,
    cancel: CancellationToken,
}

impl ApplyEngine {
    pub fn new(root: impl Into<PathBuf>, options: ApplyOptions) -> Self {
        Self {
            root: root.into(),
            options,
            events: EventBus::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Apply `changes` and stamp `remote_version` into the version marker.
    ///
    /// Never fails as a whole: every problem is attached to the path it
    /// concerns in the returned report.
    pub async fn apply(
        &self,
        changes: &ChangeSet,
        remote_version: &str,
        retriever: &dyn Retriever,
    ) -> ApplyReport {
        let summary = changes.summary();
        let mut tracker = ProgressTracker::new(changes.len(), summary.download_bytes);
        let mut outcomes = Vec::with_capacity(changes.len());
        let mut cancelled = false;

        info!(
            "Applying {} changes into {} ({} added, {} modified, {} deleted, {} to download)",
            changes.len(),
            self.root.display(),
            summary.added,
            summary.modified,
            summary.deleted,
            format_bytes(summary.download_bytes)
        );
        self.events.emit(SyncEvent::ApplyStarted {
            total_files: changes.len(),
            total_bytes: summary.download_bytes,
        });

        let deletions = changes.entries.iter().filter_map(|e| match e {
            ChangeEntry::Deleted { local } => Some(local),
            _ => None,
        });

        for local in deletions {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            tracker.start_file(&local.relative_path);
            let outcome = self.delete_file(&local.relative_path).await;
            tracker.finish_file(0);
            self.record(outcome, &tracker, &mut outcomes);
        }

        let downloads = changes.entries.iter().filter_map(|e| match e {
            ChangeEntry::Added { remote } => Some((ChangeType::Added, remote)),
            ChangeEntry::Modified { remote, .. } => Some((ChangeType::Modified, remote)),
            ChangeEntry::Deleted { .. } => None,
        });

        if !cancelled {
            for (change_type, remote) in downloads {
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                tracker.start_file(&remote.relative_path);
                self.events.emit(SyncEvent::FileDownloading {
                    path: remote.relative_path.clone(),
                    size: remote.size,
                });

                let status = match self.install_file(remote, retriever).await {
                    Ok((bytes, backed_up)) => FileStatus::Written { bytes, backed_up },
                    Err(e) => FileStatus::Failed(e),
                };
                let downloaded = match &status {
                    FileStatus::Written { bytes, .. } => *bytes,
                    _ => 0,
                };
                let interrupted = matches!(status, FileStatus::Failed(UpdaterError::Cancelled));

                tracker.finish_file(downloaded);
                self.record(
                    FileOutcome {
                        path: remote.relative_path.clone(),
                        change_type,
                        status,
                    },
                    &tracker,
                    &mut outcomes,
                );

                if interrupted {
                    cancelled = true;
                    break;
                }
            }
        }

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        let version_marker = self.finish_version(remote_version, cancelled, failed).await;

        let report = ApplyReport {
            outcomes,
            cancelled,
            version_marker,
            duration: tracker.elapsed(),
        };

        info!(
            "Apply finished: {} applied, {} failed{} in {:.1}s",
            report.applied(),
            report.failed(),
            if report.cancelled { ", cancelled" } else { "" },
            report.duration.as_secs_f64()
        );
        self.events.emit(SyncEvent::ApplyCompleted {
            applied: report.applied(),
            failed: report.failed(),
            cancelled: report.cancelled,
            version_written: report.version_written(),
            duration_ms: report.duration.as_millis() as u64,
        });

        report
    }

    /// Remove one file. A missing file counts as success.
    async fn delete_file(&self, relative_path: &str) -> FileOutcome {
        let status = match paths::resolve(&self.root, relative_path) {
            Err(e) => FileStatus::Failed(e),
            Ok(path) => match tokio::fs::remove_file(&path).await {
                Ok(()) => FileStatus::Deleted,
                Err(e) if e.kind() == io::ErrorKind::NotFound => FileStatus::AlreadyAbsent,
                Err(e) => FileStatus::Failed(e.into()),
            },
        };

        FileOutcome {
            path: relative_path.to_string(),
            change_type: ChangeType::Deleted,
            status,
        }
    }

    /// Download, verify, back up and write one file.
    /// Returns bytes written and whether a backup was made.
    async fn install_file(&self, remote: &FileRecord, retriever: &dyn Retriever) -> Result<(u64, bool)> {
        let destination = paths::resolve(&self.root, &remote.relative_path)?;

        let data = tokio::select! {
            result = retriever.get_file(&remote.relative_path, self.byte_progress(&remote.relative_path)) => result?,
            _ = self.cancel.cancelled() => return Err(UpdaterError::Cancelled),
        };

        let actual = checksum::checksum_bytes(&data);
        if !checksum::matches(&actual, &remote.checksum) {
            return Err(UpdaterError::ChecksumMismatch {
                path: remote.relative_path.clone(),
                expected: checksum::normalize(&remote.checksum),
                actual,
            });
        }

        let backed_up = self.backup_existing(&destination).await;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        write_replace(&destination, &data).await?;

        Ok((data.len() as u64, backed_up))
    }

    /// Copy an existing destination to its backup sibling. Best effort.
    async fn backup_existing(&self, destination: &Path) -> bool {
        match tokio::fs::metadata(destination).await {
            Ok(metadata) if metadata.is_file() => {}
            _ => return false,
        }

        let backup = paths::with_suffix(destination, &self.options.backup_suffix);
        match tokio::fs::copy(destination, &backup).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Backup of {} failed, overwriting anyway: {}", destination.display(), e);
                false
            }
        }
    }

    fn byte_progress(&self, relative_path: &str) -> ProgressCallback {
        let events = self.events.clone();
        let path = relative_path.to_string();
        Arc::new(move |received| {
            events.emit(SyncEvent::FileBytes {
                path: path.clone(),
                received,
            });
        })
    }

    async fn finish_version(&self, remote_version: &str, cancelled: bool, failed: usize) -> VersionMarkerStatus {
        if cancelled {
            info!("Run cancelled, version marker left unchanged");
            return VersionMarkerStatus::Skipped("cancelled".to_string());
        }
        if self.options.require_clean_for_version && failed > 0 {
            warn!("{} file(s) failed, version marker left unchanged", failed);
            return VersionMarkerStatus::Skipped(format!("{} file(s) failed", failed));
        }

        match write_version_marker(&self.root, &self.options.version_file, remote_version).await {
            Ok(()) => VersionMarkerStatus::Written(remote_version.trim().to_string()),
            Err(e) => {
                warn!("Failed to write version marker: {}", e);
                VersionMarkerStatus::Failed(e.to_string())
            }
        }
    }

    fn record(&self, outcome: FileOutcome, tracker: &ProgressTracker, outcomes: &mut Vec<FileOutcome>) {
        let event = match &outcome.status {
            FileStatus::Deleted | FileStatus::AlreadyAbsent => {
                info!("Deleted: {}", outcome.path);
                SyncEvent::FileDeleted {
                    path: outcome.path.clone(),
                    existed: matches!(outcome.status, FileStatus::Deleted),
                }
            }
            FileStatus::Written { bytes, backed_up } => {
                info!("Saved: {} ({})", outcome.path, format_bytes(*bytes));
                SyncEvent::FileWritten {
                    path: outcome.path.clone(),
                    change_type: outcome.change_type,
                    bytes: *bytes,
                    backed_up: *backed_up,
                }
            }
            FileStatus::Failed(e) => {
                warn!("Failed to apply {} ({}): {}", outcome.path, outcome.change_type, e);
                SyncEvent::FileFailed {
                    path: outcome.path.clone(),
                    change_type: outcome.change_type,
                    error: e.to_string(),
                }
            }
        };

        self.events.emit(event);
        self.events.emit(SyncEvent::ApplyProgress(tracker.snapshot()));
        outcomes.push(outcome);
    }
}

/// Stage `data` next to `destination`, then rename it into place.
async fn write_replace(destination: &Path, data: &[u8]) -> io::Result<()> {
    let staging = paths::with_suffix(destination, STAGING_SUFFIX);
    tokio::fs::write(&staging, data).await?;

    if let Err(e) = tokio::fs::rename(&staging, destination).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(e);
    }
    Ok(())
}
