//! Update executor - Orchestrates check and apply cycles.
//!
//! A check builds the local manifest from disk, fetches and parses the remote
//! one, and diffs them. An apply hands the resulting change set to the
//! [`ApplyEngine`]. Nothing is cached between cycles: every check starts
//! from the current filesystem and the current remote state.

use crate::config::Config;
use crate::events::{EventBus, SyncEvent};
use crate::fs::walker::ScanOptions;
use crate::manifest::Manifest;
use crate::remote::Retriever;
use crate::sync::apply::{ApplyEngine, ApplyOptions, ApplyReport};
use crate::sync::diff::{diff, ChangeSet};
use crate::utils::errors::{Result, UpdaterError};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Local side of the updater: where the installation lives and how it is
/// scanned and written
#[derive(Debug, Clone)]
pub struct UpdaterSettings {
    pub root: PathBuf,
    pub version_file: String,
    pub scan: ScanOptions,
    pub apply: ApplyOptions,
}

impl UpdaterSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.install.root.clone(),
            version_file: config.install.version_file.clone(),
            scan: config.scan_options(),
            apply: ApplyOptions {
                backup_suffix: config.install.backup_suffix.clone(),
                version_file: config.install.version_file.clone(),
                require_clean_for_version: config.apply.require_clean_for_version,
            },
        }
    }
}

/// Overall outcome of a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    UpToDate,
    UpdateAvailable,
    /// Version strings differ while every file matches
    VersionAnomaly,
}

/// Result of a check cycle
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub local: Manifest,
    pub remote: Manifest,
    pub changes: ChangeSet,
}

impl CheckReport {
    pub fn status(&self) -> CheckStatus {
        if !self.changes.is_empty() {
            CheckStatus::UpdateAvailable
        } else if self.local.version != self.remote.version {
            CheckStatus::VersionAnomaly
        } else {
            CheckStatus::UpToDate
        }
    }
}

/// Result of [`Updater::run_update`]
#[derive(Debug)]
pub struct UpdateOutcome {
    pub check: CheckReport,
    /// `None` when nothing needed applying
    pub apply: Option<ApplyReport>,
}

/// Drives check and apply cycles for one installation root
pub struct Updater {
    settings: UpdaterSettings,
    retriever: Arc<dyn Retriever>,
    events: EventBus,
    cancel: CancellationToken,
}

impl Updater {
    pub fn new(settings: UpdaterSettings, retriever: Arc<dyn Retriever>) -> Self {
        Self {
            settings,
            retriever,
            events: EventBus::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Create an updater whose downloads stop when `cancel` fires
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn root(&self) -> &Path {
        &self.settings.root
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Verify the remote is reachable with the configured credentials
    pub async fn probe(&self) -> Result<()> {
        info!("Probing {}", self.retriever.describe());
        self.retriever.probe().await
    }

    /// Scan the installation root. Hashing runs on the blocking pool.
    pub async fn local_manifest(&self) -> Result<Manifest> {
        let root = self.settings.root.clone();
        let version_file = self.settings.version_file.clone();
        let scan = self.settings.scan.clone();

        tokio::task::spawn_blocking(move || Manifest::current_local(&root, &version_file, &scan))
            .await
            .map_err(|e| UpdaterError::Io(io::Error::other(e)))
    }

    /// Fetch and parse the remote manifest
    pub async fn remote_manifest(&self) -> Result<Manifest> {
        let document = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(UpdaterError::Cancelled),
            result = self.retriever.get_manifest() => result?,
        };
        Manifest::parse_remote(&document)
    }

    /// Run a check cycle.
    ///
    /// Failing to obtain either manifest fails the whole cycle; no partial
    /// manifest is ever diffed.
    pub async fn check(&self) -> Result<CheckReport> {
        info!(
            "Checking {} against {}",
            self.settings.root.display(),
            self.retriever.describe()
        );
        self.events.emit(SyncEvent::CheckStarted {
            root: self.settings.root.display().to_string(),
            remote: self.retriever.describe(),
        });

        let remote = self.remote_manifest().await?;
        let local = self.local_manifest().await?;
        let changes = diff(&local, &remote);
        let summary = changes.summary();

        info!(
            "Local {} ({} files) vs remote {} ({} files): {} added, {} modified, {} deleted",
            local.version,
            local.files.len(),
            remote.version,
            remote.files.len(),
            summary.added,
            summary.modified,
            summary.deleted
        );
        self.events.emit(SyncEvent::CheckCompleted {
            local_version: local.version.clone(),
            remote_version: remote.version.clone(),
            local_files: local.files.len(),
            remote_files: remote.files.len(),
            summary,
        });

        let report = CheckReport {
            local,
            remote,
            changes,
        };

        if report.status() == CheckStatus::VersionAnomaly {
            warn!(
                "Version mismatch ({} local, {} remote) but all files match",
                report.local.version, report.remote.version
            );
            self.events.emit(SyncEvent::VersionAnomaly {
                local_version: report.local.version.clone(),
                remote_version: report.remote.version.clone(),
            });
        }

        Ok(report)
    }

    /// Apply the change set of a previous check
    pub async fn apply(&self, report: &CheckReport) -> ApplyReport {
        let engine = ApplyEngine::new(self.settings.root.clone(), self.settings.apply.clone())
            .with_events(self.events.clone())
            .with_cancel(self.cancel.clone());

        engine
            .apply(&report.changes, &report.remote.version, self.retriever.as_ref())
            .await
    }

    /// Check, then apply when anything differs.
    ///
    /// A version anomaly is applied too: the change set is empty, so the
    /// only effect is bringing the version marker in line with the remote.
    pub async fn run_update(&self) -> Result<UpdateOutcome> {
        let check = self.check().await?;

        let apply = match check.status() {
            CheckStatus::UpToDate => {
                info!("Already up to date (version {})", check.local.version);
                None
            }
            CheckStatus::UpdateAvailable | CheckStatus::VersionAnomaly => Some(self.apply(&check).await),
        };

        Ok(UpdateOutcome { check, apply })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::checksum::checksum_bytes;
    use crate::manifest::version::read_version_marker;
    use crate::transfer::progress_stream::ProgressCallback;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::fs;
    use tempfile::TempDir;

    struct OneFileRemote {
        version: &'static str,
        content: &'static [u8],
    }

    #[async_trait]
    impl Retriever for OneFileRemote {
        fn describe(&self) -> String {
            "one-file".to_string()
        }

        async fn get_manifest(&self) -> Result<Bytes> {
            let document = format!(
                r#"{{"Version":"{}","Files":[{{"RelativePath":"app.txt","Size":{},"Checksum":"{}"}}]}}"#,
                self.version,
                self.content.len(),
                checksum_bytes(self.content)
            );
            Ok(Bytes::from(document))
        }

        async fn get_file(&self, _relative_path: &str, _progress: ProgressCallback) -> Result<Bytes> {
            Ok(Bytes::from_static(self.content))
        }
    }

    struct BrokenRemote;

    #[async_trait]
    impl Retriever for BrokenRemote {
        fn describe(&self) -> String {
            "broken".to_string()
        }

        async fn get_manifest(&self) -> Result<Bytes> {
            Ok(Bytes::from_static(b"<html>rate limited</html>"))
        }

        async fn get_file(&self, relative_path: &str, _progress: ProgressCallback) -> Result<Bytes> {
            Err(UpdaterError::retrieval(relative_path, "unreachable"))
        }
    }

    fn settings(root: &Path) -> UpdaterSettings {
        let mut config = Config::default();
        config.install.root = root.to_path_buf();
        UpdaterSettings::from_config(&config)
    }

    #[tokio::test]
    async fn test_check_reports_update_then_up_to_date() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let remote = Arc::new(OneFileRemote {
            version: "2.0.0",
            content: b"release two",
        });
        let updater = Updater::new(settings(temp_dir.path()), remote);

        let outcome = updater.run_update().await?;
        assert_eq!(outcome.check.status(), CheckStatus::UpdateAvailable);
        let applied = outcome.apply.expect("apply should run");
        assert!(applied.is_clean());
        assert_eq!(fs::read(temp_dir.path().join("app.txt"))?, b"release two");

        let again = updater.check().await?;
        assert_eq!(again.status(), CheckStatus::UpToDate);
        assert_eq!(again.local.version, "2.0.0");
        Ok(())
    }

    #[tokio::test]
    async fn test_version_anomaly_syncs_marker() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("app.txt"), b"same")?;
        fs::write(temp_dir.path().join("version.txt"), "1.9.0")?;
        let remote = Arc::new(OneFileRemote {
            version: "2.0.0",
            content: b"same",
        });
        let updater = Updater::new(settings(temp_dir.path()), remote);

        let check = updater.check().await?;
        assert_eq!(check.status(), CheckStatus::VersionAnomaly);
        assert!(check.changes.is_empty());

        let outcome = updater.run_update().await?;
        let applied = outcome.apply.expect("marker sync should run");
        assert!(applied.outcomes.is_empty());
        assert_eq!(read_version_marker(temp_dir.path(), "version.txt"), "2.0.0");
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_manifest_fails_check() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let updater = Updater::new(settings(temp_dir.path()), Arc::new(BrokenRemote));

        match updater.check().await {
            Err(UpdaterError::MalformedManifest(_)) => Ok(()),
            other => panic!("expected MalformedManifest, got {:?}", other.map(|r| r.status())),
        }
    }

    #[tokio::test]
    async fn test_cancelled_check_fails() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let remote = Arc::new(OneFileRemote {
            version: "2.0.0",
            content: b"x",
        });
        let updater = Updater::new(settings(temp_dir.path()), remote).with_cancel(cancel);

        assert!(matches!(updater.check().await, Err(UpdaterError::Cancelled)));
        Ok(())
    }
}
