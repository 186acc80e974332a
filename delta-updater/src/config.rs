//! Configuration management for the delta updater.
//!
//! Loads configuration from a TOML file with environment variable overrides.
//! Credentials and repository coordinates are plain values here; they are
//! handed to the retriever at construction and never read again.

use crate::fs::walker::ScanOptions;
use crate::manifest::version::VERSION_FILE_NAME;
use crate::manifest::MANIFEST_FILE_NAME;
use crate::utils::errors::{Result, UpdaterError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `remote.token`
pub const TOKEN_ENV: &str = "DELTA_UPDATER_TOKEN";

/// Environment variable overriding `install.root`
pub const ROOT_ENV: &str = "DELTA_UPDATER_ROOT";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub install: InstallConfig,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub apply: ApplyConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Installation root to keep in sync
    pub root: PathBuf,

    /// Version marker file name inside the root
    #[serde(default = "default_version_file")]
    pub version_file: String,

    /// Suffix for backups of overwritten files
    #[serde(default = "default_backup_suffix")]
    pub backup_suffix: String,

    /// Extra reserved name substrings, on top of the built-in list
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

/// How remote files are retrieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteMode {
    /// Anonymous raw-file download
    Public,
    /// Bearer-token contents API
    Authenticated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_mode")]
    pub mode: RemoteMode,

    /// Repository owner
    pub owner: String,

    /// Repository name
    pub repo: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Path of the manifest document inside the repository
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,

    /// Access token (authenticated mode only)
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_raw_base_url")]
    pub raw_base_url: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Whole-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyConfig {
    /// Only write the version marker when every file was applied
    #[serde(default)]
    pub require_clean_for_version: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_version_file() -> String {
    VERSION_FILE_NAME.to_string()
}

fn default_backup_suffix() -> String {
    ".backup".to_string()
}

fn default_mode() -> RemoteMode {
    RemoteMode::Public
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_manifest_path() -> String {
    MANIFEST_FILE_NAME.to_string()
}

fn default_raw_base_url() -> String {
    "https://raw.githubusercontent.com".to_string()
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_connect_timeout_secs() -> u64 {
    15
}

fn default_user_agent() -> String {
    format!("delta-updater/{}", env!("CARGO_PKG_VERSION"))
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            install: InstallConfig {
                root: PathBuf::from("."),
                version_file: default_version_file(),
                backup_suffix: default_backup_suffix(),
                exclude_patterns: Vec::new(),
            },
            remote: RemoteConfig {
                mode: default_mode(),
                owner: String::new(),
                repo: String::new(),
                branch: default_branch(),
                manifest_path: default_manifest_path(),
                token: None,
                raw_base_url: default_raw_base_url(),
                api_base_url: default_api_base_url(),
            },
            network: NetworkConfig::default(),
            apply: ApplyConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| UpdaterError::Config(e.to_string()))
    }

    /// Apply `DELTA_UPDATER_TOKEN` / `DELTA_UPDATER_ROOT` when set.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::var(TOKEN_ENV).ok(), std::env::var(ROOT_ENV).ok());
    }

    fn apply_overrides(&mut self, token: Option<String>, root: Option<String>) {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.remote.token = Some(token.trim().to_string());
        }
        if let Some(root) = root.filter(|r| !r.trim().is_empty()) {
            self.install.root = PathBuf::from(root.trim());
        }
    }

    /// Check that the configuration can drive a retriever.
    pub fn validate(&self) -> Result<()> {
        if self.remote.owner.trim().is_empty() || self.remote.repo.trim().is_empty() {
            return Err(UpdaterError::Config(
                "remote.owner and remote.repo must be set".to_string(),
            ));
        }
        if self.remote.mode == RemoteMode::Authenticated
            && self.remote.token.as_deref().map_or(true, |t| t.trim().is_empty())
        {
            return Err(UpdaterError::Config(format!(
                "authenticated mode requires remote.token or {}",
                TOKEN_ENV
            )));
        }
        if self.install.backup_suffix.trim().is_empty() {
            return Err(UpdaterError::Config(
                "install.backup_suffix must not be empty".to_string(),
            ));
        }
        if self.install.version_file.trim().is_empty() {
            return Err(UpdaterError::Config(
                "install.version_file must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Scanner options: built-in reserved names plus this installation's
    /// marker, manifest name, backup suffix and configured extras.
    pub fn scan_options(&self) -> ScanOptions {
        let manifest_name = self
            .remote
            .manifest_path
            .rsplit('/')
            .next()
            .unwrap_or(MANIFEST_FILE_NAME)
            .to_string();

        ScanOptions::default()
            .with_extra_patterns([
                self.install.version_file.clone(),
                self.install.backup_suffix.clone(),
                manifest_name,
            ])
            .with_extra_patterns(&self.install.exclude_patterns)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.network.timeout_secs.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.network.connect_timeout_secs.max(1))
    }
}
