//! Delta Updater Library
//!
//! Manifest-based update client: scans an installation, diffs it against a
//! published remote manifest and downloads, verifies and replaces only the
//! files that changed.

pub mod config;
pub mod events;
pub mod executor;
pub mod fs;
pub mod manifest;
pub mod remote;
pub mod shutdown;
pub mod sync;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use events::{EventBus, SyncEvent};
pub use executor::{CheckReport, CheckStatus, Updater, UpdaterSettings};
pub use manifest::{FileRecord, Manifest};
pub use remote::{build_retriever, Retriever};
pub use sync::apply::{ApplyReport, FileStatus};
pub use sync::diff::{ChangeEntry, ChangeSet, ChangeType};
pub use utils::errors::{Result, UpdaterError};
