//! Engine events for progress and log rendering.
//!
//! The engine never talks to a UI directly. It publishes [`SyncEvent`]s on a
//! broadcast channel; the CLI (or any other front end) subscribes and renders
//! them.

use crate::sync::diff::{ChangeSummary, ChangeType};
use crate::transfer::progress::ProgressSnapshot;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// Maximum number of queued events per subscriber
const EVENT_CAPACITY: usize = 1024;

/// Events emitted during check and apply cycles
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum SyncEvent {
    #[serde(rename = "check:started")]
    CheckStarted { root: String, remote: String },

    #[serde(rename = "check:completed")]
    CheckCompleted {
        local_version: String,
        remote_version: String,
        local_files: usize,
        remote_files: usize,
        summary: ChangeSummary,
    },

    /// Versions differ but no file does
    #[serde(rename = "version:anomaly")]
    VersionAnomaly {
        local_version: String,
        remote_version: String,
    },

    #[serde(rename = "apply:started")]
    ApplyStarted { total_files: usize, total_bytes: u64 },

    #[serde(rename = "file:deleted")]
    FileDeleted { path: String, existed: bool },

    #[serde(rename = "file:downloading")]
    FileDownloading { path: String, size: u64 },

    /// Cumulative bytes received for the file currently downloading
    #[serde(rename = "file:bytes")]
    FileBytes { path: String, received: u64 },

    #[serde(rename = "file:written")]
    FileWritten {
        path: String,
        change_type: ChangeType,
        bytes: u64,
        backed_up: bool,
    },

    #[serde(rename = "file:failed")]
    FileFailed {
        path: String,
        change_type: ChangeType,
        error: String,
    },

    #[serde(rename = "apply:progress")]
    ApplyProgress(ProgressSnapshot),

    #[serde(rename = "apply:completed")]
    ApplyCompleted {
        applied: usize,
        failed: usize,
        cancelled: bool,
        version_written: bool,
        duration_ms: u64,
    },
}

/// Broadcast bus for [`SyncEvent`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Having no subscriber is normal.
    pub fn emit(&self, event: SyncEvent) {
        if let Ok(count) = self.tx.send(event) {
            trace!("Event delivered to {} subscriber(s)", count);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
