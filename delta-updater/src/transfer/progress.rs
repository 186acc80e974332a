//! Progress accounting for an apply pass.
//!
//! Deletions count as processed files with no bytes, so completion is
//! measured in files while speed is measured in downloaded bytes.

use serde::Serialize;
use std::time::{Duration, Instant};

/// Point-in-time view of an apply pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub files_processed: usize,
    pub total_files: usize,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    /// Completion by files, 0-100
    pub percent: f64,
    /// Average download speed since start
    pub bytes_per_second: u64,
    pub current_file: Option<String>,
}

/// Tracks files and bytes processed during one apply pass
#[derive(Debug)]
pub struct ProgressTracker {
    start_time: Instant,
    total_files: usize,
    total_bytes: u64,
    files_processed: usize,
    downloaded_bytes: u64,
    current_file: Option<String>,
}

impl ProgressTracker {
    pub fn new(total_files: usize, total_bytes: u64) -> Self {
        Self {
            start_time: Instant::now(),
            total_files,
            total_bytes,
            files_processed: 0,
            downloaded_bytes: 0,
            current_file: None,
        }
    }

    /// Mark `path` as the file being worked on
    pub fn start_file(&mut self, path: &str) {
        self.current_file = Some(path.to_string());
    }

    /// Record a finished file (successful or not) and the bytes it downloaded
    pub fn finish_file(&mut self, downloaded: u64) {
        self.files_processed += 1;
        self.downloaded_bytes += downloaded;
        self.current_file = None;
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn average_speed(&self) -> u64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.downloaded_bytes as f64 / elapsed) as u64
        } else {
            0
        }
    }

    pub fn percent(&self) -> f64 {
        if self.total_files == 0 {
            100.0
        } else {
            ((self.files_processed as f64 / self.total_files as f64) * 100.0).min(100.0)
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            files_processed: self.files_processed,
            total_files: self.total_files,
            downloaded_bytes: self.downloaded_bytes,
            total_bytes: self.total_bytes,
            percent: self.percent(),
            bytes_per_second: self.average_speed(),
            current_file: self.current_file.clone(),
        }
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed as human-readable string
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    if seconds < 60 {
        format!("{}.{}s", seconds, duration.subsec_millis() / 100)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_counts_files_and_bytes() {
        let mut tracker = ProgressTracker::new(4, 300);
        assert_eq!(tracker.percent(), 0.0);

        tracker.start_file("old.txt");
        assert_eq!(tracker.snapshot().current_file.as_deref(), Some("old.txt"));
        tracker.finish_file(0);

        tracker.start_file("new.dll");
        tracker.finish_file(200);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.files_processed, 2);
        assert_eq!(snapshot.downloaded_bytes, 200);
        assert!((snapshot.percent - 50.0).abs() < 0.01);
        assert!(snapshot.current_file.is_none());
    }

    #[test]
    fn test_empty_pass_is_complete() {
        let tracker = ProgressTracker::new(0, 0);
        assert_eq!(tracker.percent(), 100.0);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.00 GB");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(1024), "1.00 KB/s");
        assert_eq!(format_speed(1024 * 1024), "1.00 MB/s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3665)), "1h 1m");
    }
}
