//! Download progress tracking.

pub mod progress;
pub mod progress_stream;
