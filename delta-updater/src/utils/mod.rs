//! Utility modules for the delta updater.

pub mod errors;
pub mod logger;

pub use errors::{Result, UpdaterError};
