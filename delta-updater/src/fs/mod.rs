//! Local filesystem: scanning, fingerprinting and path resolution.

pub mod checksum;
pub mod paths;
pub mod walker;
