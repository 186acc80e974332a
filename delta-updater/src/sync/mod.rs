//! Change computation and application.

pub mod apply;
pub mod diff;
