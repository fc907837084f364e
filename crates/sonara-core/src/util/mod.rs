//! Utility modules.
//!
//! - [`files`]: Atomic file replacement and JSON helpers

pub mod files;
