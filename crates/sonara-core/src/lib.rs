//! Sonara Core: shared types, errors, collections, and utilities.
//!
//! This crate provides the foundational types used across all Sonara crates.
//! It has no internal Sonara dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias
//! - [`collection`]: CSV-backed item collections keyed by identifier
//! - [`vector`]: The validated feature vector value type
//! - [`traits`]: Configuration abstraction
//! - [`util`]: Atomic file utilities

#![doc = include_str!("../README.md")]

pub mod collection;
pub mod error;
pub mod traits;
pub mod util;
pub mod vector;

// Re-export key types at crate root for convenience
pub use collection::{ItemCollection, LoadOptions};
pub use error::{Error, Result};
pub use traits::ConfigProvider;
pub use vector::FeatureVector;
