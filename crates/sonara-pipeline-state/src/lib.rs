//! Durable state for the Sonara extraction pipeline.
//!
//! - [`checkpoint`]: the per-identity checkpoint record and its store
//! - [`status`]: the tabular status projection written next to the source

pub mod checkpoint;
pub mod status;

pub use checkpoint::{
    CheckpointEntry, CheckpointIdentity, CheckpointRecord, CheckpointStore, MergeSummary,
    RowOutcome,
};
pub use status::{read_status, reconcile, write_status};
