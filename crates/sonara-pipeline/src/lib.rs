//! Resumable, checkpointed, parallel feature extraction.
//!
//! - [`pool`]: the bounded worker pool with per-item panic isolation
//! - [`orchestrator`]: the batch state machine that drives the pool and
//!   persists progress after every batch
//!
//! ```no_run
//! use sonara_core::{ItemCollection, LoadOptions};
//! use sonara_extract::ExtractorSpec;
//! use sonara_pipeline::{ExtractionConfig, ExtractionOrchestrator};
//!
//! # fn main() -> sonara_core::Result<()> {
//! let collection = ItemCollection::from_csv_path("songs.csv", &LoadOptions::default())?;
//! let factory = ExtractorSpec::basic();
//! let config = ExtractionConfig::new("checkpoints").with_interval(40);
//!
//! let report = ExtractionOrchestrator::new(&collection, &factory, config)?.run()?;
//! println!("{} succeeded, {} failed", report.succeeded, report.failed);
//! # Ok(())
//! # }
//! ```

pub mod orchestrator;
pub mod pool;

pub use orchestrator::{
    BatchReport, DEFAULT_CHECKPOINT_INTERVAL, ExtractionConfig, ExtractionOrchestrator,
    ExtractionReport, Phase,
};
pub use pool::{PoolOutput, PoolSession, WorkerPool, default_workers};
