//! The extraction orchestrator.
//!
//! Drives a collection through the worker pool in fixed-size batches:
//!
//! ```text
//! INIT -> LOAD_CHECKPOINT -> RESUME_COMPUTE -> BATCH_LOOP -> DONE
//! ```
//!
//! After every batch the outcomes are merged into the checkpoint, the
//! checkpoint is persisted, and the status projection is rewritten, in that
//! order. Batch N is fully on disk before batch N+1 is dispatched, so an
//! interrupted run loses at most the batch in flight. One pool session spans
//! the whole loop, so each worker loads its extractor once per run.

use sonara_core::{Error, ItemCollection, Result};
use sonara_extract::{ExtractorFactory, WorkItem};
use sonara_pipeline_state::{
    CheckpointIdentity, CheckpointStore, RowOutcome, reconcile, write_status,
};
use std::path::{Path, PathBuf};

use crate::pool::{PoolSession, WorkerPool, default_workers};

/// Default number of rows per batch.
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 40;

// ============================================================================
// Configuration
// ============================================================================

/// Settings for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Directory holding checkpoint files.
    pub checkpoint_dir: PathBuf,
    /// Column with each item's image path.
    pub image_column: String,
    /// Base directory for relative image paths.
    pub image_root: Option<PathBuf>,
    /// Where to write the status projection, if anywhere.
    pub status_path: Option<PathBuf>,
    /// Identifier column, used to read back a previous status projection.
    pub id_column: String,
    /// Rows per batch.
    pub interval: usize,
    /// Worker threads.
    pub workers: usize,
    /// Stop after this many committed batches.
    pub max_batches: Option<usize>,
}

impl ExtractionConfig {
    /// Create a config with defaults for everything but the checkpoint directory.
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            image_column: "image_path".to_string(),
            image_root: None,
            status_path: None,
            id_column: "id".to_string(),
            interval: DEFAULT_CHECKPOINT_INTERVAL,
            workers: default_workers(),
            max_batches: None,
        }
    }

    /// Set the image path column.
    pub fn with_image_column(mut self, column: impl Into<String>) -> Self {
        self.image_column = column.into();
        self
    }

    /// Resolve relative image paths against `root`.
    pub fn with_image_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.image_root = Some(root.into());
        self
    }

    /// Write the status projection to `path`.
    pub fn with_status_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.status_path = Some(path.into());
        self
    }

    /// Set the identifier column.
    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    /// Set the batch size.
    pub fn with_interval(mut self, interval: usize) -> Self {
        self.interval = interval;
        self
    }

    /// Set the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Stop after `batches` committed batches.
    pub fn with_max_batches(mut self, batches: usize) -> Self {
        self.max_batches = Some(batches);
        self
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Progress of one committed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Zero-based batch index within this run.
    pub index: usize,
    /// First row of the batch.
    pub start: usize,
    /// One past the last row of the batch.
    pub end: usize,
    /// Rows that produced a vector.
    pub succeeded: usize,
    /// Rows recorded as Absent (errors, crashes, missing image paths).
    pub failed: usize,
}

/// Summary of a whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Extractor identity of the checkpoint.
    pub identity: CheckpointIdentity,
    /// Rows in the collection.
    pub total_rows: usize,
    /// Row the run started from when a prior checkpoint was found.
    pub resumed_from: Option<usize>,
    /// Batches committed in this run.
    pub batches: Vec<BatchReport>,
    /// Items sent to the worker pool.
    pub dispatched: usize,
    /// Items that produced a vector.
    pub succeeded: usize,
    /// Items recorded as Absent.
    pub failed: usize,
    /// Items whose extractor panicked (also counted in `failed`).
    pub crashed: usize,
    /// Rows without an image path, recorded as Absent without dispatch.
    pub skipped: usize,
    /// Whether every row now has a recorded outcome.
    pub complete: bool,
}

/// Orchestrator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Collection validated, nothing loaded yet.
    Init,
    /// Checkpoint loaded and validated.
    LoadCheckpoint,
    /// Resume offset computed.
    ResumeCompute,
    /// Dispatching batches.
    BatchLoop,
    /// Final persistence done.
    Done,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs extraction for one collection and one extractor identity.
pub struct ExtractionOrchestrator<'a> {
    collection: &'a ItemCollection,
    factory: &'a dyn ExtractorFactory,
    config: ExtractionConfig,
    identity: CheckpointIdentity,
    pool: WorkerPool,
    phase: Phase,
    store: Option<CheckpointStore>,
    resume_from: usize,
    report: ExtractionReport,
}

impl<'a> ExtractionOrchestrator<'a> {
    /// INIT: validate the collection against the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the image column is missing or the
    /// batch size is zero.
    pub fn new(
        collection: &'a ItemCollection,
        factory: &'a dyn ExtractorFactory,
        config: ExtractionConfig,
    ) -> Result<Self> {
        collection.require_columns(&[config.image_column.as_str()])?;
        if config.interval == 0 {
            return Err(Error::config("Checkpoint interval must be at least 1"));
        }

        let identity = CheckpointIdentity::new(factory.method(), factory.model());
        let pool = WorkerPool::new(config.workers);
        tracing::debug!(
            identity = %identity,
            rows = collection.len(),
            workers = pool.workers(),
            interval = config.interval,
            "Extraction initialised"
        );

        Ok(Self {
            collection,
            factory,
            report: ExtractionReport {
                identity: identity.clone(),
                total_rows: collection.len(),
                resumed_from: None,
                batches: Vec::new(),
                dispatched: 0,
                succeeded: 0,
                failed: 0,
                crashed: 0,
                skipped: 0,
                complete: false,
            },
            config,
            identity,
            pool,
            phase: Phase::Init,
            store: None,
            resume_from: 0,
        })
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Path of the checkpoint file for this run.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.config.checkpoint_dir.join(self.identity.file_name())
    }

    /// Run every remaining phase and return the report.
    pub fn run(&mut self) -> Result<ExtractionReport> {
        self.load_checkpoint()?;
        let from = self.compute_resume()?;
        self.batch_loop(from)?;
        self.finish()?;
        Ok(self.report.clone())
    }

    /// LOAD_CHECKPOINT: load the prior record and check it still fits.
    pub fn load_checkpoint(&mut self) -> Result<()> {
        let store = CheckpointStore::open(&self.config.checkpoint_dir, &self.identity);
        store.record().validate_against(self.collection)?;

        if let Some(status_path) = &self.config.status_path {
            reconcile(status_path, &self.config.id_column, store.record());
        }

        self.store = Some(store);
        self.phase = Phase::LoadCheckpoint;
        Ok(())
    }

    /// RESUME_COMPUTE: first row to dispatch.
    pub fn compute_resume(&mut self) -> Result<usize> {
        let store = self.store()?;
        let from = store.record().resume_offset();
        if store.resumed() {
            tracing::info!(row = from, identity = %self.identity, "Resuming from row {from}");
            self.report.resumed_from = Some(from);
        }
        self.resume_from = from;
        self.phase = Phase::ResumeCompute;
        Ok(from)
    }

    /// BATCH_LOOP: dispatch, merge, persist, project, repeat.
    pub fn batch_loop(&mut self, from: usize) -> Result<()> {
        self.phase = Phase::BatchLoop;
        let pool = self.pool;
        let factory = self.factory;
        pool.session(factory, |session| self.drive_batches(session, from))
    }

    fn drive_batches(&mut self, session: &mut PoolSession<'_>, from: usize) -> Result<()> {
        let total = self.collection.len();
        let interval = self.config.interval;
        let mut start = from;

        while start < total {
            if self
                .config
                .max_batches
                .is_some_and(|max| self.report.batches.len() >= max)
            {
                tracing::info!(next_row = start, "Batch limit reached; stopping");
                break;
            }

            let end = (start + interval).min(total);
            let batch = self.run_batch(session, self.report.batches.len(), start, end)?;
            tracing::info!(
                batch = batch.index,
                rows = %format!("{}..{}", batch.start, batch.end),
                succeeded = batch.succeeded,
                failed = batch.failed,
                "Batch committed"
            );
            self.report.batches.push(batch);
            start = end;
        }

        self.resume_from = start;
        Ok(())
    }

    fn run_batch(
        &mut self,
        session: &mut PoolSession<'_>,
        index: usize,
        start: usize,
        end: usize,
    ) -> Result<BatchReport> {
        let mut items = Vec::with_capacity(end - start);
        let mut skipped = Vec::new();

        for row in start..end {
            let id = self.collection.id(row).unwrap_or_default().to_string();
            match self.image_path(row) {
                Some(path) => items.push(WorkItem::new(row, id, path)),
                None => {
                    tracing::warn!(row, id = %id, "No image path; recording as absent");
                    skipped.push(RowOutcome::absent(row, id));
                }
            }
        }

        let dispatched = items.len();
        let skipped_count = skipped.len();
        let output = session.run_batch(items)?;

        let store = self.store_mut()?;
        let merged = store.merge(output.outcomes.into_iter().chain(skipped))?;
        store.persist()?;
        self.write_status()?;

        self.report.dispatched += dispatched;
        self.report.skipped += skipped_count;
        self.report.crashed += output.crashed;
        self.report.succeeded += merged.succeeded;
        self.report.failed += merged.failed + merged.kept_previous;

        Ok(BatchReport {
            index,
            start,
            end,
            succeeded: merged.succeeded,
            failed: merged.failed + merged.kept_previous,
        })
    }

    /// DONE: final persistence. Safe to call more than once.
    pub fn finish(&mut self) -> Result<()> {
        let total = self.collection.len();
        let store = self.store_mut()?;
        store.flush()?;
        let complete = store.record().resume_offset() >= total;
        self.write_status()?;

        self.report.complete = complete;
        if self.phase != Phase::Done {
            tracing::info!(
                identity = %self.identity,
                dispatched = self.report.dispatched,
                succeeded = self.report.succeeded,
                failed = self.report.failed,
                complete,
                "Extraction finished"
            );
        }
        self.phase = Phase::Done;
        Ok(())
    }

    /// Report so far.
    pub fn report(&self) -> &ExtractionReport {
        &self.report
    }

    /// The checkpoint store, once loaded.
    pub fn checkpoint(&self) -> Option<&CheckpointStore> {
        self.store.as_ref()
    }

    fn image_path(&self, row: usize) -> Option<PathBuf> {
        let raw = self.collection.value(row, &self.config.image_column)?.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("no") {
            return None;
        }
        let path = Path::new(raw);
        Some(match &self.config.image_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        })
    }

    fn write_status(&self) -> Result<()> {
        if let (Some(path), Some(store)) = (&self.config.status_path, &self.store) {
            write_status(path, &self.config.id_column, self.collection, store.record())?;
        }
        Ok(())
    }

    fn store(&self) -> Result<&CheckpointStore> {
        self.store
            .as_ref()
            .ok_or_else(|| Error::operation("Checkpoint not loaded"))
    }

    fn store_mut(&mut self) -> Result<&mut CheckpointStore> {
        self.store
            .as_mut()
            .ok_or_else(|| Error::operation("Checkpoint not loaded"))
    }
}

impl std::fmt::Debug for ExtractionOrchestrator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionOrchestrator")
            .field("identity", &self.identity)
            .field("phase", &self.phase)
            .field("resume_from", &self.resume_from)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
