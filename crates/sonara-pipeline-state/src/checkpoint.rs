//! Durable extraction checkpoints.
//!
//! A [`CheckpointRecord`] maps row positions to extraction outcomes for one
//! `(method, model)` identity. Every entry stores the item identifier next to
//! the outcome so a later run can detect a source collection that was
//! reordered or filtered differently.
//!
//! [`CheckpointStore`] pairs a record with its file location. It is owned by
//! a single writer (the orchestrator); readers only ever see whole files
//! because persistence goes through an atomic rename.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sonara_core::util::files::{atomic_write_json, read_json};
use sonara_core::{Error, FeatureVector, ItemCollection, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// On-disk format version.
const FORMAT_VERSION: u32 = 1;

// ============================================================================
// Identity
// ============================================================================

/// The extractor identity a checkpoint belongs to.
///
/// Changing either component starts an independent checkpoint rather than
/// mutating an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointIdentity {
    /// Extraction method name (e.g. `basic`, `deep`).
    pub method: String,
    /// Model name within the method (e.g. `color`, `clip-vit-b32`).
    pub model: String,
}

impl CheckpointIdentity {
    /// Create an identity.
    pub fn new(method: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            model: model.into(),
        }
    }

    /// Filesystem-safe key, `{method}_{model}`.
    pub fn key(&self) -> String {
        let raw = format!("{}_{}", self.method, self.model);
        raw.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '-'
                }
            })
            .collect()
    }

    /// Checkpoint file name inside a checkpoint directory.
    pub fn file_name(&self) -> String {
        format!("{}.checkpoint.json", self.key())
    }

    /// Name of the boolean column in the status projection.
    pub fn status_column(&self) -> String {
        format!("{}_extracted", self.key())
    }
}

impl std::fmt::Display for CheckpointIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.method, self.model)
    }
}

// ============================================================================
// Entries and outcomes
// ============================================================================

/// One recorded row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    /// Identifier of the item at this row when it was extracted.
    pub id: String,
    /// The extracted vector; `None` marks an Absent outcome.
    pub vector: Option<FeatureVector>,
}

impl CheckpointEntry {
    /// Whether extraction succeeded for this row.
    pub fn extracted(&self) -> bool {
        self.vector.is_some()
    }
}

/// The result of attempting one row, as produced by the worker pool.
#[derive(Debug, Clone, PartialEq)]
pub struct RowOutcome {
    /// Row position in the collection snapshot.
    pub row: usize,
    /// Item identifier at that row.
    pub id: String,
    /// Extracted vector, or `None` when the item failed.
    pub vector: Option<FeatureVector>,
}

impl RowOutcome {
    /// A successful outcome.
    pub fn extracted(row: usize, id: impl Into<String>, vector: FeatureVector) -> Self {
        Self {
            row,
            id: id.into(),
            vector: Some(vector),
        }
    }

    /// An Absent outcome.
    pub fn absent(row: usize, id: impl Into<String>) -> Self {
        Self {
            row,
            id: id.into(),
            vector: None,
        }
    }
}

/// Counts produced by a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Rows that now hold a vector from this batch.
    pub succeeded: usize,
    /// Rows recorded as Absent by this batch.
    pub failed: usize,
    /// Absent outcomes ignored because the row was already extracted.
    pub kept_previous: usize,
}

// ============================================================================
// Record
// ============================================================================

/// The full checkpoint for one extractor identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    version: u32,
    identity: CheckpointIdentity,
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    entries: BTreeMap<usize, CheckpointEntry>,
}

impl CheckpointRecord {
    /// An empty record.
    pub fn new(identity: CheckpointIdentity) -> Self {
        Self {
            version: FORMAT_VERSION,
            identity,
            dimension: None,
            updated_at: None,
            entries: BTreeMap::new(),
        }
    }

    /// Load a record, falling back to an empty one.
    ///
    /// A missing file is the normal first-run case. An unreadable or corrupt
    /// file, or one written for a different identity, is logged at `warn`
    /// and also yields an empty record. This never fails.
    pub fn load(path: &Path, identity: &CheckpointIdentity) -> Self {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No checkpoint found");
            return Self::new(identity.clone());
        }

        match read_json::<Self>(path) {
            Ok(record) if record.identity != *identity => {
                tracing::warn!(
                    path = %path.display(),
                    found = %record.identity,
                    expected = %identity,
                    "Checkpoint belongs to a different extractor; starting fresh"
                );
                Self::new(identity.clone())
            }
            Ok(record) if record.version != FORMAT_VERSION => {
                tracing::warn!(
                    path = %path.display(),
                    version = record.version,
                    "Unsupported checkpoint version; starting fresh"
                );
                Self::new(identity.clone())
            }
            Ok(record) => {
                tracing::debug!(
                    path = %path.display(),
                    entries = record.len(),
                    "Loaded checkpoint"
                );
                record
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not read checkpoint; starting fresh"
                );
                Self::new(identity.clone())
            }
        }
    }

    /// Persist the record atomically.
    pub fn persist(&mut self, path: &Path) -> Result<()> {
        self.updated_at = Some(Utc::now());
        atomic_write_json(path, self)
    }

    /// Upsert a batch of outcomes.
    ///
    /// Later outcomes for the same row replace earlier ones, except that an
    /// Absent outcome never replaces a stored vector. Vectors whose length
    /// differs from the record's established dimension are rejected.
    pub fn merge<I>(&mut self, outcomes: I) -> Result<MergeSummary>
    where
        I: IntoIterator<Item = RowOutcome>,
    {
        let mut summary = MergeSummary::default();

        for outcome in outcomes {
            match outcome.vector {
                Some(vector) => {
                    let dim = vector.dimension();
                    match self.dimension {
                        Some(expected) if expected != dim => {
                            return Err(Error::invalid_data(format!(
                                "Row {} has dimension {dim}, checkpoint expects {expected}",
                                outcome.row
                            )));
                        }
                        Some(_) => {}
                        None => self.dimension = Some(dim),
                    }
                    self.entries.insert(
                        outcome.row,
                        CheckpointEntry {
                            id: outcome.id,
                            vector: Some(vector),
                        },
                    );
                    summary.succeeded += 1;
                }
                None => {
                    if self.entries.get(&outcome.row).is_some_and(|e| e.extracted()) {
                        summary.kept_previous += 1;
                        continue;
                    }
                    self.entries.insert(
                        outcome.row,
                        CheckpointEntry {
                            id: outcome.id,
                            vector: None,
                        },
                    );
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Explicitly forget a row so it can be re-attempted.
    pub fn reset(&mut self, row: usize) -> Option<CheckpointEntry> {
        let removed = self.entries.remove(&row);
        if self.entries.values().all(|e| !e.extracted()) {
            self.dimension = None;
        }
        removed
    }

    /// Highest row position ever recorded, successful or Absent.
    pub fn max_completed_position(&self) -> Option<usize> {
        self.entries.keys().next_back().copied()
    }

    /// First row a resumed run should attempt.
    pub fn resume_offset(&self) -> usize {
        self.max_completed_position().map_or(0, |max| max + 1)
    }

    /// Check that every recorded row still refers to the same item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResumeInconsistency`] if a recorded row lies beyond
    /// the collection or its identifier no longer matches.
    pub fn validate_against(&self, collection: &ItemCollection) -> Result<()> {
        if let Some(max) = self.max_completed_position()
            && max >= collection.len()
        {
            return Err(Error::resume_inconsistency(format!(
                "Checkpoint {} records row {max} but the collection has {} rows; \
                 use a fresh checkpoint",
                self.identity,
                collection.len()
            )));
        }

        for (row, entry) in &self.entries {
            let current = collection.id(*row).unwrap_or_default();
            if current != entry.id {
                return Err(Error::resume_inconsistency(format!(
                    "Checkpoint {} row {row} was '{}' but is now '{current}'",
                    self.identity, entry.id
                )));
            }
        }
        Ok(())
    }

    /// The identity this record belongs to.
    pub fn identity(&self) -> &CheckpointIdentity {
        &self.identity
    }

    /// Vector dimension established by the first successful row.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// When the record was last persisted.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Entry at a row.
    pub fn get(&self, row: usize) -> Option<&CheckpointEntry> {
        self.entries.get(&row)
    }

    /// Whether the row holds a vector.
    pub fn is_extracted(&self, row: usize) -> bool {
        self.get(row).is_some_and(CheckpointEntry::extracted)
    }

    /// Number of recorded rows.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no rows are recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of rows holding a vector.
    pub fn extracted_count(&self) -> usize {
        self.entries.values().filter(|e| e.extracted()).count()
    }

    /// All entries in row order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &CheckpointEntry)> {
        self.entries.iter().map(|(row, e)| (*row, e))
    }

    /// Successful `(id, vector)` pairs in row order.
    pub fn vectors(&self) -> impl Iterator<Item = (&str, &FeatureVector)> {
        self.entries
            .values()
            .filter_map(|e| e.vector.as_ref().map(|v| (e.id.as_str(), v)))
    }
}

// ============================================================================
// Store
// ============================================================================

/// A checkpoint record bound to its file.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    record: CheckpointRecord,
    existed: bool,
    dirty: bool,
}

impl CheckpointStore {
    /// Open the checkpoint for `identity` inside `dir`.
    pub fn open(dir: &Path, identity: &CheckpointIdentity) -> Self {
        let path = dir.join(identity.file_name());
        Self::open_path(path, identity)
    }

    /// Open a checkpoint at an explicit path.
    pub fn open_path(path: impl Into<PathBuf>, identity: &CheckpointIdentity) -> Self {
        let path = path.into();
        let record = CheckpointRecord::load(&path, identity);
        let existed = !record.is_empty();
        // A file that loaded as empty was corrupt or foreign; replace it on the next flush.
        let dirty = !existed && path.exists();
        Self {
            path,
            record,
            existed,
            dirty,
        }
    }

    /// Whether a non-empty prior record was loaded.
    pub fn resumed(&self) -> bool {
        self.existed
    }

    /// File backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The in-memory record.
    pub fn record(&self) -> &CheckpointRecord {
        &self.record
    }

    /// Whether the record changed since it was loaded or last persisted.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Merge outcomes into the record.
    pub fn merge<I>(&mut self, outcomes: I) -> Result<MergeSummary>
    where
        I: IntoIterator<Item = RowOutcome>,
    {
        let summary = self.record.merge(outcomes)?;
        self.dirty = true;
        Ok(summary)
    }

    /// Persist the record to its file.
    pub fn persist(&mut self) -> Result<()> {
        self.record.persist(&self.path)?;
        self.dirty = false;
        Ok(())
    }

    /// Persist only if there are unsaved changes or no file exists yet.
    ///
    /// Returns whether a write happened.
    pub fn flush(&mut self) -> Result<bool> {
        if self.dirty || !self.path.exists() {
            self.persist()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Forget a row.
    pub fn reset(&mut self, row: usize) -> Option<CheckpointEntry> {
        let removed = self.record.reset(row);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }
}

// ============================================================================
// Tests
// ============================================================================
