//! Index lifecycle: build, persist, reload.
//!
//! One index per feature space lives in the index directory as
//! `<space>.index.json` with a `<space>.meta.json` sidecar. A loaded
//! [`IndexHandle`] is read-only and can be shared across threads.

use crate::ann::{AnnIndex, Neighbor};
use crate::persistence::{self, IndexMetadata};
use crate::space::{FeatureSpace, SpaceName};
use serde::{Deserialize, Serialize};
use sonara_core::util::files;
use sonara_core::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default number of trees per index.
pub const DEFAULT_TREES: usize = 10;

/// Default candidate multiplier (`search_k = k * trees * multiplier`).
pub const DEFAULT_SEARCH_MULTIPLIER: usize = 2;

/// Build and query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    /// Trees per index.
    pub trees: usize,
    /// Build seed.
    pub seed: u64,
    /// Candidate multiplier for searches.
    pub search_multiplier: usize,
    /// Rebuild even when the stored index is fresh.
    pub force: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            trees: DEFAULT_TREES,
            seed: 0,
            search_multiplier: DEFAULT_SEARCH_MULTIPLIER,
            force: false,
        }
    }
}

impl IndexOptions {
    /// Set the tree count.
    pub fn with_trees(mut self, trees: usize) -> Self {
        self.trees = trees;
        self
    }

    /// Set the build seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the candidate multiplier.
    pub fn with_search_multiplier(mut self, multiplier: usize) -> Self {
        self.search_multiplier = multiplier;
        self
    }

    /// Rebuild regardless of freshness.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// A search hit resolved to an item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    /// Item identifier.
    pub id: String,
    /// Collection row at build time.
    pub row: usize,
    /// Distance from the query.
    pub distance: f32,
}

/// A built index together with its row mapping.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    metadata: IndexMetadata,
    index: AnnIndex,
    positions: HashMap<String, usize>,
    search_multiplier: usize,
}

impl IndexHandle {
    fn new(metadata: IndexMetadata, index: AnnIndex, search_multiplier: usize) -> Result<Self> {
        if metadata.ids.len() != index.len() || metadata.rows.len() != index.len() {
            return Err(Error::invalid_data(format!(
                "Index for '{}' has {} rows but its metadata maps {}",
                metadata.space,
                index.len(),
                metadata.ids.len()
            )));
        }
        let positions = metadata
            .ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        Ok(Self {
            metadata,
            index,
            positions,
            search_multiplier: search_multiplier.max(1),
        })
    }

    /// Space this index answers for.
    pub fn space(&self) -> SpaceName {
        self.metadata.space
    }

    /// Stored metadata.
    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    /// Underlying forest.
    pub fn index(&self) -> &AnnIndex {
        &self.index
    }

    /// Number of indexed items.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the index holds no items.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Whether an item is in this index.
    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Candidate budget for a `k`-neighbour search.
    pub fn search_k(&self, k: usize) -> usize {
        k.saturating_mul(self.index.trees())
            .saturating_mul(self.search_multiplier)
    }

    /// The `k` nearest items to an indexed item, excluding itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the item is not in this index.
    pub fn query_id(&self, id: &str, k: usize) -> Result<Vec<Match>> {
        let position = self.positions.get(id).copied().ok_or_else(|| {
            Error::not_found(format!(
                "Item '{id}' is not in the '{}' index",
                self.metadata.space
            ))
        })?;
        let hits = self.index.query_row(position, k, self.search_k(k.saturating_add(1)))?;
        Ok(self.resolve(hits))
    }

    /// The `k` nearest items to an arbitrary vector in this space.
    pub fn query_vector(&self, vector: &[f32], k: usize) -> Result<Vec<Match>> {
        let hits = self.index.query_vector(vector, k, self.search_k(k))?;
        Ok(self.resolve(hits))
    }

    fn resolve(&self, hits: Vec<Neighbor>) -> Vec<Match> {
        hits.into_iter()
            .filter_map(|hit| {
                Some(Match {
                    id: self.metadata.ids.get(hit.row)?.clone(),
                    row: *self.metadata.rows.get(hit.row)?,
                    distance: hit.distance,
                })
            })
            .collect()
    }
}

/// Result of [`IndexManager::build_and_save`].
#[derive(Debug, Clone)]
pub enum BuildOutcome {
    /// A new index was built and written.
    Built(IndexHandle),
    /// The stored index was already fresh and was loaded instead.
    Fresh(IndexHandle),
}

impl BuildOutcome {
    /// The handle, however it was obtained.
    pub fn into_handle(self) -> IndexHandle {
        match self {
            Self::Built(handle) | Self::Fresh(handle) => handle,
        }
    }

    /// Whether a build happened.
    pub fn was_built(&self) -> bool {
        matches!(self, Self::Built(_))
    }
}

/// Builds, persists, and loads indices under one directory.
#[derive(Debug, Clone)]
pub struct IndexManager {
    dir: PathBuf,
    options: IndexOptions,
}

impl IndexManager {
    /// Create a manager rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>, options: IndexOptions) -> Self {
        Self {
            dir: dir.into(),
            options,
        }
    }

    /// Index directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Build and query parameters.
    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// Path of a space's index file.
    pub fn index_path(&self, space: SpaceName) -> PathBuf {
        self.dir.join(format!("{}.index.json", space.file_stem()))
    }

    /// Path of a space's metadata sidecar.
    pub fn metadata_path(&self, space: SpaceName) -> PathBuf {
        self.dir.join(format!("{}.meta.json", space.file_stem()))
    }

    /// Build an index over a space without writing it.
    pub fn build(&self, space: &FeatureSpace) -> Result<IndexHandle> {
        log::info!(
            "Building '{}' index: {} items, {} dims, {} trees",
            space.name(),
            space.len(),
            space.dimension(),
            self.options.trees
        );
        let index = AnnIndex::build(
            space.matrix().to_vec(),
            space.dimension(),
            self.options.trees,
            self.options.seed,
        )?;
        let metadata = IndexMetadata::for_space(space, self.options.trees, self.options.seed);
        IndexHandle::new(metadata, index, self.options.search_multiplier)
    }

    /// Write an index and its metadata.
    ///
    /// The index is written before the metadata, so a crash in between
    /// leaves a stale sidecar that forces a rebuild next time.
    pub fn save(&self, handle: &IndexHandle) -> Result<()> {
        files::ensure_dir(&self.dir)?;
        let space = handle.space();
        handle.index.save(&self.index_path(space))?;
        persistence::save_metadata(&self.metadata_path(space), &handle.metadata)?;
        log::info!(
            "Saved '{space}' index to {}",
            self.index_path(space).display()
        );
        Ok(())
    }

    /// Load a previously saved index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the space has not been built, and
    /// [`Error::Config`] if the index file disagrees with its metadata.
    pub fn load(&self, space: SpaceName) -> Result<IndexHandle> {
        let metadata_path = self.metadata_path(space);
        if !metadata_path.exists() {
            return Err(Error::not_found(format!(
                "No '{space}' index in {}",
                self.dir.display()
            )));
        }
        let metadata = persistence::load_metadata(&metadata_path)?;
        if metadata.space != space {
            return Err(Error::config(format!(
                "{} describes space '{}', expected '{space}'",
                metadata_path.display(),
                metadata.space
            )));
        }
        let index = AnnIndex::load(&self.index_path(space), metadata.dimension, metadata.metric)?;
        let handle = IndexHandle::new(metadata, index, self.options.search_multiplier)?;
        log::info!("Loaded '{space}' index ({} items)", handle.len());
        Ok(handle)
    }

    /// Whether the stored index for `space` matches its current contents.
    pub fn is_fresh(&self, space: &FeatureSpace) -> bool {
        self.index_path(space.name()).exists()
            && persistence::is_index_fresh(
                &self.metadata_path(space.name()),
                space,
                self.options.trees,
                self.options.seed,
            )
    }

    /// Build and save unless a fresh index already exists.
    pub fn build_and_save(&self, space: &FeatureSpace) -> Result<BuildOutcome> {
        if !self.options.force && self.is_fresh(space) {
            match self.load(space.name()) {
                Ok(handle) => {
                    log::info!("'{}' index is up to date; skipping build", space.name());
                    return Ok(BuildOutcome::Fresh(handle));
                }
                Err(e) => log::warn!("Stored '{}' index unusable, rebuilding: {e}", space.name()),
            }
        }
        let handle = self.build(space)?;
        self.save(&handle)?;
        Ok(BuildOutcome::Built(handle))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn space() -> FeatureSpace {
        FeatureSpace::new(
            SpaceName::Audio,
            2,
            vec!["s1".into(), "s2".into(), "s3".into()],
            vec![0, 2, 5],
            vec![vec![1.0, 0.0], vec![1.0, 0.01], vec![0.0, 1.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_paths() {
        let manager = IndexManager::new("/idx", IndexOptions::default());
        assert_eq!(
            manager.index_path(SpaceName::AudioDeep),
            PathBuf::from("/idx/audio_deep.index.json")
        );
        assert_eq!(
            manager.metadata_path(SpaceName::Audio),
            PathBuf::from("/idx/audio.meta.json")
        );
    }

    #[test]
    fn test_query_id_maps_rows() {
        let manager = IndexManager::new("/unused", IndexOptions::default());
        let handle = manager.build(&space()).unwrap();

        let hits = handle.query_id("s1", 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "s2");
        assert_eq!(hits[0].row, 2);
        assert!(handle.query_id("nope", 1).unwrap_err().is_not_found());
    }

    #[test]
    fn test_query_vector() {
        let manager = IndexManager::new("/unused", IndexOptions::default());
        let handle = manager.build(&space()).unwrap();
        let hits = handle.query_vector(&[0.1, 0.9], 1).unwrap();
        assert_eq!(hits[0].id, "s3");
    }

    #[test]
    fn test_build_and_save_then_fresh() {
        let dir = TempDir::new().unwrap();
        let manager = IndexManager::new(dir.path(), IndexOptions::default().with_trees(3));

        assert!(manager.build_and_save(&space()).unwrap().was_built());
        assert!(manager.is_fresh(&space()));
        assert!(!manager.build_and_save(&space()).unwrap().was_built());

        let forced = IndexManager::new(
            dir.path(),
            IndexOptions::default().with_trees(3).with_force(true),
        );
        assert!(forced.build_and_save(&space()).unwrap().was_built());
    }

    #[test]
    fn test_load_missing_space() {
        let dir = TempDir::new().unwrap();
        let manager = IndexManager::new(dir.path(), IndexOptions::default());
        assert!(manager.load(SpaceName::Deep).unwrap_err().is_not_found());
    }

    #[test]
    fn test_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let manager = IndexManager::new(dir.path(), IndexOptions::default());
        let built = manager.build_and_save(&space()).unwrap().into_handle();
        let loaded = manager.load(SpaceName::Audio).unwrap();

        assert_eq!(loaded.index(), built.index());
        assert_eq!(loaded.metadata().rows, vec![0, 2, 5]);
        assert!(loaded.contains("s3"));
    }
}
