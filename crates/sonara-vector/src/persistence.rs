//! Persistence and freshness checking for built indices.
//!
//! Every index file has a JSON metadata sidecar. It records the content
//! hash of the feature space it was built from, the build parameters, and
//! the mapping from index rows back to item identifiers and collection rows.
//! When the stored hash and parameters match a freshly assembled space, the
//! existing index is reused instead of rebuilt.

use crate::ann::Metric;
use crate::space::{FeatureSpace, SpaceName};
use serde::{Deserialize, Serialize};
use sonara_core::Result;
use sonara_core::util::files;
use std::path::Path;

/// Metadata stored alongside an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Space the index was built from.
    pub space: SpaceName,

    /// Vector width.
    pub dimension: usize,

    /// Distance metric.
    pub metric: Metric,

    /// Number of trees.
    pub trees: usize,

    /// Build seed.
    pub seed: u64,

    /// Number of indexed items.
    pub item_count: usize,

    /// Content hash of the feature space at build time.
    pub content_hash: String,

    /// Build timestamp (RFC 3339).
    pub built_at: String,

    /// Item identifier of each index row.
    pub ids: Vec<String>,

    /// Collection row of each index row.
    pub rows: Vec<usize>,
}

impl IndexMetadata {
    /// Describe an index about to be built from `space`.
    pub fn for_space(space: &FeatureSpace, trees: usize, seed: u64) -> Self {
        Self {
            space: space.name(),
            dimension: space.dimension(),
            metric: Metric::Euclidean,
            trees,
            seed,
            item_count: space.len(),
            content_hash: space.content_hash(),
            built_at: chrono::Utc::now().to_rfc3339(),
            ids: space.ids().to_vec(),
            rows: space.collection_rows().to_vec(),
        }
    }

    /// Whether an index with this metadata answers for `space` built with
    /// the given parameters.
    pub fn matches(&self, space: &FeatureSpace, trees: usize, seed: u64) -> bool {
        self.space == space.name()
            && self.dimension == space.dimension()
            && self.trees == trees
            && self.seed == seed
            && self.item_count == space.len()
            && self.content_hash == space.content_hash()
    }
}

/// Check whether a stored index is fresh for `space`.
///
/// Returns `false` when the metadata is missing or unreadable.
pub fn is_index_fresh(metadata_path: &Path, space: &FeatureSpace, trees: usize, seed: u64) -> bool {
    match load_metadata(metadata_path) {
        Ok(metadata) => metadata.matches(space, trees, seed),
        Err(_) => false,
    }
}

/// Save index metadata atomically.
pub fn save_metadata(metadata_path: &Path, metadata: &IndexMetadata) -> Result<()> {
    files::atomic_write_json(metadata_path, metadata)
}

/// Load index metadata.
pub fn load_metadata(metadata_path: &Path) -> Result<IndexMetadata> {
    files::read_json(metadata_path)
}

// ============================================================================
// Tests
// ============================================================================
