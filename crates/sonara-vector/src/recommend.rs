//! Similar-item lookup across one or more feature spaces.
//!
//! The service is read-only after construction and is `Send + Sync`, so a
//! single instance can answer concurrent queries behind an `Arc`.

use crate::manager::IndexHandle;
use crate::space::SpaceName;
use serde::Serialize;
use sonara_core::{Error, ItemCollection, Result};
use std::collections::BTreeMap;

/// One recommended item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    /// Item identifier.
    pub id: String,
    /// Distance from the query item.
    pub distance: f32,
    /// Display columns from the source collection.
    pub metadata: BTreeMap<String, String>,
}

/// Results for one query, keyed by space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationSet {
    /// The item the query was made for.
    pub query_id: String,
    /// Ranked neighbours per space, nearest first.
    pub results: BTreeMap<SpaceName, Vec<Recommendation>>,
}

/// Answers "items like X" queries against built indices.
#[derive(Debug)]
pub struct RecommendationService {
    collection: ItemCollection,
    indices: BTreeMap<SpaceName, IndexHandle>,
    display_columns: Vec<String>,
}

impl RecommendationService {
    /// Create a service over a collection with no indices yet.
    pub fn new(collection: ItemCollection) -> Self {
        Self {
            collection,
            indices: BTreeMap::new(),
            display_columns: Vec::new(),
        }
    }

    /// Add a built index, replacing any for the same space.
    pub fn with_index(mut self, handle: IndexHandle) -> Self {
        self.indices.insert(handle.space(), handle);
        self
    }

    /// Columns copied into each result's metadata.
    pub fn with_display_columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.display_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Spaces with a loaded index.
    pub fn spaces(&self) -> Vec<SpaceName> {
        self.indices.keys().copied().collect()
    }

    /// The source collection.
    pub fn collection(&self) -> &ItemCollection {
        &self.collection
    }

    /// Recommend up to `k` items similar to `id` in each requested space.
    ///
    /// An empty `spaces` slice queries every loaded index. The query item
    /// is never among its own results.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidData`] if `k` is zero.
    /// - [`Error::NotFound`] if a requested space has no index, or the item
    ///   is not in a requested space (for example because its features were
    ///   Absent).
    pub fn recommend(&self, id: &str, k: usize, spaces: &[SpaceName]) -> Result<RecommendationSet> {
        if k == 0 {
            return Err(Error::invalid_data("k must be at least 1"));
        }
        let spaces = if spaces.is_empty() {
            self.spaces()
        } else {
            spaces.to_vec()
        };
        if spaces.is_empty() {
            return Err(Error::not_found("No indices are loaded"));
        }

        let mut results = BTreeMap::new();
        for space in spaces {
            let handle = self
                .indices
                .get(&space)
                .ok_or_else(|| Error::not_found(format!("No index for space '{space}'")))?;
            let recommendations = handle
                .query_id(id, k)?
                .into_iter()
                .map(|m| Recommendation {
                    metadata: self.metadata_for(&m.id),
                    id: m.id,
                    distance: m.distance,
                })
                .collect();
            results.insert(space, recommendations);
        }

        Ok(RecommendationSet {
            query_id: id.to_string(),
            results,
        })
    }

    fn metadata_for(&self, id: &str) -> BTreeMap<String, String> {
        match self.collection.position(id) {
            Some(row) => self.collection.metadata(row, self.display_columns.as_slice()),
            None => BTreeMap::new(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
