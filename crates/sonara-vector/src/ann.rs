//! Random-projection forest for approximate nearest-neighbour search.
//!
//! Each tree recursively splits the items by the hyperplane equidistant from
//! two randomly chosen items until a node holds at most [`LEAF_SIZE`] items.
//! A query walks all trees at once through a shared priority queue ordered by
//! distance to the splitting planes, gathers `search_k` candidates, and ranks
//! them by exact distance.
//!
//! Tree construction is deterministic: tree `t` of an index built with seed
//! `s` draws from a PCG stream seeded by BLAKE3 of `(s, t)`, so the same
//! vectors and seed always produce the same forest.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};
use sonara_core::util::files;
use sonara_core::{Error, Result};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::fmt;
use std::path::Path;

/// Maximum items per leaf.
pub const LEAF_SIZE: usize = 16;

/// Indices at or below this size are searched exhaustively.
pub const EXHAUSTIVE_LIMIT: usize = 512;

/// Random pairs tried before a degenerate node becomes a leaf.
const SPLIT_ATTEMPTS: usize = 8;

/// Distance metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Straight-line distance.
    #[default]
    Euclidean,
}

impl Metric {
    /// Distance between two equal-length vectors.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Euclidean => f.write_str("euclidean"),
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Row within the indexed matrix.
    pub row: usize,
    /// Distance from the query.
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        items: Vec<usize>,
    },
    Split {
        normal: Vec<f32>,
        offset: f32,
        left: usize,
        right: usize,
    },
}

/// A built forest plus the vectors it indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnIndex {
    metric: Metric,
    dimension: usize,
    seed: u64,
    vectors: Vec<Vec<f32>>,
    nodes: Vec<Node>,
    roots: Vec<usize>,
}

impl AnnIndex {
    /// Build a forest of `trees` trees.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] for an empty matrix or a row of the
    /// wrong width, and [`Error::Config`] for zero trees.
    pub fn build(vectors: Vec<Vec<f32>>, dimension: usize, trees: usize, seed: u64) -> Result<Self> {
        if trees == 0 {
            return Err(Error::config("An index needs at least one tree"));
        }
        if vectors.is_empty() {
            return Err(Error::invalid_data("Cannot index an empty matrix"));
        }
        if let Some(bad) = vectors.iter().position(|v| v.len() != dimension) {
            return Err(Error::invalid_data(format!(
                "Row {bad} has {} values, expected {dimension}",
                vectors[bad].len()
            )));
        }

        let mut nodes = Vec::new();
        let mut roots = Vec::with_capacity(trees);
        for tree in 0..trees {
            let mut rng = Pcg32::seed_from_u64(tree_seed(seed, tree));
            let items: Vec<usize> = (0..vectors.len()).collect();
            roots.push(grow(&vectors, &mut nodes, &mut rng, items));
        }

        log::debug!(
            "Built {trees} trees over {} items ({} nodes)",
            vectors.len(),
            nodes.len()
        );
        Ok(Self {
            metric: Metric::Euclidean,
            dimension,
            seed,
            vectors,
            nodes,
            roots,
        })
    }

    /// Number of indexed items.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the index holds no items.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Vector width.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Distance metric.
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Number of trees.
    pub fn trees(&self) -> usize {
        self.roots.len()
    }

    /// Build seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Stored vector for a row.
    pub fn vector(&self, row: usize) -> Option<&[f32]> {
        self.vectors.get(row).map(Vec::as_slice)
    }

    /// The `k` nearest rows to a stored row, excluding the row itself.
    ///
    /// Returns fewer than `k` hits when the index has fewer other items.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `row` is out of range.
    pub fn query_row(&self, row: usize, k: usize, search_k: usize) -> Result<Vec<Neighbor>> {
        let query = self
            .vector(row)
            .ok_or_else(|| Error::not_found(format!("Row {row} is not in the index")))?;
        let mut hits = self.search(query, k.saturating_add(1), search_k);
        hits.retain(|n| n.row != row);
        hits.truncate(k);
        Ok(hits)
    }

    /// The `k` nearest rows to an arbitrary vector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the vector width differs from the index.
    pub fn query_vector(&self, query: &[f32], k: usize, search_k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(Error::config(format!(
                "Query has {} dimensions, index has {}",
                query.len(),
                self.dimension
            )));
        }
        Ok(self.search(query, k, search_k))
    }

    fn search(&self, query: &[f32], k: usize, search_k: usize) -> Vec<Neighbor> {
        let n = self.vectors.len();
        if k == 0 || n == 0 {
            return Vec::new();
        }

        let candidates: Vec<usize> = if n <= EXHAUSTIVE_LIMIT || search_k >= n || k >= n {
            (0..n).collect()
        } else {
            self.candidates(query, search_k.max(k))
        };

        let mut hits: Vec<Neighbor> = candidates
            .into_iter()
            .map(|row| Neighbor {
                row,
                distance: self.metric.distance(query, &self.vectors[row]),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.row.cmp(&b.row)));
        hits.truncate(k);
        hits
    }

    fn candidates(&self, query: &[f32], wanted: usize) -> Vec<usize> {
        let mut heap: BinaryHeap<Pending> = self
            .roots
            .iter()
            .map(|&node| Pending {
                priority: f32::INFINITY,
                node,
            })
            .collect();
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        while found.len() < wanted {
            let Some(Pending { priority, node }) = heap.pop() else {
                break;
            };
            match &self.nodes[node] {
                Node::Leaf { items } => {
                    for &item in items {
                        if seen.insert(item) {
                            found.push(item);
                        }
                    }
                }
                Node::Split {
                    normal,
                    offset,
                    left,
                    right,
                } => {
                    let margin = dot(normal, query) - offset;
                    heap.push(Pending {
                        priority: priority.min(margin),
                        node: *right,
                    });
                    heap.push(Pending {
                        priority: priority.min(-margin),
                        node: *left,
                    });
                }
            }
        }
        found
    }

    /// Write the index atomically as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        files::atomic_write_json(path, self)
    }

    /// Load an index and check it against the expected shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the file is missing and
    /// [`Error::Config`] if its dimension or metric differs from what the
    /// caller expects.
    pub fn load(path: &Path, dimension: usize, metric: Metric) -> Result<Self> {
        if !path.exists() {
            return Err(Error::not_found(format!(
                "No index at {}",
                path.display()
            )));
        }
        let index: Self = files::read_json(path)?;
        if index.dimension != dimension {
            return Err(Error::config(format!(
                "Index {} has {} dimensions, expected {dimension}",
                path.display(),
                index.dimension
            )));
        }
        if index.metric != metric {
            return Err(Error::config(format!(
                "Index {} uses the {} metric, expected {metric}",
                path.display(),
                index.metric
            )));
        }
        if index.vectors.iter().any(|v| v.len() != dimension) {
            return Err(Error::invalid_data(format!(
                "Index {} holds vectors of the wrong width",
                path.display()
            )));
        }
        Ok(index)
    }
}

/// Per-tree PCG seed derived from the build seed.
pub fn tree_seed(seed: u64, tree: usize) -> u64 {
    let mut input = [0u8; 16];
    input[..8].copy_from_slice(&seed.to_le_bytes());
    input[8..].copy_from_slice(&(tree as u64).to_le_bytes());
    let hash = blake3::hash(&input);
    let bytes = hash.as_bytes();
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn grow(vectors: &[Vec<f32>], nodes: &mut Vec<Node>, rng: &mut Pcg32, items: Vec<usize>) -> usize {
    if items.len() > LEAF_SIZE
        && let Some((normal, offset, left, right)) = split(vectors, rng, &items)
    {
        let left = grow(vectors, nodes, rng, left);
        let right = grow(vectors, nodes, rng, right);
        nodes.push(Node::Split {
            normal,
            offset,
            left,
            right,
        });
    } else {
        // Degenerate sets (all points identical) stay as one oversized leaf.
        nodes.push(Node::Leaf { items });
    }
    nodes.len() - 1
}

type SplitResult = (Vec<f32>, f32, Vec<usize>, Vec<usize>);

fn split(vectors: &[Vec<f32>], rng: &mut Pcg32, items: &[usize]) -> Option<SplitResult> {
    for _ in 0..SPLIT_ATTEMPTS {
        let a = items[rng.gen_range(0..items.len())];
        let b = items[rng.gen_range(0..items.len())];
        let (va, vb) = (&vectors[a], &vectors[b]);

        let normal: Vec<f32> = va.iter().zip(vb).map(|(x, y)| x - y).collect();
        if normal.iter().all(|v| *v == 0.0) {
            continue;
        }
        let midpoint: Vec<f32> = va.iter().zip(vb).map(|(x, y)| (x + y) / 2.0).collect();
        let offset = dot(&normal, &midpoint);

        let (right, left): (Vec<usize>, Vec<usize>) = items
            .iter()
            .partition(|&&item| dot(&normal, &vectors[item]) > offset);
        if !left.is_empty() && !right.is_empty() {
            return Some((normal, offset, left, right));
        }
    }
    None
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    priority: f32,
    node: usize,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.node.cmp(&self.node))
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

    fn grid(n: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| vec![(i % 40) as f32, (i / 40) as f32, ((i * 7) % 13) as f32])
            .collect()
    }

    fn brute_force(vectors: &[Vec<f32>], row: usize, k: usize) -> Vec<usize> {
        let mut all: Vec<(f32, usize)> = vectors
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != row)
            .map(|(i, v)| (Metric::Euclidean.distance(&vectors[row], v), i))
            .collect();
        all.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        all.into_iter().take(k).map(|(_, i)| i).collect()
    }

    #[test]
    fn test_metric_distance() {
        assert_eq!(Metric::Euclidean.distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(Metric::Euclidean.to_string(), "euclidean");
    }

    #[test]
    fn test_build_validation() {
        assert!(AnnIndex::build(Vec::new(), 2, 3, 0).is_err());
        assert!(AnnIndex::build(vec![vec![1.0]], 2, 3, 0).is_err());
        assert!(AnnIndex::build(vec![vec![1.0]], 1, 0, 0).unwrap_err().is_config());
    }

    #[test]
    fn test_nearest_neighbour_small() {
        let index =
            AnnIndex::build(vec![vec![1.0, 0.0], vec![1.0, 0.01], vec![0.0, 1.0]], 2, 4, 7)
                .unwrap();
        let hits = index.query_row(0, 1, 0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].row, 1);
        assert!(hits[0].distance < 0.02);
    }

    #[test]
    fn test_query_row_excludes_self_and_caps() {
        let index = AnnIndex::build(grid(4), 3, 2, 1).unwrap();
        let hits = index.query_row(2, 10, 0).unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| h.row != 2));
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_query_row_out_of_range() {
        let index = AnnIndex::build(grid(4), 3, 2, 1).unwrap();
        assert!(index.query_row(4, 1, 0).unwrap_err().is_not_found());
    }

    #[test]
    fn test_query_vector_dimension_mismatch() {
        let index = AnnIndex::build(grid(4), 3, 2, 1).unwrap();
        assert!(index.query_vector(&[0.0], 1, 0).unwrap_err().is_config());
        assert_eq!(index.query_vector(&[0.0, 0.0, 0.0], 1, 0).unwrap()[0].row, 0);
    }

    #[test]
    fn test_forest_search_finds_true_neighbours() {
        let vectors = grid(1200);
        let index = AnnIndex::build(vectors.clone(), 3, 10, 42).unwrap();
        assert!(index.len() > EXHAUSTIVE_LIMIT);

        let mut exact = 0;
        let queries = [0usize, 17, 333, 640, 1199];
        for &row in &queries {
            let hits = index.query_row(row, 5, 5 * 10 * 4).unwrap();
            assert_eq!(hits.len(), 5);
            let truth = brute_force(&vectors, row, 1)[0];
            let best = Metric::Euclidean.distance(&vectors[row], &vectors[truth]);
            if (hits[0].distance - best).abs() < 1e-6 {
                exact += 1;
            }
        }
        assert!(exact >= 4, "only {exact} of {} nearest neighbours found", queries.len());
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = AnnIndex::build(grid(800), 3, 5, 99).unwrap();
        let b = AnnIndex::build(grid(800), 3, 5, 99).unwrap();
        let c = AnnIndex::build(grid(800), 3, 5, 100).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(tree_seed(1, 0), tree_seed(1, 1));
    }

    #[test]
    fn test_identical_points_form_a_leaf() {
        let vectors = vec![vec![1.0, 1.0]; 40];
        let index = AnnIndex::build(vectors, 2, 2, 0).unwrap();
        assert_eq!(index.trees(), 2);
        assert_eq!(index.query_row(0, 3, 0).unwrap().len(), 3);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audio.index.json");
        let index = AnnIndex::build(grid(50), 3, 3, 5).unwrap();
        index.save(&path).unwrap();

        let loaded = AnnIndex::load(&path, 3, Metric::Euclidean).unwrap();
        assert_eq!(loaded, index);
        assert!(AnnIndex::load(&path, 4, Metric::Euclidean).unwrap_err().is_config());
        assert!(
            AnnIndex::load(&dir.path().join("missing.json"), 3, Metric::Euclidean)
                .unwrap_err()
                .is_not_found()
        );
    }
}
