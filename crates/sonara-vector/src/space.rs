//! Feature spaces and their registry.
//!
//! A raw numeric source (audio attributes, colour statistics, deep
//! embeddings) is loaded into a [`SourceMatrix`] keyed by collection row.
//! The [`FeatureSpaceRegistry`] standardises each source once, over the rows
//! where that source is present, and builds named [`FeatureSpace`]s by
//! concatenating standardised sources. Two spaces that share a source share
//! its scaler fit.
//!
//! Space names form a closed set ([`SpaceName`]); each declares its ordered
//! list of sources, so an unknown combination cannot be requested.

use serde::{Deserialize, Serialize};
use sonara_core::{Error, FeatureVector, ItemCollection, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Names
// ============================================================================

/// A raw numeric source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Tabular audio attributes.
    Audio,
    /// Colour statistics of the cover image.
    BasicImage,
    /// Deep image embeddings.
    Deep,
}

impl SourceKind {
    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::BasicImage => "basic-image",
            Self::Deep => "deep",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The supported feature spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpaceName {
    /// Audio attributes only.
    #[serde(rename = "audio")]
    Audio,
    /// Colour statistics only.
    #[serde(rename = "basic-image")]
    BasicImage,
    /// Deep embeddings only.
    #[serde(rename = "deep")]
    Deep,
    /// Audio followed by colour statistics.
    #[serde(rename = "audio+basic-image")]
    AudioBasicImage,
    /// Audio followed by deep embeddings.
    #[serde(rename = "audio+deep")]
    AudioDeep,
    /// Colour statistics followed by deep embeddings.
    #[serde(rename = "basic-image+deep")]
    BasicImageDeep,
    /// All three sources.
    #[serde(rename = "audio+basic-image+deep")]
    All,
}

impl SpaceName {
    /// Every supported space.
    pub const ALL: [SpaceName; 7] = [
        Self::Audio,
        Self::BasicImage,
        Self::Deep,
        Self::AudioBasicImage,
        Self::AudioDeep,
        Self::BasicImageDeep,
        Self::All,
    ];

    /// Constituent sources, in concatenation order.
    pub fn sources(&self) -> &'static [SourceKind] {
        use SourceKind::{Audio, BasicImage, Deep};
        match self {
            Self::Audio => &[Audio],
            Self::BasicImage => &[BasicImage],
            Self::Deep => &[Deep],
            Self::AudioBasicImage => &[Audio, BasicImage],
            Self::AudioDeep => &[Audio, Deep],
            Self::BasicImageDeep => &[BasicImage, Deep],
            Self::All => &[Audio, BasicImage, Deep],
        }
    }

    /// Canonical name, also used for index file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::BasicImage => "basic-image",
            Self::Deep => "deep",
            Self::AudioBasicImage => "audio+basic-image",
            Self::AudioDeep => "audio+deep",
            Self::BasicImageDeep => "basic-image+deep",
            Self::All => "audio+basic-image+deep",
        }
    }

    /// Name safe for use in file names.
    pub fn file_stem(&self) -> String {
        self.as_str().replace('+', "_")
    }
}

impl fmt::Display for SpaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpaceName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|space| space.as_str() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(SpaceName::as_str).collect();
                Error::config(format!(
                    "Unknown feature space: '{s}'. Supported: {}",
                    names.join(", ")
                ))
            })
    }
}

// ============================================================================
// Raw sources
// ============================================================================

/// One present row of a source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// Item identifier.
    pub id: String,
    /// Raw values.
    pub values: Vec<f32>,
}

/// Raw values of one source, keyed by collection row position.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMatrix {
    kind: SourceKind,
    dimension: usize,
    rows: BTreeMap<usize, SourceRow>,
}

impl SourceMatrix {
    /// An empty source of the given width.
    pub fn new(kind: SourceKind, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::config(format!("Source '{kind}' has no columns")));
        }
        Ok(Self {
            kind,
            dimension,
            rows: BTreeMap::new(),
        })
    }

    /// Add the values of one row.
    pub fn insert(&mut self, row: usize, id: impl Into<String>, values: Vec<f32>) -> Result<()> {
        if values.len() != self.dimension {
            return Err(Error::invalid_data(format!(
                "Source '{}' row {row} has {} values, expected {}",
                self.kind,
                values.len(),
                self.dimension
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::invalid_data(format!(
                "Source '{}' row {row} has non-finite values",
                self.kind
            )));
        }
        self.rows.insert(
            row,
            SourceRow {
                id: id.into(),
                values,
            },
        );
        Ok(())
    }

    /// Build a source from numeric collection columns.
    ///
    /// Rows where any column is missing or not a number are absent from the
    /// source.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a column does not exist.
    pub fn from_columns<S: AsRef<str>>(
        kind: SourceKind,
        collection: &ItemCollection,
        columns: &[S],
    ) -> Result<Self> {
        collection.require_columns(columns)?;
        let mut matrix = Self::new(kind, columns.len())?;
        let mut skipped = 0usize;

        for (row, id) in collection.ids() {
            let values: Option<Vec<f32>> = columns
                .iter()
                .map(|c| collection.numeric(row, c.as_ref()))
                .collect();
            match values {
                Some(values) => matrix.insert(row, id, values)?,
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            log::info!("Source '{kind}': {skipped} rows lack numeric values and are excluded");
        }
        Ok(matrix)
    }

    /// Build a source from extracted vectors keyed by identifier.
    ///
    /// Row positions are resolved through the collection, so vectors
    /// extracted against an older snapshot still land on the right rows.
    /// Identifiers the collection no longer contains are skipped.
    pub fn from_vectors<'v, I>(kind: SourceKind, collection: &ItemCollection, vectors: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'v str, &'v FeatureVector)>,
    {
        let mut rows = Vec::new();
        let mut unknown = 0usize;
        for (id, vector) in vectors {
            match collection.position(id) {
                Some(row) => rows.push((row, id, vector)),
                None => unknown += 1,
            }
        }
        if unknown > 0 {
            log::warn!("Source '{kind}': {unknown} identifiers are not in the collection");
        }

        let dimension = rows
            .first()
            .map(|(_, _, v)| v.dimension())
            .ok_or_else(|| Error::not_found(format!("Source '{kind}' has no extracted vectors")))?;

        let mut matrix = Self::new(kind, dimension)?;
        for (row, id, vector) in rows {
            matrix.insert(row, id, vector.as_slice().to_vec())?;
        }
        Ok(matrix)
    }

    /// Source kind.
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Number of columns.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of present rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows are present.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Present rows in row order.
    pub fn rows(&self) -> impl Iterator<Item = (usize, &SourceRow)> {
        self.rows.iter().map(|(row, r)| (*row, r))
    }
}

// ============================================================================
// Standardisation
// ============================================================================

/// Variance below this is treated as zero.
const MIN_STD: f64 = 1e-12;

/// Column-wise standardisation fit (zero mean, unit population variance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl Scaler {
    /// Fit on rows of equal width.
    pub fn fit<'r, I>(rows: I, dimension: usize) -> Self
    where
        I: IntoIterator<Item = &'r [f32]>,
    {
        let mut sum = vec![0.0f64; dimension];
        let mut sum_sq = vec![0.0f64; dimension];
        let mut n = 0usize;

        for row in rows {
            for (i, v) in row.iter().take(dimension).enumerate() {
                let v = f64::from(*v);
                sum[i] += v;
                sum_sq[i] += v * v;
            }
            n += 1;
        }

        if n == 0 {
            return Self {
                mean: vec![0.0; dimension],
                std: vec![0.0; dimension],
            };
        }

        let n = n as f64;
        let mean: Vec<f64> = sum.iter().map(|s| s / n).collect();
        let std = sum_sq
            .iter()
            .zip(&mean)
            .map(|(sq, m)| (sq / n - m * m).max(0.0).sqrt())
            .collect();
        Self { mean, std }
    }

    /// Standardise one row; zero-variance columns become exactly 0.
    pub fn transform(&self, row: &[f32]) -> Vec<f32> {
        row.iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(v, (mean, std))| {
                if *std < MIN_STD {
                    0.0
                } else {
                    ((f64::from(*v) - mean) / std) as f32
                }
            })
            .collect()
    }

    /// Fitted column means.
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Fitted column standard deviations.
    pub fn std(&self) -> &[f64] {
        &self.std
    }
}

// ============================================================================
// Spaces
// ============================================================================

/// A named, standardised matrix ready for indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSpace {
    name: SpaceName,
    dimension: usize,
    ids: Vec<String>,
    rows: Vec<usize>,
    matrix: Vec<Vec<f32>>,
    positions: HashMap<String, usize>,
}

impl FeatureSpace {
    /// Assemble a space from parallel identifier, row and vector lists.
    pub fn new(
        name: SpaceName,
        dimension: usize,
        ids: Vec<String>,
        rows: Vec<usize>,
        matrix: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if ids.len() != matrix.len() || rows.len() != matrix.len() {
            return Err(Error::invalid_data(format!(
                "Space '{name}' has mismatched ids/rows/matrix lengths"
            )));
        }
        if let Some(bad) = matrix.iter().position(|v| v.len() != dimension) {
            return Err(Error::invalid_data(format!(
                "Space '{name}' row {bad} has the wrong width"
            )));
        }
        let positions = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        Ok(Self {
            name,
            dimension,
            ids,
            rows,
            matrix,
            positions,
        })
    }

    /// Space name.
    pub fn name(&self) -> SpaceName {
        self.name
    }

    /// Width of every vector.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.matrix.len()
    }

    /// Whether the space has no items.
    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }

    /// Item identifiers, in space row order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Collection row of each space row.
    pub fn collection_rows(&self) -> &[usize] {
        &self.rows
    }

    /// Standardised vectors, in space row order.
    pub fn matrix(&self) -> &[Vec<f32>] {
        &self.matrix
    }

    /// Space row of an identifier.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// Vector at a space row.
    pub fn vector(&self, row: usize) -> Option<&[f32]> {
        self.matrix.get(row).map(Vec::as_slice)
    }

    /// BLAKE3 hash over the name, identifiers, and values.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.name.as_str().as_bytes());
        hasher.update(&(self.dimension as u64).to_le_bytes());
        for (id, vector) in self.ids.iter().zip(&self.matrix) {
            hasher.update(id.as_bytes());
            hasher.update(&[0]);
            for v in vector {
                hasher.update(&v.to_le_bytes());
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

#[derive(Debug, Clone)]
struct StandardizedSource {
    dimension: usize,
    scaler: Scaler,
    rows: BTreeMap<usize, SourceRow>,
}

/// Standardised sources and the spaces built from them.
#[derive(Debug, Clone, Default)]
pub struct FeatureSpaceRegistry {
    sources: HashMap<SourceKind, StandardizedSource>,
    spaces: BTreeMap<SpaceName, FeatureSpace>,
}

impl FeatureSpaceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit and store a source.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the source kind was already added,
    /// since refitting would desynchronise spaces built on the old fit.
    pub fn add_source(&mut self, source: SourceMatrix) -> Result<()> {
        let kind = source.kind;
        if self.sources.contains_key(&kind) {
            return Err(Error::config(format!("Source '{kind}' is already registered")));
        }

        let scaler = Scaler::fit(source.rows.values().map(|r| r.values.as_slice()), source.dimension);
        let rows = source
            .rows
            .into_iter()
            .map(|(row, r)| {
                let values = scaler.transform(&r.values);
                (row, SourceRow { id: r.id, values })
            })
            .collect();

        log::debug!("Registered source '{kind}' ({} columns)", source.dimension);
        self.sources.insert(
            kind,
            StandardizedSource {
                dimension: source.dimension,
                scaler,
                rows,
            },
        );
        Ok(())
    }

    /// Whether a source has been added.
    pub fn has_source(&self, kind: SourceKind) -> bool {
        self.sources.contains_key(&kind)
    }

    /// The scaler fitted for a source.
    pub fn scaler(&self, kind: SourceKind) -> Option<&Scaler> {
        self.sources.get(&kind).map(|s| &s.scaler)
    }

    /// Build (or rebuild) a named space from its registered sources.
    ///
    /// The space holds the items present in every constituent source, in
    /// collection row order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if a constituent source was not added, and
    /// [`Error::InvalidData`] if no item is present in all of them.
    pub fn register(&mut self, name: SpaceName) -> Result<&FeatureSpace> {
        let parts = name
            .sources()
            .iter()
            .map(|kind| {
                self.sources.get(kind).ok_or_else(|| {
                    Error::not_found(format!("Space '{name}' needs source '{kind}'"))
                })
            })
            .collect::<Result<Vec<&StandardizedSource>>>()?;

        let dimension: usize = parts.iter().map(|p| p.dimension).sum();
        let (first, rest) = parts
            .split_first()
            .ok_or_else(|| Error::config(format!("Space '{name}' has no sources")))?;

        let mut ids = Vec::new();
        let mut rows = Vec::new();
        let mut matrix = Vec::new();

        for (row, head) in &first.rows {
            let tails: Option<Vec<&SourceRow>> = rest.iter().map(|p| p.rows.get(row)).collect();
            let Some(tails) = tails else {
                continue;
            };
            let mut values = Vec::with_capacity(dimension);
            values.extend_from_slice(&head.values);
            for tail in tails {
                values.extend_from_slice(&tail.values);
            }
            ids.push(head.id.clone());
            rows.push(*row);
            matrix.push(values);
        }

        if matrix.is_empty() {
            return Err(Error::invalid_data(format!(
                "Space '{name}' has no items present in all of its sources"
            )));
        }

        let space = FeatureSpace::new(name, dimension, ids, rows, matrix)?;
        log::info!(
            "Feature space '{name}': {} items x {} dims",
            space.len(),
            space.dimension()
        );
        self.spaces.insert(name, space);
        self.spaces
            .get(&name)
            .ok_or_else(|| Error::operation(format!("Space '{name}' vanished after insert")))
    }

    /// A registered space.
    pub fn space(&self, name: SpaceName) -> Option<&FeatureSpace> {
        self.spaces.get(&name)
    }

    /// Names of registered spaces.
    pub fn space_names(&self) -> impl Iterator<Item = SpaceName> + '_ {
        self.spaces.keys().copied()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sonara_core::LoadOptions;

    fn collection() -> ItemCollection {
        let csv = "\
id,energy,valence
a,0.1,0.5
b,0.4,0.5
c,0.7,0.5
d,,0.5
";
        ItemCollection::from_reader(csv.as_bytes(), &LoadOptions::default()).unwrap()
    }

    fn column(space: &FeatureSpace, c: usize) -> Vec<f32> {
        space.matrix().iter().map(|r| r[c]).collect()
    }

    #[test]
    fn test_space_name_parsing() {
        assert_eq!("audio".parse::<SpaceName>().unwrap(), SpaceName::Audio);
        assert_eq!("basic_image".parse::<SpaceName>().unwrap(), SpaceName::BasicImage);
        assert_eq!(
            "audio+basic-image+deep".parse::<SpaceName>().unwrap(),
            SpaceName::All
        );
        assert!("lyrics".parse::<SpaceName>().unwrap_err().is_config());
        assert_eq!(SpaceName::AudioDeep.file_stem(), "audio_deep");
        assert_eq!(
            SpaceName::BasicImageDeep.sources(),
            &[SourceKind::BasicImage, SourceKind::Deep]
        );
    }

    #[test]
    fn test_from_columns_skips_missing_values() {
        let source =
            SourceMatrix::from_columns(SourceKind::Audio, &collection(), &["energy", "valence"])
                .unwrap();
        assert_eq!(source.len(), 3);
        assert_eq!(source.dimension(), 2);
        assert!(source.rows().all(|(row, _)| row != 3));
    }

    #[test]
    fn test_from_columns_missing_column() {
        let err = SourceMatrix::from_columns(SourceKind::Audio, &collection(), &["tempo"])
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_from_vectors_resolves_by_id() {
        let items = collection();
        let v = FeatureVector::new(vec![1.0, 2.0]).unwrap();
        let w = FeatureVector::new(vec![3.0, 4.0]).unwrap();
        let source = SourceMatrix::from_vectors(
            SourceKind::Deep,
            &items,
            [("c", &v), ("zz", &w), ("a", &w)],
        )
        .unwrap();

        let rows: Vec<(usize, &str)> = source.rows().map(|(r, s)| (r, s.id.as_str())).collect();
        assert_eq!(rows, vec![(0, "a"), (2, "c")]);
    }

    #[test]
    fn test_from_vectors_empty_is_not_found() {
        let empty: Vec<(&str, &FeatureVector)> = Vec::new();
        let err = SourceMatrix::from_vectors(SourceKind::Deep, &collection(), empty).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_insert_validates_width() {
        let mut m = SourceMatrix::new(SourceKind::Audio, 2).unwrap();
        assert!(m.insert(0, "a", vec![1.0]).is_err());
        assert!(m.insert(0, "a", vec![1.0, f32::NAN]).is_err());
        assert!(SourceMatrix::new(SourceKind::Audio, 0).is_err());
    }

    #[test]
    fn test_single_source_is_standardised() {
        let mut registry = FeatureSpaceRegistry::new();
        registry
            .add_source(
                SourceMatrix::from_columns(SourceKind::Audio, &collection(), &["energy", "valence"])
                    .unwrap(),
            )
            .unwrap();
        let space = registry.register(SpaceName::Audio).unwrap();

        let energy = column(space, 0);
        let mean: f32 = energy.iter().sum::<f32>() / 3.0;
        let var: f32 = energy.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 3.0;
        assert!(mean.abs() < 1e-5);
        assert!((var.sqrt() - 1.0).abs() < 1e-4);

        // valence is constant
        assert!(column(space, 1).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_combined_space_intersects_and_shares_fit() {
        let items = collection();
        let mut registry = FeatureSpaceRegistry::new();
        registry
            .add_source(SourceMatrix::from_columns(SourceKind::Audio, &items, &["energy"]).unwrap())
            .unwrap();

        let mut image = SourceMatrix::new(SourceKind::BasicImage, 1).unwrap();
        image.insert(1, "b", vec![10.0]).unwrap();
        image.insert(2, "c", vec![20.0]).unwrap();
        image.insert(3, "d", vec![30.0]).unwrap();
        registry.add_source(image).unwrap();

        let audio = registry.register(SpaceName::Audio).unwrap().clone();
        let combined = registry.register(SpaceName::AudioBasicImage).unwrap();

        assert_eq!(combined.ids(), &["b".to_string(), "c".to_string()]);
        assert_eq!(combined.collection_rows(), &[1, 2]);
        assert_eq!(combined.dimension(), 2);
        // Same audio fit in both spaces.
        assert_eq!(combined.vector(0).unwrap()[0], audio.vector(1).unwrap()[0]);
        assert!(combined.position("a").is_none());
    }

    #[test]
    fn test_register_needs_sources() {
        let mut registry = FeatureSpaceRegistry::new();
        let err = registry.register(SpaceName::Deep).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_duplicate_source_rejected() {
        let items = collection();
        let mut registry = FeatureSpaceRegistry::new();
        let source = SourceMatrix::from_columns(SourceKind::Audio, &items, &["energy"]).unwrap();
        registry.add_source(source.clone()).unwrap();
        assert!(registry.add_source(source).unwrap_err().is_config());
    }

    #[test]
    fn test_content_hash_changes_with_values() {
        let a = FeatureSpace::new(
            SpaceName::Audio,
            1,
            vec!["x".into()],
            vec![0],
            vec![vec![1.0]],
        )
        .unwrap();
        let b = FeatureSpace::new(
            SpaceName::Audio,
            1,
            vec!["x".into()],
            vec![0],
            vec![vec![1.5]],
        )
        .unwrap();
        assert_eq!(a.content_hash(), a.clone().content_hash());
        assert_ne!(a.content_hash(), b.content_hash());
    }

    proptest! {
        #[test]
        fn prop_standardised_columns_have_zero_mean_unit_std(
            rows in proptest::collection::vec(
                proptest::collection::vec(-100.0f32..100.0, 3),
                2..40,
            )
        ) {
            let mut source = SourceMatrix::new(SourceKind::Audio, 3).unwrap();
            for (i, r) in rows.iter().enumerate() {
                source.insert(i, format!("id-{i}"), r.clone()).unwrap();
            }
            let mut registry = FeatureSpaceRegistry::new();
            registry.add_source(source).unwrap();
            let scaler = registry.scaler(SourceKind::Audio).unwrap().clone();
            let space = registry.register(SpaceName::Audio).unwrap();
            let n = space.len() as f64;

            for c in 0..3 {
                let col: Vec<f64> = space.matrix().iter().map(|r| f64::from(r[c])).collect();
                if scaler.std()[c] < MIN_STD {
                    prop_assert!(col.iter().all(|v| *v == 0.0));
                    continue;
                }
                let mean = col.iter().sum::<f64>() / n;
                let std = (col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
                prop_assert!(mean.abs() < 1e-3, "mean {mean}");
                // Near-constant columns lose precision in f32.
                if scaler.std()[c] > 1e-3 {
                    prop_assert!((std - 1.0).abs() < 1e-3, "std {std}");
                }
            }
        }
    }
}
