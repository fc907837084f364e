//! Tabular item collections.
//!
//! An [`ItemCollection`] is an in-memory snapshot of the source catalogue:
//! one CSV row per item, a stable string identifier per row, and a
//! contiguous 0-based row position assigned at load time.
//!
//! Row positions are only meaningful within one snapshot. Loading the same
//! file with a different filter reassigns them, which is why checkpoints and
//! indices persist identifiers alongside positions.

use csv::StringRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Values treated as "missing" by presence filters.
const MISSING_MARKERS: &[&str] = &["", "no"];

/// Options controlling how a collection is loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Column holding the stable item identifier.
    pub id_column: String,

    /// Rows whose value in any of these columns is empty or `no` are dropped.
    #[serde(default)]
    pub require_present: Vec<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            id_column: "id".to_string(),
            require_present: Vec::new(),
        }
    }
}

impl LoadOptions {
    /// Create options with the given identifier column.
    pub fn new(id_column: impl Into<String>) -> Self {
        Self {
            id_column: id_column.into(),
            require_present: Vec::new(),
        }
    }

    /// Drop rows where `column` is empty or `no`.
    pub fn require_present(mut self, column: impl Into<String>) -> Self {
        self.require_present.push(column.into());
        self
    }
}

/// A snapshot of the source catalogue.
#[derive(Debug, Clone)]
pub struct ItemCollection {
    headers: Vec<String>,
    columns: HashMap<String, usize>,
    id_index: usize,
    records: Vec<StringRecord>,
    positions: HashMap<String, usize>,
    source: Option<PathBuf>,
}

impl ItemCollection {
    /// Load a collection from a CSV file.
    pub fn from_csv_path(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| Error::io_with_path(e, path))?;
        let mut collection = Self::from_reader(file, options)?;
        collection.source = Some(path.to_path_buf());
        log::debug!(
            "Loaded {} items from {}",
            collection.len(),
            path.display()
        );
        Ok(collection)
    }

    /// Load a collection from any CSV reader.
    pub fn from_reader<R: Read>(reader: R, options: &LoadOptions) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().from_reader(reader);
        let headers: Vec<String> = csv_reader.headers()?.iter().map(String::from).collect();
        let columns: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();

        let id_index = *columns.get(&options.id_column).ok_or_else(|| {
            Error::config(format!(
                "Identifier column '{}' not found in source",
                options.id_column
            ))
        })?;

        let filter_indices = options
            .require_present
            .iter()
            .map(|name| {
                columns
                    .get(name)
                    .copied()
                    .ok_or_else(|| Error::config(format!("Filter column '{name}' not found")))
            })
            .collect::<Result<Vec<usize>>>()?;

        let mut records = Vec::new();
        let mut positions = HashMap::new();
        let mut dropped = 0usize;

        for record in csv_reader.records() {
            let record = record?;
            let keep = filter_indices.iter().all(|&i| {
                record
                    .get(i)
                    .is_some_and(|v| !MISSING_MARKERS.contains(&v.trim()))
            });
            if !keep {
                dropped += 1;
                continue;
            }

            let id = record.get(id_index).unwrap_or_default().trim().to_string();
            if id.is_empty() {
                return Err(Error::invalid_data(format!(
                    "Empty identifier in source row {}",
                    records.len() + dropped
                )));
            }
            if positions.insert(id.clone(), records.len()).is_some() {
                return Err(Error::invalid_data(format!("Duplicate identifier '{id}'")));
            }
            records.push(record);
        }

        if dropped > 0 {
            log::info!("Filtered out {dropped} rows with missing required values");
        }

        Ok(Self {
            headers,
            columns,
            id_index,
            records,
            positions,
            source: None,
        })
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the collection has no items.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Column names in source order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Path the collection was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Whether the named column exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Fail with a configuration error unless every column exists.
    pub fn require_columns<S: AsRef<str>>(&self, columns: &[S]) -> Result<()> {
        let missing: Vec<&str> = columns
            .iter()
            .map(AsRef::as_ref)
            .filter(|c| !self.has_column(c))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::config(format!(
                "Missing required source column(s): {}",
                missing.join(", ")
            )))
        }
    }

    /// Identifier at a row position.
    pub fn id(&self, row: usize) -> Option<&str> {
        self.records
            .get(row)
            .and_then(|r| r.get(self.id_index))
            .map(str::trim)
    }

    /// Row position of an identifier.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// Iterate over `(row, id)` pairs in row order.
    pub fn ids(&self) -> impl Iterator<Item = (usize, &str)> {
        (0..self.len()).filter_map(move |row| self.id(row).map(|id| (row, id)))
    }

    /// Raw field value at `(row, column)`.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let index = *self.columns.get(column)?;
        self.records.get(row)?.get(index)
    }

    /// Numeric field value; `None` when missing or unparsable.
    pub fn numeric(&self, row: usize, column: &str) -> Option<f32> {
        self.value(row, column)
            .and_then(|v| v.trim().parse::<f32>().ok())
            .filter(|v| v.is_finite())
    }

    /// Collect the named columns of a row into a display map.
    ///
    /// Columns that do not exist are skipped.
    pub fn metadata<S: AsRef<str>>(&self, row: usize, columns: &[S]) -> BTreeMap<String, String> {
        columns
            .iter()
            .filter_map(|c| {
                let c = c.as_ref();
                self.value(row, c).map(|v| (c.to_string(), v.to_string()))
            })
            .collect()
    }

    /// The raw CSV record for a row.
    pub fn record(&self, row: usize) -> Option<&StringRecord> {
        self.records.get(row)
    }
}
