//! Configuration for the Sonara CLI.
//!
//! [`SonaraConfig`] loads from TOML files, environment variables, and
//! defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit `--config <path>` flag
//! 2. `SONARA_CONFIG` environment variable
//! 3. XDG default: `~/.config/sonara/config.toml`
//! 4. Built-in defaults
//!
//! `SONARA_<SECTION>_<KEY>` variables override individual values.

use confyg::{Confygery, env};
use serde::{Deserialize, Serialize};
use sonara_core::traits::ConfigProvider;
use sonara_core::{Error, ItemCollection, LoadOptions, Result};
use sonara_vector::{IndexOptions, SpaceName};
use std::path::PathBuf;

// ============================================================================
// Configuration structs
// ============================================================================

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SonaraConfig {
    /// Project name, used for default paths.
    pub project_name: String,

    /// Base path for all project data.
    pub base_path: Option<String>,

    /// Source collection.
    pub source: SourceConfig,

    /// Feature extraction.
    pub extract: ExtractConfig,

    /// Index building.
    pub index: IndexConfig,

    /// Recommendation queries.
    pub recommend: RecommendConfig,
}

/// Source collection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// CSV file; defaults to `songs.csv` under the base path.
    pub path: Option<String>,

    /// Identifier column.
    pub id_column: String,

    /// Column holding each item's image path.
    pub image_column: String,

    /// Base directory for relative image paths; defaults to the CSV's directory.
    pub image_root: Option<String>,

    /// Numeric columns forming the audio source.
    pub audio_columns: Vec<String>,

    /// Columns shown alongside recommendations.
    pub display_columns: Vec<String>,

    /// Rows with an empty or `no` value in any of these columns are dropped.
    pub filter_columns: Vec<String>,
}

/// Extraction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Method used when `--method` is not given.
    pub method: String,

    /// Deep model used when `--model` is not given.
    pub default_model: String,

    /// Checkpoint directory; defaults to `checkpoints` under the base path.
    pub checkpoint_dir: Option<String>,

    /// Rows per checkpointed batch.
    pub interval: usize,

    /// Worker threads; defaults to available parallelism minus one.
    pub workers: Option<usize>,

    /// Status projection CSV, if one should be written.
    pub status_path: Option<String>,

    /// Model download cache; defaults to `models` under the base path.
    pub model_cache_dir: Option<String>,
}

/// Index configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Index directory; defaults to `indices` under the base path.
    pub dir: Option<String>,

    /// Trees per index.
    pub trees: usize,

    /// Build seed.
    pub seed: u64,

    /// Candidate multiplier for searches.
    pub search_multiplier: usize,

    /// Spaces built by `sonara index` and queried by `sonara recommend`.
    pub spaces: Vec<String>,
}

/// Recommendation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendConfig {
    /// Neighbours per space.
    pub k: usize,
}

// ============================================================================
// Default implementations
// ============================================================================

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Default for SonaraConfig {
    fn default() -> Self {
        Self {
            project_name: "sonara".to_string(),
            base_path: None,
            source: SourceConfig::default(),
            extract: ExtractConfig::default(),
            index: IndexConfig::default(),
            recommend: RecommendConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: None,
            id_column: "id".to_string(),
            image_column: "image_path".to_string(),
            image_root: None,
            audio_columns: strings(&[
                "danceability",
                "energy",
                "loudness",
                "speechiness",
                "acousticness",
                "instrumentalness",
                "liveness",
                "valence",
            ]),
            display_columns: strings(&["name", "artist", "img", "preview"]),
            filter_columns: Vec::new(),
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            method: "basic".to_string(),
            default_model: "clip-vit-b32".to_string(),
            checkpoint_dir: None,
            interval: sonara_pipeline::DEFAULT_CHECKPOINT_INTERVAL,
            workers: None,
            status_path: None,
            model_cache_dir: None,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        let defaults = IndexOptions::default();
        Self {
            dir: None,
            trees: defaults.trees,
            seed: defaults.seed,
            search_multiplier: defaults.search_multiplier,
            spaces: strings(&["audio", "basic-image", "audio+basic-image"]),
        }
    }
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self { k: 10 }
    }
}

// ============================================================================
// Config loading
// ============================================================================

impl SonaraConfig {
    /// Load configuration from file, environment, and defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path)
            && path.exists()
        {
            builder
                .add_file(&path.to_string_lossy())
                .map_err(|e| Error::config(format!("config file: {e}")))?;
        }

        let mut env_opts = env::Options::with_top_level("SONARA");
        env_opts.add_section("source");
        env_opts.add_section("extract");
        env_opts.add_section("index");
        env_opts.add_section("recommend");
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        let config: Self = builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))?;

        Ok(config)
    }

    /// Resolve the config file path from explicit flag, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("SONARA_CONFIG") {
            return Some(PathBuf::from(path));
        }
        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("sonara").join("config.toml"))
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Load the source collection with the configured identifier and filters.
    pub fn load_collection(&self) -> Result<ItemCollection> {
        let options = self
            .source
            .filter_columns
            .iter()
            .fold(LoadOptions::new(&self.source.id_column), |opts, c| {
                opts.require_present(c)
            });
        let path = self.source_path()?;
        let collection = ItemCollection::from_csv_path(&path, &options)?;
        log::info!("Loaded {} items from {}", collection.len(), path.display());
        Ok(collection)
    }

    /// Directory that relative image paths are resolved against.
    pub fn image_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.source.image_root {
            return Ok(PathBuf::from(root));
        }
        let source = self.source_path()?;
        Ok(source
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Configured spaces, parsed.
    pub fn spaces(&self) -> Result<Vec<SpaceName>> {
        parse_spaces(&self.index.spaces)
    }

    /// Index build parameters.
    pub fn index_options(&self) -> IndexOptions {
        IndexOptions::default()
            .with_trees(self.index.trees)
            .with_seed(self.index.seed)
            .with_search_multiplier(self.index.search_multiplier)
    }
}

/// Parse space names, rejecting unknown ones.
pub fn parse_spaces<S: AsRef<str>>(names: &[S]) -> Result<Vec<SpaceName>> {
    let mut spaces = Vec::with_capacity(names.len());
    for name in names {
        let space: SpaceName = name.as_ref().parse()?;
        if !spaces.contains(&space) {
            spaces.push(space);
        }
    }
    Ok(spaces)
}

// ============================================================================
// ConfigProvider implementation
// ============================================================================

impl ConfigProvider for SonaraConfig {
    fn project_name(&self) -> &str {
        &self.project_name
    }

    fn base_path(&self) -> Result<PathBuf> {
        match &self.base_path {
            Some(p) => Ok(PathBuf::from(p)),
            None => std::env::current_dir()
                .map_err(|e| Error::config(format!("Could not determine base path: {e}"))),
        }
    }

    fn source_path(&self) -> Result<PathBuf> {
        match &self.source.path {
            Some(p) => Ok(PathBuf::from(p)),
            None => Ok(self.base_path()?.join("songs.csv")),
        }
    }

    fn artifact_dir(&self, kind: &str) -> Result<PathBuf> {
        let configured = match kind {
            "checkpoints" => &self.extract.checkpoint_dir,
            "indices" => &self.index.dir,
            "models" => &self.extract.model_cache_dir,
            other => return Err(Error::config(format!("Unknown artifact kind: '{other}'"))),
        };
        match configured {
            Some(p) => Ok(PathBuf::from(p)),
            None => Ok(self.base_path()?.join(kind)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
