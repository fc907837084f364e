//! Handlers for `extract`, `index`, and `recommend`.
//!
//! Each handler is synchronous and returns data; the app layer runs them on
//! the blocking pool and renders the result.

use crate::cli::{ExtractArgs, IndexArgs, RecommendArgs};
use crate::config::{SonaraConfig, parse_spaces};
use sonara_core::traits::ConfigProvider;
use sonara_core::{Error, ItemCollection, Result};
use sonara_extract::{BASIC_MODEL_NAME, DeepModel, ExtractionMethod, ExtractorSpec};
use sonara_pipeline::{ExtractionConfig, ExtractionOrchestrator, ExtractionReport};
use sonara_pipeline_state::{CheckpointIdentity, CheckpointRecord};
use sonara_vector::{
    FeatureSpaceRegistry, IndexManager, RecommendationService, RecommendationSet, SourceKind,
    SourceMatrix, SpaceName,
};
use std::collections::BTreeSet;
use std::path::PathBuf;

// ============================================================================
// extract
// ============================================================================

/// Run (or resume) feature extraction.
pub fn run_extract(config: &SonaraConfig, args: &ExtractArgs) -> Result<ExtractionReport> {
    let method = args.method.as_deref().unwrap_or(&config.extract.method);
    let spec = ExtractorSpec::from_names(method, args.model.as_deref(), &config.extract.default_model)?
        .with_cache_dir(config.artifact_dir("models")?);

    let mut extraction = ExtractionConfig::new(config.artifact_dir("checkpoints")?)
        .with_id_column(&config.source.id_column)
        .with_image_column(&config.source.image_column)
        .with_image_root(config.image_root()?)
        .with_interval(args.interval.unwrap_or(config.extract.interval));
    if let Some(workers) = args.workers.or(config.extract.workers) {
        extraction = extraction.with_workers(workers);
    }
    if let Some(batches) = args.max_batches {
        extraction = extraction.with_max_batches(batches);
    }
    if let Some(status) = &config.extract.status_path {
        extraction = extraction.with_status_path(status);
    }

    let collection = config.load_collection()?;
    ExtractionOrchestrator::new(&collection, &spec, extraction)?.run()
}

// ============================================================================
// index
// ============================================================================

/// What `index` did for one space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    /// The space.
    pub space: SpaceName,
    /// Items in the index.
    pub items: usize,
    /// Vector width.
    pub dimension: usize,
    /// Whether the index was rebuilt (false when it was already fresh).
    pub built: bool,
}

/// Build indices for the requested (or configured) spaces.
pub fn run_index(config: &SonaraConfig, args: &IndexArgs) -> Result<Vec<IndexSummary>> {
    let spaces = requested_spaces(config, &args.spaces)?;
    let collection = config.load_collection()?;
    let deep_model = args.model.as_deref().unwrap_or(&config.extract.default_model);

    let needed: BTreeSet<SourceKind> = spaces
        .iter()
        .flat_map(|space| space.sources().iter().copied())
        .collect();
    let mut registry = FeatureSpaceRegistry::new();
    for kind in needed {
        registry.add_source(load_source(config, &collection, kind, deep_model)?)?;
    }

    let mut options = config.index_options().with_force(args.force);
    if let Some(trees) = args.trees {
        options = options.with_trees(trees);
    }
    let manager = IndexManager::new(config.artifact_dir("indices")?, options);

    let mut summaries = Vec::with_capacity(spaces.len());
    for space in spaces {
        let built = registry.register(space)?;
        let outcome = manager.build_and_save(built)?;
        summaries.push(IndexSummary {
            space,
            items: built.len(),
            dimension: built.dimension(),
            built: outcome.was_built(),
        });
    }
    Ok(summaries)
}

/// Load the raw values of one source.
///
/// Image sources come from the extraction checkpoint for the matching
/// identity; a missing checkpoint means extraction has not been run.
fn load_source(
    config: &SonaraConfig,
    collection: &ItemCollection,
    kind: SourceKind,
    deep_model: &str,
) -> Result<SourceMatrix> {
    let identity = match kind {
        SourceKind::Audio => {
            return SourceMatrix::from_columns(kind, collection, config.source.audio_columns.as_slice());
        }
        SourceKind::BasicImage => {
            CheckpointIdentity::new(ExtractionMethod::Basic.as_str(), BASIC_MODEL_NAME)
        }
        SourceKind::Deep => {
            let model: DeepModel = deep_model.parse()?;
            CheckpointIdentity::new(ExtractionMethod::Deep.as_str(), model.name())
        }
    };

    let path = checkpoint_path(config, &identity)?;
    if !path.exists() {
        return Err(Error::not_found(format!(
            "No '{identity}' checkpoint at {}; run `sonara extract` first",
            path.display()
        )));
    }
    let record = CheckpointRecord::load(&path, &identity);
    log::info!(
        "Source '{kind}': {} of {} recorded rows extracted",
        record.extracted_count(),
        record.len()
    );
    SourceMatrix::from_vectors(kind, collection, record.vectors())
}

fn checkpoint_path(config: &SonaraConfig, identity: &CheckpointIdentity) -> Result<PathBuf> {
    Ok(config.artifact_dir("checkpoints")?.join(identity.file_name()))
}

fn requested_spaces(config: &SonaraConfig, requested: &[String]) -> Result<Vec<SpaceName>> {
    let spaces = if requested.is_empty() {
        config.spaces()?
    } else {
        parse_spaces(requested)?
    };
    if spaces.is_empty() {
        return Err(Error::config("No feature spaces configured"));
    }
    Ok(spaces)
}

// ============================================================================
// recommend
// ============================================================================

/// Load the service for the requested spaces.
pub fn load_service(config: &SonaraConfig, spaces: &[SpaceName]) -> Result<RecommendationService> {
    let collection = config.load_collection()?;
    let manager = IndexManager::new(config.artifact_dir("indices")?, config.index_options());

    let mut service = RecommendationService::new(collection)
        .with_display_columns(config.source.display_columns.iter().cloned());
    for space in spaces {
        service = service.with_index(manager.load(*space)?);
    }
    Ok(service)
}

/// Answer one recommendation query.
pub fn run_recommend(config: &SonaraConfig, args: &RecommendArgs) -> Result<RecommendationSet> {
    let spaces = requested_spaces(config, &args.spaces)?;
    let service = load_service(config, &spaces)?;
    let k = args.k.unwrap_or(config.recommend.k);
    service.recommend(&args.id, k, &spaces)
}

/// Render a result set for the terminal.
pub fn format_recommendations(set: &RecommendationSet, columns: &[String]) -> String {
    let mut out = String::new();
    for (space, items) in &set.results {
        out.push_str(&format!("{space} (similar to {}):\n", set.query_id));
        if items.is_empty() {
            out.push_str("  (no neighbours)\n");
        }
        for (rank, item) in items.iter().enumerate() {
            let details: Vec<&str> = columns
                .iter()
                .filter_map(|c| item.metadata.get(c).map(String::as_str))
                .filter(|v| !v.is_empty())
                .collect();
            out.push_str(&format!(
                "  {:>2}. {} [{:.4}]",
                rank + 1,
                item.id,
                item.distance
            ));
            if !details.is_empty() {
                out.push_str(&format!("  {}", details.join(" | ")));
            }
            out.push('\n');
        }
    }
    out
}

/// Render an extraction report for the terminal.
pub fn format_report(report: &ExtractionReport) -> String {
    let mut out = format!("Extraction {}:\n", report.identity);
    match report.resumed_from {
        Some(row) => out.push_str(&format!("  resumed from row {row}\n")),
        None => out.push_str("  fresh run\n"),
    }
    out.push_str(&format!(
        "  batches: {}, dispatched: {}, succeeded: {}, failed: {} ({} crashed), skipped: {}\n",
        report.batches.len(),
        report.dispatched,
        report.succeeded,
        report.failed,
        report.crashed,
        report.skipped
    ));
    out.push_str(if report.complete {
        "  complete\n"
    } else {
        "  incomplete; rerun to continue\n"
    });
    out
}

// ============================================================================
// Tests
// ============================================================================
