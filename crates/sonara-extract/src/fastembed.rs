//! FastEmbed image embedding extractor.
//!
//! Wraps `fastembed::ImageEmbedding` to produce deep features from album
//! covers with locally cached ONNX models. The model is loaded on first use
//! into the extractor's [`ModelCache`], so constructing the extractor is
//! cheap and a worker only pays the load once.
//!
//! # Feature Gate
//!
//! This module requires the `extract-fastembed` feature.

use sonara_core::{Error, FeatureVector, Result};
use std::path::PathBuf;

use crate::cache::ModelCache;
use crate::extractor::{DeepModel, FeatureExtractor, WorkItem};

/// Map a model to its fastembed enum variant.
fn resolve_model(model: DeepModel) -> fastembed::ImageEmbeddingModel {
    match model {
        DeepModel::ClipVitB32 => fastembed::ImageEmbeddingModel::ClipVitB32,
        DeepModel::Resnet50 => fastembed::ImageEmbeddingModel::Resnet50,
        DeepModel::UnicomVitB16 => fastembed::ImageEmbeddingModel::UnicomVitB16,
        DeepModel::UnicomVitB32 => fastembed::ImageEmbeddingModel::UnicomVitB32,
        DeepModel::NomicEmbedVisionV15 => fastembed::ImageEmbeddingModel::NomicEmbedVisionV15,
    }
}

/// Deep image features via fastembed.
///
/// # Supported Models
///
/// | Name | Dimension |
/// |------|-----------|
/// | `clip-vit-b32` | 512 |
/// | `resnet50` | 2048 |
/// | `unicom-vit-b16` | 768 |
/// | `unicom-vit-b32` | 512 |
/// | `nomic-embed-vision-v1.5` | 768 |
pub struct FastEmbedImageExtractor {
    model: DeepModel,
    cache_dir: Option<PathBuf>,
    models: ModelCache<fastembed::ImageEmbedding>,
}

impl FastEmbedImageExtractor {
    /// Create an extractor; the model is downloaded/loaded on first use.
    pub fn new(model: DeepModel, cache_dir: Option<PathBuf>) -> Self {
        Self {
            model,
            cache_dir,
            models: ModelCache::new(),
        }
    }

    fn load(model: DeepModel, cache_dir: Option<PathBuf>) -> Result<fastembed::ImageEmbedding> {
        let mut init = fastembed::ImageInitOptions::new(resolve_model(model));
        if let Some(dir) = cache_dir {
            init = init.with_cache_dir(dir);
        }
        fastembed::ImageEmbedding::try_new(init)
            .map_err(|e| Error::config(format!("Failed to load image model '{model}': {e}")))
    }
}

impl FeatureExtractor for FastEmbedImageExtractor {
    fn extract(&mut self, item: &WorkItem) -> Result<FeatureVector> {
        let model = self.model;
        let cache_dir = self.cache_dir.clone();
        let embedding = self
            .models
            .get_or_try_insert_with(model.name(), || Self::load(model, cache_dir))?;

        let mut results = embedding
            .embed(vec![item.path.as_path()], None)
            .map_err(|e| Error::extraction(item.row, format!("{}: {e}", item.path.display())))?;

        let values = results
            .pop()
            .ok_or_else(|| Error::extraction(item.row, "model returned no embedding"))?;
        FeatureVector::new(values).map_err(|e| Error::extraction(item.row, e.to_string()))
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.model.dimension())
    }

    fn name(&self) -> &str {
        self.model.name()
    }
}

impl std::fmt::Debug for FastEmbedImageExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedImageExtractor")
            .field("model", &self.model)
            .field("loaded", &!self.models.is_empty())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    #[test]
    fn test_construction_is_lazy() {
        let extractor = FastEmbedImageExtractor::new(DeepModel::Resnet50, None);
        assert_eq!(extractor.dimension(), Some(2048));
        assert_eq!(extractor.name(), "resnet50");
        assert!(format!("{extractor:?}").contains("loaded: false"));
    }

    #[test]
    #[ignore = "downloads model files"]
    fn test_clip_embedding_dimension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cover.png");
        RgbImage::from_pixel(64, 64, Rgb([200, 30, 90])).save(&path).unwrap();

        let mut extractor = FastEmbedImageExtractor::new(DeepModel::ClipVitB32, None);
        let v = extractor.extract(&WorkItem::new(0, "a", &path)).unwrap();
        assert_eq!(v.dimension(), 512);
    }

    #[test]
    #[ignore = "downloads model files"]
    fn test_unreadable_image_is_item_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"nope").unwrap();

        let mut extractor = FastEmbedImageExtractor::new(DeepModel::ClipVitB32, None);
        let err = extractor.extract(&WorkItem::new(3, "x", &path)).unwrap_err();
        assert!(matches!(err, Error::Extraction { row: 3, .. }));
    }
}
