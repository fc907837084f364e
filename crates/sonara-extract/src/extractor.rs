//! The extractor plugin contract.
//!
//! A [`FeatureExtractor`] turns one [`WorkItem`] into a [`FeatureVector`] or
//! fails. Extractors are created per worker through an
//! [`ExtractorFactory`], so heavy model state is never shared between
//! workers and an extractor that panicked can simply be rebuilt.
//!
//! # Failure contract
//!
//! - Return [`Error::Extraction`](sonara_core::Error::Extraction) (or any
//!   non-configuration error) for a per-item problem such as an unreadable
//!   image. The pipeline records the row as Absent and moves on.
//! - Return [`Error::Config`](sonara_core::Error::Config) when the extractor
//!   itself cannot work (for example a model that fails to load). The
//!   pipeline aborts the run.
//! - Never return a partially filled vector.

use serde::{Deserialize, Serialize};
use sonara_core::{Error, FeatureVector, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::color::ColorExtractor;

/// One unit of extraction work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Row position in the collection snapshot.
    pub row: usize,
    /// Stable item identifier.
    pub id: String,
    /// Resolved path of the item's image.
    pub path: PathBuf,
}

impl WorkItem {
    /// Create a work item.
    pub fn new(row: usize, id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            row,
            id: id.into(),
            path: path.into(),
        }
    }
}

/// Turns items into feature vectors.
///
/// Implementations must be deterministic for the same input and model.
pub trait FeatureExtractor {
    /// Extract the feature vector for one item.
    fn extract(&mut self, item: &WorkItem) -> Result<FeatureVector>;

    /// Fixed output dimension, when known up front.
    fn dimension(&self) -> Option<usize> {
        None
    }

    /// Name used in logs.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Builds extractors for worker threads.
///
/// The factory is shared read-only between workers; each worker calls
/// [`create`](Self::create) to obtain its own extractor.
pub trait ExtractorFactory: Send + Sync {
    /// Build a fresh extractor.
    fn create(&self) -> Result<Box<dyn FeatureExtractor>>;

    /// Method half of the checkpoint identity.
    fn method(&self) -> &str;

    /// Model half of the checkpoint identity.
    fn model(&self) -> &str;
}

// ============================================================================
// Methods and models
// ============================================================================

/// Supported extraction methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    /// Colour and edge statistics computed directly from pixels.
    #[serde(alias = "traditional")]
    Basic,
    /// Embeddings from a pretrained image model.
    Deep,
}

impl ExtractionMethod {
    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Deep => "deep",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" | "traditional" => Ok(Self::Basic),
            "deep" => Ok(Self::Deep),
            other => Err(Error::config(format!(
                "Unknown extraction method: '{other}'. Supported: basic, deep"
            ))),
        }
    }
}

/// Pretrained image-embedding models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeepModel {
    /// CLIP ViT-B/32 vision tower.
    #[serde(rename = "clip-vit-b32")]
    ClipVitB32,
    /// ResNet-50.
    #[serde(rename = "resnet50")]
    Resnet50,
    /// Unicom ViT-B/16.
    #[serde(rename = "unicom-vit-b16")]
    UnicomVitB16,
    /// Unicom ViT-B/32.
    #[serde(rename = "unicom-vit-b32")]
    UnicomVitB32,
    /// Nomic Embed Vision v1.5.
    #[serde(rename = "nomic-embed-vision-v1.5")]
    NomicEmbedVisionV15,
}

impl DeepModel {
    /// Every supported model.
    pub const ALL: [DeepModel; 5] = [
        Self::ClipVitB32,
        Self::Resnet50,
        Self::UnicomVitB16,
        Self::UnicomVitB32,
        Self::NomicEmbedVisionV15,
    ];

    /// Canonical name, also used in checkpoint identities.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ClipVitB32 => "clip-vit-b32",
            Self::Resnet50 => "resnet50",
            Self::UnicomVitB16 => "unicom-vit-b16",
            Self::UnicomVitB32 => "unicom-vit-b32",
            Self::NomicEmbedVisionV15 => "nomic-embed-vision-v1.5",
        }
    }

    /// Output embedding dimension.
    pub fn dimension(&self) -> usize {
        match self {
            Self::ClipVitB32 | Self::UnicomVitB32 => 512,
            Self::Resnet50 => 2048,
            Self::UnicomVitB16 | Self::NomicEmbedVisionV15 => 768,
        }
    }
}

impl fmt::Display for DeepModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeepModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.name() == wanted)
            .ok_or_else(|| {
                let supported: Vec<&str> = Self::ALL.iter().map(DeepModel::name).collect();
                Error::config(format!(
                    "Unknown image model: '{s}'. Supported: {}",
                    supported.join(", ")
                ))
            })
    }
}

// ============================================================================
// Built-in factory
// ============================================================================

/// Model name recorded for the basic method.
pub const BASIC_MODEL_NAME: &str = "color";

/// The built-in extractor factory.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorSpec {
    method: ExtractionMethod,
    model: Option<DeepModel>,
    cache_dir: Option<PathBuf>,
}

impl ExtractorSpec {
    /// Basic colour statistics.
    pub fn basic() -> Self {
        Self {
            method: ExtractionMethod::Basic,
            model: None,
            cache_dir: None,
        }
    }

    /// A deep image model.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the crate was built without the
    /// `extract-fastembed` feature.
    pub fn deep(model: DeepModel) -> Result<Self> {
        if !cfg!(feature = "extract-fastembed") {
            return Err(Error::config(format!(
                "Deep extraction with '{model}' requires the `extract-fastembed` feature"
            )));
        }
        Ok(Self {
            method: ExtractionMethod::Deep,
            model: Some(model),
            cache_dir: None,
        })
    }

    /// Resolve a spec from user-facing names.
    ///
    /// `model` is ignored for the basic method; for the deep method it falls
    /// back to `default_model`.
    pub fn from_names(method: &str, model: Option<&str>, default_model: &str) -> Result<Self> {
        match method.parse::<ExtractionMethod>()? {
            ExtractionMethod::Basic => Ok(Self::basic()),
            ExtractionMethod::Deep => Self::deep(model.unwrap_or(default_model).parse()?),
        }
    }

    /// Directory where downloaded model files are cached.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// The extraction method.
    pub fn extraction_method(&self) -> ExtractionMethod {
        self.method
    }

    /// The deep model, if any.
    pub fn deep_model(&self) -> Option<DeepModel> {
        self.model
    }

    /// Model cache directory, if set.
    pub fn cache_dir(&self) -> Option<&std::path::Path> {
        self.cache_dir.as_deref()
    }
}

impl ExtractorFactory for ExtractorSpec {
    fn create(&self) -> Result<Box<dyn FeatureExtractor>> {
        match (self.method, self.model) {
            (ExtractionMethod::Basic, _) => Ok(Box::new(ColorExtractor::new())),
            #[cfg(feature = "extract-fastembed")]
            (ExtractionMethod::Deep, Some(model)) => Ok(Box::new(
                crate::fastembed::FastEmbedImageExtractor::new(model, self.cache_dir.clone()),
            )),
            (ExtractionMethod::Deep, _) => Err(Error::config(
                "Deep extraction is not available in this build",
            )),
        }
    }

    fn method(&self) -> &str {
        self.method.as_str()
    }

    fn model(&self) -> &str {
        self.model.map_or(BASIC_MODEL_NAME, |m| m.name())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!("basic".parse::<ExtractionMethod>().unwrap(), ExtractionMethod::Basic);
        assert_eq!(
            "Traditional".parse::<ExtractionMethod>().unwrap(),
            ExtractionMethod::Basic
        );
        assert_eq!("deep".parse::<ExtractionMethod>().unwrap(), ExtractionMethod::Deep);
        assert!("both".parse::<ExtractionMethod>().unwrap_err().is_config());
    }

    #[test]
    fn test_model_names_round_trip() {
        for model in DeepModel::ALL {
            assert_eq!(model.name().parse::<DeepModel>().unwrap(), model);
        }
        let err = "efficientnet_v2".parse::<DeepModel>().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("clip-vit-b32"));
    }

    #[test]
    fn test_method_serde_alias() {
        let m: ExtractionMethod = serde_json::from_str("\"traditional\"").unwrap();
        assert_eq!(m, ExtractionMethod::Basic);
        assert_eq!(serde_json::to_string(&DeepModel::Resnet50).unwrap(), "\"resnet50\"");
    }

    #[test]
    fn test_basic_spec_identity() {
        let spec = ExtractorSpec::basic();
        assert_eq!(spec.method(), "basic");
        assert_eq!(spec.model(), "color");

        let extractor = spec.create().unwrap();
        assert_eq!(extractor.name(), "color");
        assert_eq!(extractor.dimension(), Some(crate::color::COLOR_FEATURE_DIM));
    }

    #[test]
    fn test_from_names() {
        let spec = ExtractorSpec::from_names("traditional", Some("ignored"), "resnet50").unwrap();
        assert_eq!(spec.extraction_method(), ExtractionMethod::Basic);
        assert!(ExtractorSpec::from_names("deep", Some("nope"), "resnet50").is_err());
        assert!(ExtractorSpec::from_names("hybrid", None, "resnet50").is_err());
    }

    #[cfg(not(feature = "extract-fastembed"))]
    #[test]
    fn test_deep_requires_feature() {
        let err = ExtractorSpec::deep(DeepModel::ClipVitB32).unwrap_err();
        assert!(err.is_config());
    }

    #[cfg(feature = "extract-fastembed")]
    #[test]
    fn test_deep_spec_identity() {
        let spec = ExtractorSpec::from_names("deep", None, "clip-vit-b32").unwrap();
        assert_eq!(spec.method(), "deep");
        assert_eq!(spec.model(), "clip-vit-b32");
        assert_eq!(spec.create().unwrap().dimension(), Some(512));
    }

    #[test]
    fn test_factory_is_object_safe() {
        fn _assert(_: &dyn ExtractorFactory) {}
        fn _assert_extractor(_: &dyn FeatureExtractor) {}
    }
}
