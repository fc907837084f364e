//! Feature extractors for Sonara.
//!
//! - [`extractor`]: the plugin contract, methods, models, and built-in factory
//! - [`color`]: colour and edge statistics (always available)
//! - [`cache`]: per-worker model cache
//! - [`mock`]: deterministic extractors for tests
//! - `fastembed`: deep image embeddings (requires the `extract-fastembed` feature)

pub mod cache;
pub mod color;
pub mod extractor;
pub mod mock;

#[cfg(feature = "extract-fastembed")]
pub mod fastembed;

pub use cache::ModelCache;
pub use color::{COLOR_FEATURE_DIM, ColorExtractor};
pub use extractor::{
    BASIC_MODEL_NAME, DeepModel, ExtractionMethod, ExtractorFactory, ExtractorSpec,
    FeatureExtractor, WorkItem,
};
pub use mock::{MockExtractor, MockFactory};

#[cfg(feature = "extract-fastembed")]
pub use self::fastembed::FastEmbedImageExtractor;
